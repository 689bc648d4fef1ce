use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One directory entry as it appears on a result page
///
/// Deserialized from the page's structured-data entries. Fields the crawler does
/// not persist (`@type` tags, the aggregate rating) are either never modelled or
/// dropped when the [`Record`](crate::listing::Record) is assembled.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListingStub {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub address: Option<PostalAddress>,

    #[serde(default, alias = "phone", deserialize_with = "string_or_number")]
    pub telephone: Option<String>,

    #[serde(default)]
    pub geo: Option<GeoPoint>,

    /// Reference to the detail page, absolute or relative to the site origin
    #[serde(default, rename = "url", alias = "detailRef")]
    pub detail_ref: Option<String>,

    #[serde(default, rename = "aggregateRating")]
    pub aggregate_rating: Option<serde_json::Value>,
}

/// Postal address of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub postal_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_locality: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_country: Option<String>,
}

impl PostalAddress {
    /// Returns true if no part of the address is present
    pub fn is_empty(&self) -> bool {
        self.street_address.is_none()
            && self.postal_code.is_none()
            && self.address_locality.is_none()
            && self.address_region.is_none()
            && self.address_country.is_none()
    }
}

/// Raw geo-coordinates as published; converted to floats on assembly
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GeoPoint {
    #[serde(default, alias = "lat", deserialize_with = "string_or_number")]
    pub latitude: Option<String>,

    #[serde(
        default,
        alias = "lon",
        alias = "lng",
        deserialize_with = "string_or_number"
    )]
    pub longitude: Option<String>,
}

/// Why a stub is not worth persisting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No detail-page reference to enrich from
    MissingDetailRef,

    /// Neither detail reference, geo-coordinates nor address
    Incomplete,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDetailRef => write!(f, "missing detail reference"),
            Self::Incomplete => write!(f, "no detail reference, geo or address"),
        }
    }
}

impl ListingStub {
    /// The detail reference, if present and not blank
    pub fn detail_ref(&self) -> Option<&str> {
        self.detail_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Decides whether this stub must be skipped rather than enriched
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.detail_ref().is_some() {
            return None;
        }

        let has_geo = self.geo.is_some();
        let has_address = self.address.as_ref().is_some_and(|a| !a.is_empty());

        if !has_geo && !has_address {
            Some(SkipReason::Incomplete)
        } else {
            Some(SkipReason::MissingDetailRef)
        }
    }
}

/// Accepts a JSON string or number and yields it as a string
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
