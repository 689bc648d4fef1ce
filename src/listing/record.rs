use crate::listing::contact::{sanitize_email, sanitize_website};
use crate::listing::normalize::{clean_text, pad_postal_code, strip_whitespace};
use crate::listing::stub::{GeoPoint, ListingStub, PostalAddress};
use crate::listing::ContactBlock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while assembling a record from a stub
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("invalid coordinate '{value}'")]
    InvalidCoordinate { value: String },
}

/// The persisted unit: normalized listing fields plus contact fields
///
/// Every field is named exactly once, so stub and contact data cannot collide.
/// `website` and `mailAddress` are always serialized, possibly as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<PostalAddress>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,

    /// `[latitude, longitude]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 2]>,

    pub website: String,

    #[serde(rename = "mailAddress")]
    pub mail_address: String,
}

impl Record {
    /// Merges a stub with its contact block into a normalized record
    ///
    /// The aggregate rating and the detail reference are dropped; geo-coordinates
    /// become a `[lat, lon]` float pair.
    pub fn assemble(stub: ListingStub, contact: ContactBlock) -> Result<Self, ListingError> {
        let coordinates = match &stub.geo {
            Some(geo) => parse_coordinates(geo)?,
            None => None,
        };

        let record = Self {
            name: stub.name,
            category: stub.category,
            address: stub.address,
            telephone: stub.telephone,
            coordinates,
            website: contact.website,
            mail_address: contact.mail_address,
        };

        Ok(record.normalized())
    }

    /// Replaces the contact fields
    pub fn with_contact(self, contact: ContactBlock) -> Self {
        Self {
            website: contact.website,
            mail_address: contact.mail_address,
            ..self
        }
        .normalized()
    }

    /// Applies field normalization; idempotent
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.map(|n| clean_text(&n)).filter(|n| !n.is_empty()),
            category: self
                .category
                .map(|c| clean_text(&c))
                .filter(|c| !c.is_empty()),
            address: self.address.map(normalize_address).filter(|a| !a.is_empty()),
            telephone: self
                .telephone
                .map(|t| strip_whitespace(&t))
                .filter(|t| !t.is_empty()),
            coordinates: self
                .coordinates
                .filter(|[lat, lon]| lat.is_finite() && lon.is_finite()),
            website: sanitize_website(&self.website),
            mail_address: sanitize_email(&self.mail_address),
        }
    }
}

fn normalize_address(address: PostalAddress) -> PostalAddress {
    let clean = |part: Option<String>| part.map(|p| clean_text(&p)).filter(|p| !p.is_empty());

    PostalAddress {
        street_address: clean(address.street_address),
        postal_code: clean(address.postal_code).map(|code| pad_postal_code(&code)),
        address_locality: clean(address.address_locality),
        address_region: clean(address.address_region),
        address_country: clean(address.address_country),
    }
}

/// Converts a published geo point to `[lat, lon]`
///
/// A point with a missing half yields `None`; a present but unparsable value is an error.
fn parse_coordinates(geo: &GeoPoint) -> Result<Option<[f64; 2]>, ListingError> {
    let (Some(lat), Some(lon)) = (&geo.latitude, &geo.longitude) else {
        return Ok(None);
    };

    Ok(Some([parse_coordinate(lat)?, parse_coordinate(lon)?]))
}

fn parse_coordinate(raw: &str) -> Result<f64, ListingError> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ListingError::InvalidCoordinate {
            value: raw.to_string(),
        })
}
