//! HTML parser for result and detail pages
//!
//! This module turns raw documents into:
//! - Listing stubs (from the page's `application/ld+json` structured data)
//! - The next-page reference
//! - The announced total hit count
//! - The contact block of a detail page

use crate::listing::{ContactBlock, ListingStub};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use thiserror::Error;

/// Title of the pagination anchor pointing at the next result page
const NEXT_PAGE_TITLE: &str = "zur nächsten Seite";

/// Structured-data types that describe the page itself rather than a listing
const NON_LISTING_TYPES: &[&str] = &[
    "WebSite",
    "WebPage",
    "SearchResultsPage",
    "BreadcrumbList",
    "SearchAction",
    "ImageObject",
    "ItemList",
    "Organization",
];

#[derive(Debug, Error)]
pub enum ParseError {
    /// The structured-data block the listings live in is absent or unreadable
    #[error("malformed result page: {reason}")]
    MalformedPage { reason: String },
}

/// Listings and pagination extracted from one result page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub listings: Vec<ListingStub>,

    /// Raw next-page reference, absolute or relative
    pub next_page: Option<String>,

    /// Listing entries whose structured data could not be decoded
    pub rejected: usize,
}

/// Extraction contract between the crawler and a concrete site layout
pub trait PageParser: Send + Sync {
    /// Extracts listing stubs and the next-page reference
    ///
    /// Fails with [`ParseError::MalformedPage`] when the structured-data block is
    /// absent. A present block without listings yields an empty page.
    fn parse_listing_page(&self, document: &str) -> Result<ListingPage, ParseError>;

    /// Total hits announced by the page, 0 when the count element is absent
    fn parse_total_hits(&self, document: &str) -> u64;

    /// Contact block of a detail page, empty when nothing matches
    fn parse_detail_page(&self, document: &str) -> ContactBlock;
}

/// Parser for the directory's current page layout
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryParser;

impl PageParser for DirectoryParser {
    fn parse_listing_page(&self, document: &str) -> Result<ListingPage, ParseError> {
        let document = Html::parse_document(document);
        let (listings, rejected) = extract_listings(&document)?;
        let next_page = extract_next_page(&document);

        tracing::debug!(
            listings = listings.len(),
            rejected,
            has_next = next_page.is_some(),
            "parsed result page"
        );

        Ok(ListingPage {
            listings,
            next_page,
            rejected,
        })
    }

    fn parse_total_hits(&self, document: &str) -> u64 {
        let document = Html::parse_document(document);

        if let Ok(selector) = Selector::parse("[data-hits]") {
            let announced = document
                .select(&selector)
                .filter_map(|element| element.value().attr("data-hits"))
                .find_map(parse_digits);
            if let Some(hits) = announced {
                return hits;
            }
        }

        if let Ok(selector) = Selector::parse(".hits-count") {
            if let Some(element) = document.select(&selector).next() {
                return parse_digits(&element.text().collect::<String>()).unwrap_or(0);
            }
        }

        0
    }

    fn parse_detail_page(&self, document: &str) -> ContactBlock {
        let document = Html::parse_document(document);
        let Ok(selector) = Selector::parse(r#"div[class*="lnks"] a"#) else {
            return ContactBlock::default();
        };

        let mut website = String::new();
        let mut mail = String::new();

        for anchor in document.select(&selector) {
            let classes: Vec<&str> = anchor.value().classes().collect();
            let href = anchor.value().attr("href").unwrap_or("").trim();

            if classes.contains(&"mail") {
                let title = anchor.value().attr("title").unwrap_or("").trim().to_lowercase();
                if mail.is_empty() && crate::listing::is_well_formed_email(&title) {
                    mail = title;
                }
            } else if (classes.contains(&"www") || href.starts_with("http")) && website.is_empty() {
                website = href.to_string();
            }
        }

        ContactBlock::new(website, mail)
    }
}

/// Decodes every listing entry, returning the stubs and the number of undecodable entries
fn extract_listings(document: &Html) -> Result<(Vec<ListingStub>, usize), ParseError> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).map_err(|e| {
        ParseError::MalformedPage {
            reason: e.to_string(),
        }
    })?;

    let blocks: Vec<ElementRef> = document.select(&selector).collect();
    if blocks.is_empty() {
        return Err(ParseError::MalformedPage {
            reason: "no structured-data block".to_string(),
        });
    }

    let mut readable = 0usize;
    let mut entries = Vec::new();

    for block in blocks {
        let text = block.text().collect::<String>();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => {
                readable += 1;
                collect_entries(&value, &mut entries);
            }
            Err(e) => tracing::debug!(error = %e, "skipping unreadable structured-data block"),
        }
    }

    if readable == 0 {
        return Err(ParseError::MalformedPage {
            reason: "structured-data blocks are not valid JSON".to_string(),
        });
    }

    let mut listings = Vec::with_capacity(entries.len());
    let mut rejected = 0usize;
    for entry in entries {
        match serde_json::from_value::<ListingStub>(entry) {
            Ok(stub) => listings.push(stub),
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable listing entry");
                rejected += 1;
            }
        }
    }

    Ok((listings, rejected))
}

/// Flattens `@graph`, `ItemList` and plain arrays down to listing objects
fn collect_entries(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_entries(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_entries(graph, out);
            } else if let Some(elements) = map.get("itemListElement") {
                collect_entries(elements, out);
            } else if has_type(map, "ListItem") {
                if let Some(item) = map.get("item") {
                    collect_entries(item, out);
                }
            } else if is_listing(map) {
                out.push(value.clone());
            }
        }
        _ => {}
    }
}

fn has_type(map: &Map<String, Value>, wanted: &str) -> bool {
    match map.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

/// Typed entries are listings unless they describe the page; untyped ones need listing data
///
/// Entries that pass but lack a detail reference are skipped downstream and
/// show up in the dispatch counts.
fn is_listing(map: &Map<String, Value>) -> bool {
    if NON_LISTING_TYPES.iter().any(|t| has_type(map, t)) {
        return false;
    }
    map.contains_key("@type")
        || ["address", "geo", "telephone", "url"]
            .iter()
            .any(|key| map.contains_key(*key))
}

fn extract_next_page(document: &Html) -> Option<String> {
    let title_selector = format!(r#"a[title="{}"][href]"#, NEXT_PAGE_TITLE);

    for candidate in [title_selector.as_str(), r#"a[rel="next"][href]"#, r#"link[rel="next"][href]"#] {
        let Ok(selector) = Selector::parse(candidate) else {
            continue;
        };
        let href = document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty() && !href.starts_with('#'));
        if let Some(href) = href {
            return Some(href.to_string());
        }
    }

    None
}

fn parse_digits(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}
