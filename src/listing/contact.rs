use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Contact information recovered from a detail page
///
/// Both fields are empty strings when absent. Construct through [`ContactBlock::new`]
/// so that a malformed email never makes it into a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactBlock {
    pub website: String,
    #[serde(rename = "mailAddress")]
    pub mail_address: String,
}

impl ContactBlock {
    /// Builds a contact block, dropping candidates that fail the well-formedness checks
    pub fn new(website: impl AsRef<str>, mail_address: impl AsRef<str>) -> Self {
        Self {
            website: sanitize_website(website.as_ref()),
            mail_address: sanitize_email(mail_address.as_ref()),
        }
    }

    /// Returns true if neither field carries a value
    pub fn is_empty(&self) -> bool {
        self.website.is_empty() && self.mail_address.is_empty()
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s;]+@[^@\s;]+\.[^@\s;]+$").expect("email pattern is valid")
    })
}

/// Checks the `local@domain.tld` shape
///
/// # Examples
///
/// ```
/// use listing_harvester::listing::is_well_formed_email;
///
/// assert!(is_well_formed_email("info@acme.de"));
/// assert!(!is_well_formed_email("info@acme"));
/// ```
pub fn is_well_formed_email(candidate: &str) -> bool {
    email_pattern().is_match(candidate)
}

/// Normalizes an email candidate, returning `""` when it is not well formed
pub(crate) fn sanitize_email(candidate: &str) -> String {
    let candidate = candidate
        .trim()
        .trim_start_matches("mailto:")
        .replace(';', "")
        .to_lowercase();

    if is_well_formed_email(&candidate) {
        candidate
    } else {
        String::new()
    }
}

/// Normalizes a website candidate: no whitespace, no field separator
pub(crate) fn sanitize_website(candidate: &str) -> String {
    candidate
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ';')
        .collect()
}
