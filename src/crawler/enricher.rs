use crate::crawler::fetcher::{Fetcher, RequestProfile};
use crate::crawler::parser::PageParser;
use crate::crawler::rate_limiter::RateLimiter;
use crate::listing::{ContactBlock, ListingError, ListingStub, Record, SkipReason};
use crate::url::resolve_reference;
use crate::UrlError;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Unexpected failure while enriching one listing
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("listing '{detail_ref}' is malformed: {source}")]
    Listing {
        detail_ref: String,
        #[source]
        source: ListingError,
    },

    #[error("unresolvable detail reference '{detail_ref}': {source}")]
    InvalidReference {
        detail_ref: String,
        #[source]
        source: UrlError,
    },
}

/// What became of one listing stub
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichOutcome {
    /// Detail page fetched and parsed
    Complete(Record),

    /// Detail fetch failed; contact fields are empty
    Partial(Record),

    /// Stub cannot become a record
    Skipped(SkipReason),
}

/// Turns listing stubs into records by fetching their detail pages
pub struct DetailEnricher {
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn PageParser>,
    profile: Arc<RequestProfile>,
    /// Page URL detail references are resolved against
    base_url: Url,
}

impl DetailEnricher {
    pub fn new(
        fetcher: Arc<Fetcher>,
        parser: Arc<dyn PageParser>,
        profile: Arc<RequestProfile>,
        base_url: Url,
    ) -> Self {
        Self {
            fetcher,
            parser,
            profile,
            base_url,
        }
    }

    /// Enriches one stub, pacing the detail request through `limiter`
    ///
    /// A failed detail fetch degrades to [`EnrichOutcome::Partial`] rather than an
    /// error; only a stub that cannot be assembled at all returns `Err`.
    pub async fn enrich(
        &self,
        stub: ListingStub,
        limiter: &RateLimiter,
    ) -> Result<EnrichOutcome, EnrichError> {
        if let Some(reason) = stub.skip_reason() {
            tracing::debug!(name = ?stub.name, reason = %reason, "skipping listing");
            return Ok(EnrichOutcome::Skipped(reason));
        }

        let detail_ref = stub.detail_ref().unwrap_or_default().to_string();

        let detail_url = resolve_reference(&self.base_url, &detail_ref).map_err(|source| {
            EnrichError::InvalidReference {
                detail_ref: detail_ref.clone(),
                source,
            }
        })?;

        let record = Record::assemble(stub, ContactBlock::default()).map_err(|source| {
            EnrichError::Listing {
                detail_ref: detail_ref.clone(),
                source,
            }
        })?;

        limiter.wait().await;

        match self.fetcher.fetch(detail_url.as_str(), &self.profile).await {
            Ok(document) => {
                let contact = self.parser.parse_detail_page(&document);
                tracing::debug!(
                    url = %detail_url,
                    has_website = !contact.website.is_empty(),
                    has_mail = !contact.mail_address.is_empty(),
                    "detail page parsed"
                );
                Ok(EnrichOutcome::Complete(record.with_contact(contact)))
            }
            Err(e) => {
                tracing::warn!(url = %detail_url, error = %e, "detail fetch failed, keeping listing without contact data");
                Ok(EnrichOutcome::Partial(record))
            }
        }
    }
}
