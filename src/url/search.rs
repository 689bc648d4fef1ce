use crate::config::SiteConfig;
use crate::{UrlError, UrlResult};
use url::Url;

/// One logical search: a term with an optional starting offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// The search term
    pub term: String,

    /// Result offset of the first page, if not starting at the top
    pub offset: Option<u32>,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = (offset > 0).then_some(offset);
        self
    }
}

/// Builds the first result-page URL for a query and optional shard key
///
/// Parameter names come from the site configuration; values are form-encoded.
/// Fixed parameters follow the search term, then offset, then shard key.
pub fn build_search_url(
    site: &SiteConfig,
    query: &SearchQuery,
    shard: Option<&str>,
) -> UrlResult<Url> {
    let base = Url::parse(&site.base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
    let mut url = base
        .join(&site.search_path)
        .map_err(|e| UrlError::Parse(e.to_string()))?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.append_pair(&site.query_param, &query.term);
        for (name, value) in &site.fixed_params {
            pairs.append_pair(name, value);
        }
        if let Some(offset) = query.offset {
            pairs.append_pair(&site.offset_param, &offset.to_string());
        }
        if let Some(shard) = shard {
            pairs.append_pair(&site.shard_param, shard);
        }
    }

    Ok(url)
}
