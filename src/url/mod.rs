//! URL handling module for Listing-Harvester
//!
//! This module builds search URLs from the site description, resolves relative
//! listing and page references, and derives sink names from a query and shard key.

mod resolve;
mod search;

// Re-export main functions
pub use resolve::{ensure_absolute, resolve_reference};
pub use search::{build_search_url, SearchQuery};

/// Derives the sink file stem for a (query, shard) pair
///
/// The query is lowercased; characters that are not safe in a file name are
/// replaced with `_`. Without either part the stem is `results`.
///
/// # Examples
///
/// ```
/// use listing_harvester::url::sink_stem;
///
/// assert_eq!(sink_stem(Some("Bäcker"), Some("22041")), "bäcker_22041");
/// assert_eq!(sink_stem(None, None), "results");
/// ```
pub fn sink_stem(query: Option<&str>, shard: Option<&str>) -> String {
    let query = query.map(str::trim).filter(|q| !q.is_empty());
    let shard = shard.map(str::trim).filter(|s| !s.is_empty());

    let stem = match (query, shard) {
        (Some(q), Some(s)) => format!("{}_{}", q.to_lowercase(), s),
        (Some(q), None) => q.to_lowercase(),
        (None, Some(s)) => s.to_string(),
        (None, None) => "results".to_string(),
    };

    stem.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
