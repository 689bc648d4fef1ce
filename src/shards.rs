//! Shard-key and start-URL list loading
//!
//! Both list formats are line-oriented: blank lines and `#` comments are ignored.
//! Shard-key files may be CSV exports; only the first column is used.

use crate::url::sink_stem;
use crate::HarvestError;
use std::collections::HashMap;
use std::path::Path;

/// Loads shard keys (postal codes) from a file
pub fn load_shard_keys(path: &Path) -> Result<Vec<String>, HarvestError> {
    let content = std::fs::read_to_string(path)?;
    let keys = parse_shard_keys(&content)?;
    tracing::info!(path = %path.display(), shards = keys.len(), "Loaded shard keys");
    Ok(keys)
}

/// Extracts unique shard keys in file order
///
/// Repeated keys are dropped. Distinct keys that map to the same sink file name
/// (`a/b` and `a_b`) are rejected, since one shard would overwrite the other.
pub fn parse_shard_keys(content: &str) -> Result<Vec<String>, HarvestError> {
    let mut stems: HashMap<String, String> = HashMap::new();
    let mut keys = Vec::new();

    for line in content_lines(content) {
        let key = line
            .split([',', ';', '\t'])
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"');

        if key.is_empty() {
            continue;
        }
        let stem = sink_stem(None, Some(key));
        match stems.get(&stem) {
            Some(first) if first == key => tracing::debug!(key, "duplicate shard key ignored"),
            Some(first) => {
                return Err(HarvestError::ShardCollision {
                    first: first.clone(),
                    second: key.to_string(),
                    stem,
                })
            }
            None => {
                stems.insert(stem, key.to_string());
                keys.push(key.to_string());
            }
        }
    }

    Ok(keys)
}

/// Loads start URLs, one per line
pub fn load_start_urls(path: &Path) -> Result<Vec<String>, HarvestError> {
    let content = std::fs::read_to_string(path)?;
    let urls: Vec<String> = content_lines(&content).map(str::to_string).collect();
    tracing::info!(path = %path.display(), urls = urls.len(), "Loaded start URLs");
    Ok(urls)
}

fn content_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}
