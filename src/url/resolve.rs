use crate::{UrlError, UrlResult};
use url::Url;

/// Resolves a page or listing reference against the site origin
///
/// Absolute references are kept as they are; relative ones (`/d/1`, `?page=2`)
/// are joined against `base`. Only HTTP and HTTPS results are accepted.
pub fn resolve_reference(base: &Url, reference: &str) -> UrlResult<Url> {
    let reference = reference.trim();

    if reference.is_empty() {
        return Err(UrlError::Parse("empty reference".to_string()));
    }

    let resolved = base
        .join(reference)
        .map_err(|e| UrlError::Parse(format!("{}: {}", reference, e)))?;

    match resolved.scheme() {
        "http" | "https" => Ok(resolved),
        other => Err(UrlError::InvalidScheme(other.to_string())),
    }
}

/// Parses a URL that must already be absolute HTTP(S)
pub fn ensure_absolute(url: &str) -> UrlResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| match e {
        url::ParseError::RelativeUrlWithoutBase => UrlError::NotAbsolute(url.to_string()),
        other => UrlError::Parse(format!("{}: {}", url, other)),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(UrlError::InvalidScheme(other.to_string())),
    }
}
