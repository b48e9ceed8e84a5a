use url::Url;

use crate::error::HlsResult;

/// Resolve a playlist URI against the URL of the document that referenced it.
///
/// Absolute URIs pass through unchanged.
pub fn resolve_url(base: &Url, uri: &str) -> HlsResult<Url> {
    match Url::parse(uri) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(base.join(uri)?),
        Err(e) => Err(e.into()),
    }
}

/// Local file name of a segment: the last path component of its URL.
pub fn segment_file_name(url: &Url, sequence: u64) -> String {
    url.path_segments()
        .and_then(|mut c| c.next_back())
        .filter(|name| !name.is_empty())
        .map(|name| name.replace(['\\', ':'], "_"))
        .unwrap_or_else(|| format!("segment_{sequence}.ts"))
}
