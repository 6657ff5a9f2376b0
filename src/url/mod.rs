//! Link handling
//!
//! Resolves the raw references found by document and content locators into
//! canonical addresses, depending on the kind of document they were found in.

mod normalize;

pub use normalize::{normalize_link, normpath, LinkParts, LinkPolicy, FALLBACK_SCHEME};

use crate::UrlError;
use url::Url;

/// Converts a filesystem path into an absolute `file://` address, as needed
/// for navigating a browser session to a local file
pub fn file_url(path: &str) -> Result<String, UrlError> {
    let path = std::path::Path::new(path);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| UrlError::Malformed(e.to_string()))?
            .join(path)
    };
    let absolute = normpath(&absolute.to_string_lossy());
    Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|_| UrlError::Parse(format!("not a valid file path: {}", absolute)))
}

/// Last path segment of an address, percent-decoded
pub fn last_segment(address: &str) -> Option<String> {
    let url = Url::parse(address).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned();
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}
