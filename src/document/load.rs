//! One-shot reading of static documents

use super::{Document, DocumentKind};
use crate::crawler::{charset_of, HttpFetcher};
use crate::FetchError;
use base64::Engine;
use encoding_rs::Encoding;
use percent_encoding::percent_decode_str;

/// Payload of a `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Decodes a `data:[<media type>][;base64],<data>` URL
pub fn decode_data_url(address: &str) -> Result<DataUrl, FetchError> {
    let rest = address
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::InvalidAddress(address.to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidAddress("data url without ','".to_string()))?;

    let (media_type, is_base64) = match header.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (header, false),
    };
    let media_type = if media_type.is_empty() {
        "text/plain;charset=US-ASCII".to_string()
    } else {
        media_type.to_string()
    };

    let data = if is_base64 {
        let compact: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let compact = percent_decode_str(&compact).decode_utf8_lossy().into_owned();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| FetchError::InvalidAddress(format!("invalid base64 data url: {}", e)))?
    } else {
        percent_decode_str(payload).collect()
    };
    Ok(DataUrl { media_type, data })
}

/// Reads a local file, accepting `file://` addresses
pub async fn read_file(path: &str) -> Result<Vec<u8>, FetchError> {
    let path = path.strip_prefix("file://").unwrap_or(path);
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FetchError::NotFound,
        _ => FetchError::Other(e.to_string()),
    })
}

/// Decodes document bytes with the encoding named by `label`
///
/// Unknown labels fall back to UTF-8. A byte order mark overrides the label.
/// Returns the text and the name of the encoding used.
pub fn decode_text(data: &[u8], label: &str) -> (String, String) {
    match Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => {
            let (text, used, _) = encoding.decode(data);
            let name = if used == encoding {
                label.trim().to_ascii_lowercase()
            } else {
                used.name().to_ascii_lowercase()
            };
            (text.into_owned(), name)
        }
        None => {
            tracing::warn!("unknown encoding '{}', decoding as utf-8", label);
            let (text, _, _) = encoding_rs::UTF_8.decode(data);
            (text.into_owned(), "utf-8".to_string())
        }
    }
}

/// Reads the text of a document without a rendered session
///
/// Returns the text and the encoding it was decoded with.
pub async fn load_static(
    doc: &Document,
    fetcher: &HttpFetcher,
    encoding: &str,
    forced: bool,
) -> Result<(String, String), FetchError> {
    match doc.kind {
        DocumentKind::ContentMatch => {
            tracing::debug!("using forwarded content of '{}'", doc.path);
            Ok((
                doc.inline_text.clone().unwrap_or_default(),
                encoding.to_string(),
            ))
        }
        DocumentKind::File | DocumentKind::ContentFile => {
            tracing::info!("reading {} '{}'", doc.kind, doc.path);
            let data = read_file(&doc.path).await?;
            Ok(decode_text(&data, encoding))
        }
        DocumentKind::Url if doc.path.starts_with("data:") => {
            tracing::info!("decoding data url");
            let data = decode_data_url(&doc.path)?;
            let label = match charset_of(&data.media_type) {
                Some(charset) if !forced => charset,
                _ => encoding.to_string(),
            };
            Ok(decode_text(&data.data, &label))
        }
        DocumentKind::Url => {
            tracing::info!("downloading url '{}'", doc.path);
            fetcher.get_text(&doc.path, encoding, forced).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_data_url_plain() {
        let data = decode_data_url("data:,Hello%2C%20World").unwrap();
        assert_eq!(data.data, b"Hello, World");
        assert_eq!(data.media_type, "text/plain;charset=US-ASCII");
    }

    #[test]
    fn test_data_url_base64() {
        let data = decode_data_url("data:text/html;base64,PGI+aGk8L2I+").unwrap();
        assert_eq!(data.media_type, "text/html");
        assert_eq!(data.data, b"<b>hi</b>");
    }

    #[test]
    fn test_data_url_invalid() {
        assert!(decode_data_url("data:text/plain").is_err());
        assert!(decode_data_url("http://x").is_err());
        assert!(decode_data_url("data:;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn test_read_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"<p>x</p>").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        assert_eq!(read_file(&path).await.unwrap(), b"<p>x</p>");
        assert_eq!(
            read_file(&format!("file://{}", path)).await.unwrap(),
            b"<p>x</p>"
        );
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(
            crate::crawler::build_http_client("TestScraper/1.0", std::time::Duration::from_secs(5))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_file_decoded_with_configured_encoding() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"caf\xe9").unwrap();
        let doc = Document::new(
            DocumentKind::File,
            file.path().to_string_lossy().into_owned(),
            vec![0],
        );

        let (text, used) = load_static(&doc, &fetcher(), "iso-8859-1", true)
            .await
            .unwrap();
        assert_eq!(text, "caf\u{e9}");
        assert_eq!(used, "iso-8859-1");

        let (text, used) = load_static(&doc, &fetcher(), "utf-8", false).await.unwrap();
        assert_eq!(text, "caf\u{fffd}");
        assert_eq!(used, "utf-8");
    }

    #[tokio::test]
    async fn test_data_url_charset() {
        let doc = Document::new(
            DocumentKind::Url,
            "data:text/plain;charset=iso-8859-1,caf%E9",
            vec![0],
        );
        let (text, used) = load_static(&doc, &fetcher(), "utf-8", false).await.unwrap();
        assert_eq!(text, "caf\u{e9}");
        assert_eq!(used, "iso-8859-1");

        let (text, _) = load_static(&doc, &fetcher(), "utf-8", true).await.unwrap();
        assert_eq!(text, "caf\u{fffd}");
    }

    #[test]
    fn test_decode_text_unknown_label() {
        assert_eq!(
            decode_text("caf\u{e9}".as_bytes(), "no-such-charset"),
            ("caf\u{e9}".to_string(), "utf-8".to_string())
        );
        // byte order mark wins over the label
        let (text, used) = decode_text(b"\xef\xbb\xbfok", "windows-1252");
        assert_eq!(text, "ok");
        assert_eq!(used, "utf-8");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        assert_eq!(
            read_file("/nonexistent/chainscrape/file.html").await,
            Err(FetchError::NotFound)
        );
    }
}
