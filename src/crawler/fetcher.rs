//! HTTP fetcher implementation
//!
//! This module handles all plain HTTP requests, including:
//! - Building HTTP clients with the configured user agent
//! - GET requests for document text, decoded with a chosen encoding
//! - Streaming GET requests for content downloads
//! - Error classification

use crate::FetchError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Response};
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - User agent sent with every request
/// * `timeout` - Overall request timeout
///
/// # Example
///
/// ```no_run
/// use chainscrape::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client("chainscrape/0.1", Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// A successful response whose body has not been read yet
#[derive(Debug)]
pub struct FetchedResponse {
    pub status: u16,
    /// Final address after redirects
    pub address: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_disposition: Option<String>,
    response: Response,
}

impl FetchedResponse {
    /// Next chunk of the body, `None` at the end
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
        self.response
            .chunk()
            .await
            .map(|c| c.map(|bytes| bytes.to_vec()))
            .map_err(classify_error)
    }
}

/// Plain HTTP access shared by the scheduler and download jobs
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Starts a GET request and returns once the headers arrived
    ///
    /// Cookies are sent as a single `Cookie` header, which is how the
    /// cookies of a browser session are reused for external downloads.
    pub async fn get(
        &self,
        address: &str,
        cookies: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<FetchedResponse, FetchError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::Other(format!("invalid header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::Other(format!("invalid header value: {}", e)))?;
            header_map.insert(name, value);
        }
        if !cookies.is_empty() {
            let cookie = cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                header_map.insert(COOKIE, value);
            }
        }

        let response = self
            .client
            .get(address)
            .headers(header_map)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Ok(FetchedResponse {
            status: status.as_u16(),
            address: response.url().to_string(),
            content_type: header(CONTENT_TYPE),
            content_length: response.content_length(),
            content_disposition: header(CONTENT_DISPOSITION),
            response,
        })
    }

    /// Fetches a document and decodes it as text
    ///
    /// The charset announced by the server wins unless `forced` is set;
    /// `encoding` is used when the server announces none. Returns the text
    /// and the encoding it was decoded with.
    pub async fn get_text(
        &self,
        address: &str,
        encoding: &str,
        forced: bool,
    ) -> Result<(String, String), FetchError> {
        let fetched = self.get(address, &[], &[]).await?;
        let announced = fetched.content_type.as_deref().and_then(charset_of);
        let mut response = fetched.response;

        let used = match announced {
            Some(charset) if !forced => charset,
            _ => {
                response.headers_mut().remove(CONTENT_TYPE);
                encoding.to_string()
            }
        };
        let text = response
            .text_with_charset(&used)
            .await
            .map_err(classify_error)?;
        Ok((text, used))
    }
}

/// Charset parameter of a `Content-Type` value
pub(crate) fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Maps a reqwest error onto the categories reported to the user
fn classify_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::ConnectionFailed(e.to_string())
    } else if e.is_builder() {
        FetchError::InvalidAddress(e.to_string())
    } else if let Some(status) = e.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(build_http_client("TestScraper/1.0", Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client("TestScraper/1.0", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_charset_of() {
        assert_eq!(charset_of("text/html; charset=ISO-8859-1").as_deref(), Some("iso-8859-1"));
        assert_eq!(charset_of("text/html;charset=\"utf-8\"").as_deref(), Some("utf-8"));
        assert_eq!(charset_of("text/html"), None);
    }

    #[tokio::test]
    async fn test_get_text_uses_announced_charset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain; charset=iso-8859-1")
                    .set_body_bytes(vec![0x63, 0x61, 0x66, 0xe9]),
            )
            .mount(&server)
            .await;

        let address = format!("{}/latin", server.uri());
        let (text, used) = fetcher().get_text(&address, "utf-8", false).await.unwrap();
        assert_eq!(text, "café");
        assert_eq!(used, "iso-8859-1");

        let (_, used) = fetcher().get_text(&address, "utf-8", true).await.unwrap();
        assert_eq!(used, "utf-8");
    }

    #[tokio::test]
    async fn test_get_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher()
            .get(&format!("{}/missing", server.uri()), &[], &[])
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Status(404));
    }

    #[tokio::test]
    async fn test_get_streams_with_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header("cookie", "session=abc; theme=dark"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"x.bin\"")
                    .set_body_bytes(vec![1u8; 1000]),
            )
            .mount(&server)
            .await;

        let cookies = vec![
            ("session".to_string(), "abc".to_string()),
            ("theme".to_string(), "dark".to_string()),
        ];
        let mut response = fetcher()
            .get(&format!("{}/file.bin", server.uri()), &cookies, &[])
            .await
            .unwrap();
        assert_eq!(response.content_length, Some(1000));
        assert_eq!(
            response.content_disposition.as_deref(),
            Some("attachment; filename=\"x.bin\"")
        );

        let mut total = 0;
        while let Some(chunk) = response.chunk().await.unwrap() {
            total += chunk.len();
        }
        assert_eq!(total, 1000);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let err = fetcher()
            .get("http://127.0.0.1:1/", &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ConnectionFailed(_)));
    }
}
