//! Rendered documents
//!
//! A [`RenderedSession`] is a live browser page that the scheduler navigates
//! and re-reads while scripts and timers change it. [`WebDriverSession`]
//! drives a real browser through WebDriver.

use crate::config::{BrowserConfig, BrowserKind};
use crate::SetupError;
use async_trait::async_trait;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder, Locator};
use futures_util::future::BoxFuture;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Nested frames deeper than this are left as they are
const MAX_FRAME_DEPTH: usize = 8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The script threw
    #[error("script error: {0}")]
    Script(String),

    #[error("timed out")]
    Timeout,

    #[error("the browser session was closed unexpectedly")]
    Died,

    #[error("{0}")]
    Other(String),
}

/// A live browser page
#[async_trait]
pub trait RenderedSession: Send + Sync {
    async fn navigate(&self, address: &str) -> Result<(), SessionError>;

    async fn current_address(&self) -> Result<String, SessionError>;

    /// Source of the current frame, without frame contents
    async fn raw_source(&self) -> Result<String, SessionError>;

    /// `src` of every frame of the current frame, in document order
    async fn frame_sources(&self) -> Result<Vec<Option<String>>, SessionError>;

    async fn enter_frame(&self, index: usize) -> Result<(), SessionError>;

    async fn enter_parent_frame(&self) -> Result<(), SessionError>;

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, SessionError>;

    async fn execute_async_script(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError>;

    async fn is_alive(&self) -> bool;

    /// Cookies of the current page as name/value pairs
    async fn cookies(&self) -> Result<Vec<(String, String)>, SessionError>;

    /// Directory the browser saves downloads to
    fn download_dir(&self) -> &Path;

    async fn close(&self) -> Result<(), SessionError>;

    /// Page source with every frame replaced by its own flattened source
    async fn page_source(&self) -> Result<String, SessionError> {
        flatten_source(self, 0).await
    }
}

fn flatten_source<S: RenderedSession + ?Sized>(
    session: &S,
    depth: usize,
) -> BoxFuture<'_, Result<String, SessionError>> {
    Box::pin(async move {
        let source = session.raw_source().await?;
        if depth >= MAX_FRAME_DEPTH {
            return Ok(source);
        }
        let frames = session.frame_sources().await?;
        if frames.is_empty() {
            return Ok(source);
        }

        let mut sub_sources = Vec::with_capacity(frames.len());
        for index in 0..frames.len() {
            session.enter_frame(index).await?;
            let sub = flatten_source(session, depth + 1).await;
            session.enter_parent_frame().await?;
            sub_sources.push(sub?);
        }
        Ok(substitute_frames(&source, &frames, &sub_sources))
    })
}

fn iframe_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?is)<iframe\b[^>]*>.*?</iframe>").ok())
        .as_ref()
}

fn src_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?is)^<iframe\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).ok()
        })
        .as_ref()
}

fn placeholder_src(tag: &str) -> Option<String> {
    let caps = src_pattern()?.captures(tag)?;
    (1..=3).find_map(|i| caps.get(i)).map(|m| m.as_str().to_string())
}

/// Replaces the `<iframe>` elements of `source` with the sources of the live
/// frames
///
/// Placeholders are paired with frames by `src`, in order. Placeholders
/// without a matching frame stay untouched.
pub fn substitute_frames(source: &str, frame_srcs: &[Option<String>], sub_sources: &[String]) -> String {
    let Some(iframe) = iframe_pattern() else {
        return source.to_string();
    };
    let placeholders: Vec<_> = iframe.find_iter(source).collect();
    if placeholders.len() != frame_srcs.len() {
        tracing::warn!(
            "found {} frame placeholder(s) for {} live frame(s), leaving unmatched frames unexpanded",
            placeholders.len(),
            frame_srcs.len()
        );
    }

    let mut used = vec![false; frame_srcs.len()];
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for placeholder in placeholders {
        let src = placeholder_src(placeholder.as_str());
        let frame = frame_srcs
            .iter()
            .enumerate()
            .position(|(i, s)| !used[i] && *s == src);
        if let Some(i) = frame {
            used[i] = true;
            out.push_str(&source[last..placeholder.start()]);
            out.push_str(sub_sources.get(i).map_or("", String::as_str));
            last = placeholder.end();
        }
    }
    out.push_str(&source[last..]);
    out
}

fn map_cmd_error(e: CmdError) -> SessionError {
    match &e {
        CmdError::Standard(wd) => match wd.error {
            ErrorStatus::JavascriptError => SessionError::Script(wd.message.to_string()),
            ErrorStatus::InvalidSessionId | ErrorStatus::NoSuchWindow => SessionError::Died,
            ErrorStatus::ScriptTimeout | ErrorStatus::Timeout => SessionError::Timeout,
            _ => SessionError::Other(e.to_string()),
        },
        CmdError::Lost(_) => SessionError::Died,
        _ => SessionError::Other(e.to_string()),
    }
}

/// A browser driven through a WebDriver server
pub struct WebDriverSession {
    client: Client,
    download_dir: PathBuf,
    // keeps a generated download directory alive for the session
    _download_tmp: Option<tempfile::TempDir>,
}

impl WebDriverSession {
    /// Starts a new browser session
    pub async fn connect(config: &BrowserConfig) -> Result<Self, SetupError> {
        let (download_dir, download_tmp) = match &config.download_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .map_err(|e| SetupError::Session(format!("download directory: {}", e)))?;
                (dir.clone(), None)
            }
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix("chainscrape_dl_")
                    .tempdir()
                    .map_err(|e| SetupError::Session(format!("download directory: {}", e)))?;
                (tmp.path().to_path_buf(), Some(tmp))
            }
        };

        let mut builder =
            ClientBuilder::rustls().map_err(|e| SetupError::Session(e.to_string()))?;
        builder.capabilities(capabilities(config, &download_dir));
        let client = builder
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| SetupError::Session(e.to_string()))?;

        tracing::info!("connected to webdriver at {}", config.webdriver_url);
        Ok(Self {
            client,
            download_dir,
            _download_tmp: download_tmp,
        })
    }
}

fn capabilities(config: &BrowserConfig, download_dir: &Path) -> Map<String, Value> {
    let dir = download_dir.to_string_lossy();
    let mut caps = Map::new();
    match config.browser {
        BrowserKind::Firefox => {
            let args: Vec<&str> = if config.headless { vec!["-headless"] } else { vec![] };
            caps.insert(
                "moz:firefoxOptions".to_string(),
                json!({
                    "args": args,
                    "prefs": {
                        "browser.download.folderList": 2,
                        "browser.download.dir": dir,
                        "browser.download.useDownloadDir": true,
                        "browser.helperApps.neverAsk.saveToDisk": "application/octet-stream",
                    }
                }),
            );
        }
        BrowserKind::Chrome => {
            let args: Vec<&str> = if config.headless { vec!["--headless=new"] } else { vec![] };
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({
                    "args": args,
                    "prefs": {
                        "download.default_directory": dir,
                        "download.prompt_for_download": false,
                    }
                }),
            );
        }
    }
    caps
}

#[async_trait]
impl RenderedSession for WebDriverSession {
    async fn navigate(&self, address: &str) -> Result<(), SessionError> {
        self.client.goto(address).await.map_err(map_cmd_error)
    }

    async fn current_address(&self) -> Result<String, SessionError> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(map_cmd_error)
    }

    async fn raw_source(&self) -> Result<String, SessionError> {
        self.client.source().await.map_err(map_cmd_error)
    }

    async fn frame_sources(&self) -> Result<Vec<Option<String>>, SessionError> {
        let frames = self
            .client
            .find_all(Locator::Css("iframe"))
            .await
            .map_err(map_cmd_error)?;
        let mut srcs = Vec::with_capacity(frames.len());
        for frame in frames {
            srcs.push(frame.attr("src").await.map_err(map_cmd_error)?);
        }
        Ok(srcs)
    }

    async fn enter_frame(&self, index: usize) -> Result<(), SessionError> {
        let index = u16::try_from(index)
            .map_err(|_| SessionError::Other(format!("frame index {} out of range", index)))?;
        self.client
            .enter_frame(index)
            .await
            .map_err(map_cmd_error)
    }

    async fn enter_parent_frame(&self) -> Result<(), SessionError> {
        self.client.enter_parent_frame().await.map_err(map_cmd_error)
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        self.client.execute(script, args).await.map_err(map_cmd_error)
    }

    async fn execute_async_script(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError> {
        self.client
            .execute_async(script, args)
            .await
            .map_err(map_cmd_error)
    }

    async fn is_alive(&self) -> bool {
        self.client.windows().await.is_ok()
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>, SessionError> {
        let cookies = self.client.get_all_cookies().await.map_err(map_cmd_error)?;
        Ok(cookies
            .iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect())
    }

    fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.client.clone().close().await.map_err(map_cmd_error)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockSession;
    use super::*;

    #[test]
    fn test_substitute_frames_by_src() {
        let source = r#"<body><iframe src="a.html"></iframe><p>x</p><iframe src='b.html'></iframe></body>"#;
        let frames = vec![Some("b.html".to_string()), Some("a.html".to_string())];
        let subs = vec!["<b>B</b>".to_string(), "<a>A</a>".to_string()];
        assert_eq!(
            substitute_frames(source, &frames, &subs),
            "<body><a>A</a><p>x</p><b>B</b></body>"
        );
    }

    #[test]
    fn test_substitute_frames_count_mismatch() {
        let source = r#"<iframe src="a.html"></iframe><iframe src="gone.html"></iframe>"#;
        let frames = vec![Some("a.html".to_string())];
        let subs = vec!["A".to_string()];
        assert_eq!(
            substitute_frames(source, &frames, &subs),
            r#"A<iframe src="gone.html"></iframe>"#
        );
    }

    #[tokio::test]
    async fn test_page_source_flattens_frames() {
        let session = MockSession::new(&[r#"<div><iframe src="inner.html"></iframe></div>"#])
            .with_frames(&[("inner.html", "<span>inner</span>")]);
        let source = session.page_source().await.unwrap();
        assert_eq!(source, "<div><span>inner</span></div>");
    }

    #[tokio::test]
    async fn test_dead_session() {
        let session = MockSession::new(&["<p></p>"]);
        session.kill();
        assert!(!session.is_alive().await);
        assert_eq!(session.raw_source().await, Err(SessionError::Died));
    }
}
