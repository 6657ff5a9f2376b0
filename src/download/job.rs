//! Download jobs
//!
//! A job takes one accepted content match through its remaining states:
//! acquiring the content, opening the output targets, streaming the content
//! into every formatter and cleaning up. Jobs never touch chain state; what
//! they need from their chain is copied into a [`JobSpec`] at setup.

use super::filename::{filename_from_address, filename_from_path, parse_content_disposition};
use super::formatter::{OutputFormatter, OutputTarget};
use super::output::{OrderedOutput, Ticket};
use super::progress::StatusReport;
use crate::chain::{insert_filename_args, ChainId, ContentMatch, DownloadStrategy, MatchChain};
use crate::crawler::{FetchedResponse, HttpFetcher, RenderedSession, SessionError};
use crate::document::{decode_data_url, Document, DocumentKind};
use crate::locator::{FormatArgs, Template};
use crate::FetchError;
use base64::Engine;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedSender;

/// Chunk size used when reading files for output
pub const READ_BUFFER_SIZE: usize = 32 * 1024;

const BROWSER_DOWNLOAD_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to download '{address}': {source}")]
    Fetch { address: String, source: FetchError },

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Session(#[from] SessionError),

    /// The job was dropped on purpose, e.g. an existing file
    #[error("{0}")]
    Skipped(String),

    #[error("interrupted")]
    Aborted,
}

/// What a job needs to know about its chain
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub chain: ChainId,
    pub print_format: Option<Template>,
    pub save_format: Option<Template>,
    pub write_format: Option<Template>,
    pub forward_format: Option<Template>,
    pub forward_chains: Vec<ChainId>,
    pub filename_default_format: Option<Template>,
    pub need_content: bool,
    pub need_filename: bool,
    pub need_output_multipass: bool,
    pub content_is_link: bool,
    pub overwrite_files: bool,
    pub allow_slashes_in_labels: bool,
    pub escape_sequence: String,
    pub download_strategy: DownloadStrategy,
}

impl JobSpec {
    pub fn from_chain(chain: &MatchChain) -> Self {
        Self {
            chain: chain.id,
            print_format: chain.print_format.clone(),
            save_format: chain.save_format.clone(),
            write_format: chain.write_format.clone(),
            forward_format: chain.forward_format.clone(),
            forward_chains: chain.forward_chains.clone(),
            filename_default_format: chain.filename_default_format.clone(),
            need_content: chain.flags.need_content,
            need_filename: chain.flags.need_filename,
            need_output_multipass: chain.flags.need_output_multipass,
            content_is_link: chain.content_is_link,
            overwrite_files: chain.overwrite_files,
            allow_slashes_in_labels: chain.allow_slashes_in_labels,
            escape_sequence: chain.escape_sequence.clone(),
            download_strategy: chain.download_strategy,
        }
    }

    fn is_valid_label(&self, label: &str) -> bool {
        self.allow_slashes_in_labels || !(label.contains('/') || label.contains('\\'))
    }
}

/// Acquired content of a job
#[derive(Debug)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
    Stream(FetchedResponse),
    File(PathBuf),
    /// A file the job owns and removes when it ends
    TempFile(PathBuf),
    /// Nothing reads the content
    Unneeded,
}

/// Shared environment of all jobs
#[derive(Debug, Clone)]
pub struct JobEnv {
    pub fetcher: HttpFetcher,
    pub abort: Arc<AtomicBool>,
    /// Receives virtual documents for content forward chains
    pub forward: UnboundedSender<Document>,
    /// Directory for multipass buffers, the system default if unset
    pub temp_dir: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl JobEnv {
    fn check_abort(&self) -> Result<(), JobError> {
        if self.abort.load(Ordering::SeqCst) {
            Err(JobError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// ` (di=.., ci=..)` suffix used in messages about a content match
pub fn match_context(cm: &ContentMatch) -> String {
    match (cm.di, cm.ci) {
        (Some(di), Some(ci)) => format!(" (di={}, ci={})", di, ci),
        (Some(di), None) => format!(" (di={})", di),
        (None, Some(ci)) => format!(" (ci={})", ci),
        (None, None) => String::new(),
    }
}

pub struct DownloadJob {
    pub cm: ContentMatch,
    spec: Arc<JobSpec>,
    content: Option<Content>,
    filename: Option<String>,
    save_path: Option<PathBuf>,
    cookies: Vec<(String, String)>,
    ticket: Option<Ticket>,
    bounded_print: bool,
    /// The ticket belongs to the caller and stays open after the run
    shared_ticket: bool,
    report: Option<Arc<StatusReport>>,
    /// Multipass buffer, removed on drop
    buffer_file: Option<tempfile::TempPath>,
    tee: Option<File>,
    created_save_file: Option<PathBuf>,
}

impl DownloadJob {
    pub fn new(cm: ContentMatch, spec: Arc<JobSpec>) -> Self {
        Self {
            cm,
            spec,
            content: None,
            filename: None,
            save_path: None,
            cookies: Vec::new(),
            ticket: None,
            bounded_print: true,
            shared_ticket: false,
            report: None,
            buffer_file: None,
            tee: None,
            created_save_file: None,
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// The content is a link that has to be read
    pub fn requires_download(&self) -> bool {
        self.spec.need_content && self.spec.content_is_link
    }

    pub fn context(&self) -> String {
        format!("{}{}", self.cm.document.path, match_context(&self.cm))
    }

    pub fn address(&self) -> &str {
        &self.cm.content.result
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    pub fn set_save_path(&mut self, path: PathBuf) {
        self.save_path = Some(path);
    }

    pub fn set_cookies(&mut self, cookies: Vec<(String, String)>) {
        self.cookies = cookies;
    }

    pub fn set_report(&mut self, report: Arc<StatusReport>) {
        self.report = Some(report);
    }

    /// Takes a place in the ordered output if the job prints
    ///
    /// Unbounded jobs buffer past the print budget; they run on the task that
    /// holds the scheduler's ticket and must not wait for it.
    pub fn claim_ticket(&mut self, output: &OrderedOutput, bounded: bool) {
        if self.spec.print_format.is_some() {
            self.ticket = Some(output.request_ticket());
            self.bounded_print = bounded;
            self.shared_ticket = false;
        }
    }

    /// Prints on a ticket the caller holds instead of taking one
    pub fn share_ticket(&mut self, ticket: Ticket) {
        if self.spec.print_format.is_some() {
            self.ticket = Some(ticket);
            self.bounded_print = false;
            self.shared_ticket = true;
        }
    }

    pub fn ticket(&self) -> Option<Ticket> {
        self.ticket
    }

    /// Display name for progress reports
    pub fn display_name(&self) -> String {
        if let Some(path) = &self.save_path {
            return path.to_string_lossy().into_owned();
        }
        self.filename
            .clone()
            .unwrap_or_else(|| self.cm.content.result.clone())
    }

    fn format_args(&self) -> FormatArgs {
        let mut args = self.cm.format_args(&self.spec.escape_sequence);
        if let Some(filename) = &self.filename {
            insert_filename_args(filename, &mut args);
        }
        args
    }

    fn fallback_filename(&mut self, from_address: bool) {
        if self.filename.is_some() || !self.spec.need_filename {
            return;
        }
        if from_address {
            let address = &self.cm.content.result;
            self.filename = if self.cm.document.kind.derived() == DocumentKind::File {
                filename_from_path(address)
            } else {
                filename_from_address(address)
            };
            if self.filename.is_some() {
                return;
            }
        }
        if let Some(template) = &self.spec.filename_default_format {
            self.filename = Some(template.render(&self.format_args()));
        }
    }

    fn update_report(&self, bytes: u64) {
        if let Some(report) = &self.report {
            report.submit_update(bytes);
        }
    }

    fn set_expected(&self, expected: Option<u64>) {
        if let Some(report) = &self.report {
            report.set_expected(expected);
        }
    }

    fn fetch_error(&self, source: FetchError) -> JobError {
        JobError::Fetch {
            address: self.cm.content.result.clone(),
            source,
        }
    }

    /// Reads the content from its source
    pub async fn acquire(&mut self, env: &JobEnv) -> Result<(), JobError> {
        if self.content.is_some() {
            return Ok(());
        }
        if !self.spec.content_is_link {
            self.content = Some(Content::Text(self.cm.content.result.clone()));
            self.fallback_filename(false);
            return Ok(());
        }
        if !self.spec.need_content {
            self.content = Some(Content::Unneeded);
            self.fallback_filename(true);
            return Ok(());
        }

        let address = self.cm.content.result.clone();
        if address.starts_with("data:") {
            let data = decode_data_url(&address).map_err(|e| self.fetch_error(e))?;
            self.set_expected(Some(data.data.len() as u64));
            self.content = Some(Content::Bytes(data.data));
            self.fallback_filename(false);
        } else if self.cm.document.kind.derived() == DocumentKind::File
            || address.starts_with("file://")
        {
            let path = PathBuf::from(address.strip_prefix("file://").unwrap_or(&address));
            if let Ok(metadata) = tokio::fs::metadata(&path).await {
                self.set_expected(Some(metadata.len()));
            }
            self.content = Some(Content::File(path));
            self.fallback_filename(true);
        } else {
            tracing::info!("downloading content '{}'", address);
            let response = env
                .fetcher
                .get(&address, &self.cookies, &[])
                .await
                .map_err(|e| self.fetch_error(e))?;
            self.set_expected(response.content_length);
            if self.filename.is_none() {
                self.filename = response
                    .content_disposition
                    .as_deref()
                    .and_then(parse_content_disposition);
            }
            self.content = Some(Content::Stream(response));
            self.fallback_filename(true);
        }
        Ok(())
    }

    /// Reads the content through the browser session
    ///
    /// Runs on the scheduler, which owns the session. Local files and the
    /// external strategy only need the session's cookies; the download itself
    /// happens in [`acquire`](Self::acquire).
    pub async fn acquire_with_session(
        &mut self,
        session: &dyn RenderedSession,
        env: &JobEnv,
    ) -> Result<(), JobError> {
        if self.content.is_some() || !self.requires_download() {
            return Ok(());
        }
        let address = self.cm.content.result.clone();
        let local = (self.cm.document.kind.derived() == DocumentKind::File
            && !address.contains("://"))
            || address.starts_with("file://");
        if local || address.starts_with("data:") {
            return Ok(());
        }

        match self.spec.download_strategy {
            DownloadStrategy::External => {
                self.cookies = session.cookies().await?;
                Ok(())
            }
            DownloadStrategy::Internal => self.download_in_browser(session, env).await,
            DownloadStrategy::Fetch => self.fetch_in_page(session).await,
        }
    }

    async fn download_in_browser(
        &mut self,
        session: &dyn RenderedSession,
        env: &JobEnv,
    ) -> Result<(), JobError> {
        static DOWNLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

        let address = self.cm.content.result.clone();
        let page = session.current_address().await?;
        if host_of(&page) != host_of(&address) {
            return Err(JobError::Skipped(format!(
                "failed to download '{}': the internal download strategy does not work across origins",
                address
            )));
        }

        let name = format!(
            "chainscrape-{}-{}.dl",
            std::process::id(),
            DOWNLOAD_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let target = session.download_dir().join(&name);
        session
            .execute_script(
                r#"const a = document.createElement('a');
a.href = arguments[0];
a.download = arguments[1];
document.body.appendChild(a);
a.click();
document.body.removeChild(a);"#,
                vec![Value::String(address.clone()), Value::String(name)],
            )
            .await?;

        let started = Instant::now();
        let mut polls = 0u32;
        while !download_complete(&target).await {
            env.check_abort()?;
            if started.elapsed() > env.request_timeout {
                return Err(self.fetch_error(FetchError::Timeout));
            }
            polls += 1;
            if polls % 10 == 0 && !session.is_alive().await {
                return Err(SessionError::Died.into());
            }
            tokio::time::sleep(BROWSER_DOWNLOAD_POLL).await;
        }
        self.content = Some(Content::TempFile(target));
        self.fallback_filename(true);
        Ok(())
    }

    async fn fetch_in_page(&mut self, session: &dyn RenderedSession) -> Result<(), JobError> {
        let address = self.cm.content.result.clone();
        let result = session
            .execute_async_script(
                r#"const done = arguments[arguments.length - 1];
let disposition = null;
fetch(arguments[0], { method: 'GET' })
    .then(res => {
        disposition = res.headers.get('Content-Disposition');
        return res.blob();
    })
    .then(blob => {
        const reader = new FileReader();
        reader.onload = () => {
            const r = reader.result;
            done({ ok: r.substr(r.indexOf(',') + 1), content_disposition: disposition });
        };
        reader.onerror = () => done({ error: String(reader.error) });
        reader.readAsDataURL(blob);
    })
    .catch(ex => done({ error: ex.message }));"#,
                vec![Value::String(address.clone())],
            )
            .await?;

        if let Some(error) = result.get("error").and_then(Value::as_str) {
            let page = session.current_address().await.unwrap_or_default();
            let hint = if host_of(&page) != host_of(&address) {
                " (potential CORS issue)"
            } else {
                ""
            };
            return Err(JobError::Skipped(format!(
                "in-page download of '{}' failed{}: {}",
                address, hint, error
            )));
        }
        let payload = result.get("ok").and_then(Value::as_str).unwrap_or("");
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| self.fetch_error(FetchError::Other(e.to_string())))?;
        self.set_expected(Some(data.len() as u64));
        self.filename = result
            .get("content_disposition")
            .and_then(Value::as_str)
            .and_then(parse_content_disposition);
        self.content = Some(Content::Bytes(data));
        self.fallback_filename(true);
        Ok(())
    }

    /// Renders the save path, acquiring the content first when the path
    /// depends on the filename
    pub async fn resolve_save_path(&mut self, env: &JobEnv) -> Result<Option<PathBuf>, JobError> {
        if self.save_path.is_some() {
            return Ok(self.save_path.clone());
        }
        let Some(save_format) = self.spec.save_format.clone() else {
            return Ok(None);
        };
        if let Some(label) = &self.cm.label {
            if !self.spec.is_valid_label(&label.result) {
                return Err(JobError::Skipped(format!(
                    "matched label '{}' would contain a slash, skipping this content",
                    label.result
                )));
            }
        }
        if self.spec.need_filename {
            self.acquire(env).await?;
        }
        let path = save_format.render(&self.format_args());
        if path.is_empty() {
            return Err(JobError::Skipped("generated save path is empty".to_string()));
        }
        Ok(Some(PathBuf::from(path)))
    }

    /// Runs the job to completion, reporting failures instead of returning
    /// them
    ///
    /// An owned print ticket is always declared done, so that an aborted or
    /// failed job never stalls the output of later ones. A shared ticket is
    /// only flushed.
    pub async fn run(mut self, env: &JobEnv, output: &Arc<OrderedOutput>) -> bool {
        let result = self.run_inner(env, output).await;
        let success = result.is_ok();

        match result {
            Ok(()) => {}
            Err(JobError::Aborted) => tracing::debug!("{}: job interrupted", self.context()),
            Err(e) => tracing::warn!("{}: {}", self.context(), e),
        }
        if let Some(report) = &self.report {
            report.finish();
        }
        if let Some(ticket) = self.ticket {
            let written = if self.shared_ticket {
                output.flush(ticket)
            } else {
                output.declare_done(ticket)
            };
            if let Err(e) = written {
                tracing::error!("failed to write output: {}", e);
            }
        }
        if let Some(Content::TempFile(path)) = &self.content {
            let _ = tokio::fs::remove_file(path).await;
        }
        if !success {
            if let Some(path) = &self.created_save_file {
                let _ = tokio::fs::remove_file(path).await;
            }
        }
        if self.requires_download() {
            if success {
                tracing::debug!("finished downloading {}", self.cm.content.result);
            } else {
                tracing::debug!("failed to download {}", self.cm.content.result);
            }
        }
        success
    }

    async fn run_inner(&mut self, env: &JobEnv, output: &Arc<OrderedOutput>) -> Result<(), JobError> {
        env.check_abort()?;
        self.save_path = self.resolve_save_path(env).await?;
        self.acquire(env).await?;
        env.check_abort()?;
        if let Some(report) = &self.report {
            report.set_name(&self.display_name());
        }

        let args = self.format_args();
        let mut formatters = Vec::new();

        if let Some(path) = self.save_path.clone() {
            let file = self.create_save_file(&path).await?;
            if let Some(write_format) = &self.spec.write_format {
                formatters.push(OutputFormatter::new(
                    write_format,
                    args.clone(),
                    OutputTarget::File { file, path },
                ));
            }
        }
        if let (Some(print_format), Some(ticket)) = (&self.spec.print_format, self.ticket) {
            formatters.push(OutputFormatter::new(
                print_format,
                args.clone(),
                OutputTarget::Print {
                    output: output.clone(),
                    ticket,
                    bounded: self.bounded_print,
                },
            ));
        }
        let forward_index = self.spec.forward_format.as_ref().map(|forward_format| {
            formatters.push(OutputFormatter::new(
                forward_format,
                args.clone(),
                OutputTarget::Collect(Vec::new()),
            ));
            formatters.len() - 1
        });

        let replay = self.prepare_replay(env).await?;
        let mut pass = 0;
        loop {
            let mut waiting = Vec::new();
            for (i, formatter) in formatters.iter_mut().enumerate() {
                if formatter.advance().await? {
                    waiting.push(i);
                }
            }
            if waiting.is_empty() {
                break;
            }
            if pass == 0 {
                self.first_pass(env, &mut formatters, &waiting).await?;
            } else {
                self.replay_pass(env, &replay, &mut formatters, &waiting).await?;
            }
            for &i in &waiting {
                formatters[i].end_content();
            }
            pass += 1;
        }

        if let Some(index) = forward_index {
            let formatter = formatters.swap_remove(index);
            if let OutputTarget::Collect(buffer) = formatter.into_target() {
                let text = String::from_utf8_lossy(&buffer).into_owned();
                let doc = Document::forwarded(
                    &self.cm.document,
                    self.spec.chain,
                    self.spec.forward_chains.clone(),
                    text,
                );
                // the receiver is gone only once the run is over
                let _ = env.forward.send(doc);
            }
        }
        Ok(())
    }

    async fn create_save_file(&mut self, path: &Path) -> Result<File, JobError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.read(true).write(true);
        if self.spec.overwrite_files {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        match options.open(path).await {
            Ok(file) => {
                self.created_save_file = Some(path.to_path_buf());
                Ok(file)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(JobError::Skipped(format!(
                "file already exists: {}",
                path.display()
            ))),
            Err(e) => Err(JobError::Skipped(format!(
                "failed to write to file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Decides where later passes read the content from
    async fn prepare_replay(&mut self, env: &JobEnv) -> Result<Replay, JobError> {
        if !self.spec.need_output_multipass {
            return Ok(Replay::None);
        }
        Ok(match &self.content {
            Some(Content::Text(text)) => Replay::Memory(text.clone().into_bytes()),
            Some(Content::Bytes(data)) => Replay::Memory(data.clone()),
            Some(Content::File(path)) | Some(Content::TempFile(path)) => Replay::File(path.clone()),
            Some(Content::Stream(_)) => {
                let save_is_raw = self
                    .spec
                    .write_format
                    .as_ref()
                    .map_or(false, |t| t.source() == "{c}");
                match (&self.save_path, save_is_raw) {
                    (Some(path), true) => Replay::File(path.clone()),
                    _ => {
                        let named = match &env.temp_dir {
                            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
                            None => tempfile::NamedTempFile::new()?,
                        };
                        let (file, path) = named.into_parts();
                        let replay = Replay::File(path.to_path_buf());
                        self.tee = Some(File::from_std(file));
                        self.buffer_file = Some(path);
                        replay
                    }
                }
            }
            Some(Content::Unneeded) | None => Replay::None,
        })
    }

    async fn first_pass(
        &mut self,
        env: &JobEnv,
        formatters: &mut [OutputFormatter],
        waiting: &[usize],
    ) -> Result<(), JobError> {
        match self.content.take() {
            Some(Content::Text(text)) => {
                self.update_report(text.len() as u64);
                write_all(formatters, waiting, text.as_bytes()).await?;
                self.content = Some(Content::Text(text));
            }
            Some(Content::Bytes(data)) => {
                self.update_report(data.len() as u64);
                write_all(formatters, waiting, &data).await?;
                self.content = Some(Content::Bytes(data));
            }
            Some(Content::File(path)) => {
                self.stream_file(env, &path, formatters, waiting, true).await?;
                self.content = Some(Content::File(path));
            }
            Some(Content::TempFile(path)) => {
                let result = self.stream_file(env, &path, formatters, waiting, true).await;
                self.content = Some(Content::TempFile(path));
                result?;
            }
            Some(Content::Stream(mut response)) => {
                let mut tee = self.tee.take();
                while let Some(chunk) = response.chunk().await.map_err(|e| self.fetch_error(e))? {
                    env.check_abort()?;
                    self.update_report(chunk.len() as u64);
                    write_all(formatters, waiting, &chunk).await?;
                    if let Some(tee) = tee.as_mut() {
                        tee.write_all(&chunk).await?;
                    }
                }
                if let Some(mut tee) = tee {
                    tee.flush().await?;
                }
            }
            Some(Content::Unneeded) | None => {}
        }
        Ok(())
    }

    async fn replay_pass(
        &self,
        env: &JobEnv,
        replay: &Replay,
        formatters: &mut [OutputFormatter],
        waiting: &[usize],
    ) -> Result<(), JobError> {
        match replay {
            Replay::Memory(data) => write_all(formatters, waiting, data).await?,
            Replay::File(path) => {
                self.stream_file(env, path, formatters, waiting, false).await?
            }
            Replay::None => {}
        }
        Ok(())
    }

    async fn stream_file(
        &self,
        env: &JobEnv,
        path: &Path,
        formatters: &mut [OutputFormatter],
        waiting: &[usize],
        report: bool,
    ) -> Result<(), JobError> {
        let mut file = File::open(path).await.map_err(|e| {
            JobError::Skipped(format!("failed to open file '{}': {}", path.display(), e))
        })?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            env.check_abort()?;
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            if report {
                self.update_report(n as u64);
            }
            write_all(formatters, waiting, &buffer[..n]).await?;
        }
        Ok(())
    }
}

enum Replay {
    None,
    Memory(Vec<u8>),
    /// A file holding the content, possibly filled during the first pass
    File(PathBuf),
}

async fn write_all(
    formatters: &mut [OutputFormatter],
    waiting: &[usize],
    chunk: &[u8],
) -> io::Result<()> {
    for &i in waiting {
        formatters[i].write_content(chunk).await?;
    }
    Ok(())
}

/// Finished browser downloads have no partial file next to them
async fn download_complete(target: &Path) -> bool {
    if tokio::fs::metadata(target).await.is_err() {
        return false;
    }
    for suffix in [".part", ".crdownload"] {
        let mut partial = target.as_os_str().to_owned();
        partial.push(suffix);
        if tokio::fs::metadata(Path::new(&partial)).await.is_ok() {
            return false;
        }
    }
    true
}

fn host_of(address: &str) -> Option<String> {
    url::Url::parse(address)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::output::SharedBuffer;
    use crate::crawler::build_http_client;
    use crate::locator::LocatorMatch;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn template(source: &str) -> Option<Template> {
        Some(Template::parse(source).unwrap())
    }

    fn spec() -> JobSpec {
        JobSpec {
            chain: 0,
            print_format: template("{c}\n"),
            save_format: None,
            write_format: None,
            forward_format: None,
            forward_chains: Vec::new(),
            filename_default_format: template("dl_{ci:03}.dat"),
            need_content: true,
            need_filename: false,
            need_output_multipass: false,
            content_is_link: false,
            overwrite_files: true,
            allow_slashes_in_labels: false,
            escape_sequence: "<END>".to_string(),
            download_strategy: DownloadStrategy::External,
        }
    }

    fn env() -> (JobEnv, mpsc::UnboundedReceiver<Document>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let env = JobEnv {
            fetcher: HttpFetcher::new(
                build_http_client("TestScraper/1.0", Duration::from_secs(5)).unwrap(),
            ),
            abort: Arc::new(AtomicBool::new(false)),
            forward: tx,
            temp_dir: None,
            request_timeout: Duration::from_secs(5),
        };
        (env, rx)
    }

    fn output() -> (Arc<OrderedOutput>, SharedBuffer) {
        let sink = SharedBuffer::default();
        (
            Arc::new(OrderedOutput::new(Box::new(sink.clone()), 1 << 20)),
            sink,
        )
    }

    fn job(result: &str, spec: JobSpec, doc: Document) -> DownloadJob {
        let mut cm = ContentMatch::new(0, LocatorMatch::new(result), None, Arc::new(doc));
        cm.ci = Some(1);
        cm.di = Some(1);
        DownloadJob::new(cm, Arc::new(spec))
    }

    fn url_doc(address: &str) -> Document {
        Document::new(DocumentKind::Url, address, vec![0])
    }

    #[tokio::test]
    async fn test_raw_content_printed() {
        let (env, _rx) = env();
        let (output, sink) = output();
        let mut job = job("hello", spec(), url_doc("https://a.com"));
        job.claim_ticket(&output, true);
        assert!(!job.requires_download());

        assert!(job.run(&env, &output).await);
        assert_eq!(sink.contents(), b"hello\n");
    }

    #[tokio::test]
    async fn test_link_saved_with_disposition_filename() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"data.bin\"")
                    .set_body_bytes(b"payload".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut spec = spec();
        spec.content_is_link = true;
        spec.need_filename = true;
        spec.print_format = template("{fn}\n");
        spec.save_format = template(&format!("{}/out/{{fn}}", dir.path().display()));
        spec.write_format = template("{c}");

        let (env, _rx) = env();
        let (output, sink) = output();
        let mut job = job(&format!("{}/get", server.uri()), spec, url_doc(&server.uri()));
        job.claim_ticket(&output, true);
        assert!(job.requires_download());

        assert!(job.run(&env, &output).await);
        let saved = std::fs::read(dir.path().join("out/data.bin")).unwrap();
        assert_eq!(saved, b"payload");
        assert_eq!(sink.contents(), b"data.bin\n");
    }

    #[tokio::test]
    async fn test_stream_multipass_through_temp_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abc"))
            .mount(&server)
            .await;

        let mut spec = spec();
        spec.content_is_link = true;
        spec.print_format = template("<{c}|{c}>");
        spec.need_output_multipass = true;

        let (env, _rx) = env();
        let (output, sink) = output();
        let mut job = job(&format!("{}/text", server.uri()), spec, url_doc(&server.uri()));
        job.claim_ticket(&output, true);

        assert!(job.run(&env, &output).await);
        assert_eq!(sink.contents(), b"<abc|abc>");
    }

    #[tokio::test]
    async fn test_save_file_serves_as_multipass_buffer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("xyz"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let save = dir.path().join("x.txt");
        let mut spec = spec();
        spec.content_is_link = true;
        spec.save_format = template(&save.display().to_string());
        spec.write_format = template("{c}");
        spec.print_format = template("{c}{c}\n");
        spec.need_output_multipass = true;

        let (env, _rx) = env();
        let (output, sink) = output();
        let mut job = job(&format!("{}/text", server.uri()), spec, url_doc(&server.uri()));
        job.claim_ticket(&output, true);

        assert!(job.run(&env, &output).await);
        assert_eq!(std::fs::read(&save).unwrap(), b"xyz");
        assert_eq!(sink.contents(), b"xyzxyz\n");
    }

    #[tokio::test]
    async fn test_existing_file_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let save = dir.path().join("keep.txt");
        std::fs::write(&save, b"old").unwrap();

        let mut spec = spec();
        spec.print_format = None;
        spec.save_format = template(&save.display().to_string());
        spec.write_format = template("{c}");
        spec.overwrite_files = false;

        let (env, _rx) = env();
        let (output, _sink) = output();
        let job = job("new", spec, url_doc("https://a.com"));

        assert!(!job.run(&env, &output).await);
        assert_eq!(std::fs::read(&save).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_label_with_slash_skipped() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec();
        spec.print_format = None;
        spec.save_format = template(&format!("{}/{{l}}", dir.path().display()));
        spec.write_format = template("{c}");

        let (env, _rx) = env();
        let (output, _sink) = output();
        let mut job = job("text", spec, url_doc("https://a.com"));
        job.cm.label = Some(LocatorMatch::new("a/b"));

        assert!(!job.run(&env, &output).await);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_forwarded_content() {
        let mut spec = spec();
        spec.print_format = None;
        spec.forward_format = template("<p>{c}</p>");
        spec.forward_chains = vec![1];

        let (env, mut rx) = env();
        let (output, _sink) = output();
        let job = job("inner", spec, url_doc("https://a.com/page"));

        assert!(job.run(&env, &output).await);
        let doc = rx.try_recv().unwrap();
        assert_eq!(doc.kind, DocumentKind::ContentMatch);
        assert_eq!(doc.inline_text.as_deref(), Some("<p>inner</p>"));
        assert_eq!(doc.chains, vec![1]);
    }

    #[tokio::test]
    async fn test_aborted_job_releases_ticket() {
        let (env, _rx) = env();
        let (output, sink) = output();
        let mut first = job("first", spec(), url_doc("https://a.com"));
        let mut second = job("second", spec(), url_doc("https://a.com"));
        first.claim_ticket(&output, true);
        second.claim_ticket(&output, true);

        env.abort.store(true, Ordering::SeqCst);
        assert!(!first.run(&env, &output).await);
        env.abort.store(false, Ordering::SeqCst);
        assert!(second.run(&env, &output).await);
        assert_eq!(sink.contents(), b"second\n");
    }

    #[tokio::test]
    async fn test_shared_ticket_stays_open() {
        let (env, _rx) = env();
        let (output, sink) = output();
        output.reset();
        let mut inline = job("inline", spec(), url_doc("https://a.com"));
        inline.share_ticket(0);
        let mut later = job("later", spec(), url_doc("https://a.com"));
        later.claim_ticket(&output, true);

        assert!(inline.run(&env, &output).await);
        assert_eq!(sink.contents(), b"inline\n");
        assert!(later.run(&env, &output).await);
        // the caller still holds ticket 0
        assert_eq!(sink.contents(), b"inline\n");

        output.main_done().unwrap();
        assert_eq!(sink.contents(), b"inline\nlater\n");
    }

    #[tokio::test]
    async fn test_local_file_link() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("img.png");
        std::fs::write(&source, b"PNG").unwrap();

        let mut spec = spec();
        spec.content_is_link = true;
        spec.need_filename = true;
        spec.print_format = template("{fn}:{c}");

        let (env, _rx) = env();
        let (output, sink) = output();
        let doc = Document::new(DocumentKind::File, "page.html", vec![0]);
        let mut job = job(&source.display().to_string(), spec, doc);
        job.claim_ticket(&output, true);

        assert!(job.run(&env, &output).await);
        assert_eq!(sink.contents(), b"img.png:PNG");
    }

    #[test]
    fn test_match_context() {
        let j = job("x", spec(), url_doc("https://a.com"));
        assert_eq!(match_context(&j.cm), " (di=1, ci=1)");
    }
}
