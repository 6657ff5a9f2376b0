//! Crawler coordinator - main traversal logic
//!
//! This module contains the document loop that coordinates all aspects of a
//! run, including:
//! - Seeding the queue and fetching documents
//! - Running matching passes until the chains of a document are satisfied
//! - Confirming interactive chains and matches with the user
//! - Turning accepted content matches into download jobs
//! - Feeding forwarded content back into the queue

use crate::chain::{
    run_chain_pass, satisfaction, ChainId, ChainSet, ContentMatch, DocumentView, IndexSlot,
    MatchChain, Satisfaction,
};
use crate::config::Config;
use crate::crawler::interaction::{
    ask, parse_batch_answer, read_multiline, Choice, PollResult, Prompter, StdinPrompter,
};
use crate::crawler::scheduler::DocumentQueue;
use crate::crawler::{build_http_client, HttpFetcher, RenderedSession, SessionError, WebDriverSession};
use crate::document::{load_static, Document, DocumentKind};
use crate::download::{
    match_context, DownloadJob, DownloadManager, JobEnv, JobError, JobSpec, OrderedOutput,
};
use crate::locator::{LocatorMatch, PassOutcome};
use crate::url::{file_url, normalize_link};
use crate::{ScrapeError, SetupError};
use scraper::Html;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const READY_STATE_POLL: Duration = Duration::from_millis(50);

const CONTENT_CHOICES: &[Choice] = &[
    Choice::Accept,
    Choice::Reject,
    Choice::Edit,
    Choice::SkipChain,
    Choice::SkipDoc,
];

const RAW_CONTENT_CHOICES: &[Choice] = &[
    Choice::Accept,
    Choice::Reject,
    Choice::Edit,
    Choice::Inspect,
    Choice::SkipChain,
    Choice::SkipDoc,
];

/// Whether the document loop goes on after a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The browser session is gone
    Stop,
}

enum FetchFailure {
    SessionDied,
    Failed(String),
}

/// Skips requested while accepting the matches of one document
#[derive(Debug, Default)]
struct DocumentSkips {
    content: bool,
    documents: bool,
}

/// Main traversal coordinator
pub struct Coordinator {
    chains: ChainSet,
    specs: Vec<Arc<JobSpec>>,
    queue: DocumentQueue,
    fetcher: HttpFetcher,
    session: Option<Arc<dyn RenderedSession>>,
    session_dead: bool,
    prompter: Box<dyn Prompter>,
    manager: DownloadManager,
    forwarded: UnboundedReceiver<Document>,
    abort: Arc<AtomicBool>,
    request_timeout: Duration,
    poll_interval: Duration,
    documents_processed: usize,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `session` - Browser session for rendered documents, if any
    /// * `prompter` - Source of answers for interactive chains
    /// * `output` - Ordered stream printed content goes to
    /// * `abort` - Flag that stops the run once set
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Chains built and queue seeded
    /// * `Err(ScrapeError)` - A chain or seed document is invalid
    pub fn new(
        config: Config,
        session: Option<Arc<dyn RenderedSession>>,
        prompter: Box<dyn Prompter>,
        output: Arc<OrderedOutput>,
        abort: Arc<AtomicBool>,
    ) -> Result<Self, ScrapeError> {
        let context = &config.context;
        let chains = ChainSet::build(&config, session.is_some())?;
        let specs = chains
            .iter()
            .map(|c| Arc::new(JobSpec::from_chain(c)))
            .collect();

        let request_timeout = Duration::from_secs(context.request_timeout_secs);
        let client = build_http_client(&context.user_agent, request_timeout)
            .map_err(|e| SetupError::Other(format!("failed to build HTTP client: {}", e)))?;
        let fetcher = HttpFetcher::new(client);

        let mut queue = DocumentQueue::new(context.traversal);
        let mut seeds = Vec::with_capacity(config.documents.len());
        for entry in &config.documents {
            let doc_chains = entry
                .chains
                .clone()
                .unwrap_or_else(|| chains.ids().collect());
            let doc = match (&entry.url, &entry.file) {
                (Some(url), _) => {
                    let (address, _) = normalize_link(url, DocumentKind::Url, None, None)?;
                    Document::new(DocumentKind::Url, address, doc_chains)
                }
                (None, Some(file)) => Document::new(DocumentKind::File, file.clone(), doc_chains),
                (None, None) => {
                    return Err(SetupError::Other(
                        "document without url or file".to_string(),
                    )
                    .into())
                }
            };
            seeds.push(doc);
        }
        queue.push_seeds(seeds);

        output.reset();
        let (forward, forwarded) = mpsc::unbounded_channel();
        let env = JobEnv {
            fetcher: fetcher.clone(),
            abort: abort.clone(),
            forward,
            temp_dir: context.temp_dir.clone(),
            request_timeout,
        };
        let show_progress = context.progress && std::io::stdout().is_terminal();
        let manager = DownloadManager::new(output, env, context.parallel_jobs, show_progress);

        Ok(Self {
            chains,
            specs,
            queue,
            fetcher,
            session,
            session_dead: false,
            prompter,
            manager,
            forwarded,
            abort,
            request_timeout,
            poll_interval: Duration::from_millis(context.poll_frequency_ms),
            documents_processed: 0,
        })
    }

    /// Creates a coordinator reading answers from stdin and printing to
    /// stdout, connecting to the configured browser first
    pub async fn connect(config: Config, abort: Arc<AtomicBool>) -> Result<Self, ScrapeError> {
        let session: Option<Arc<dyn RenderedSession>> = match &config.context.browser {
            Some(browser) => Some(Arc::new(WebDriverSession::connect(browser).await?)),
            None => None,
        };
        let output = Arc::new(OrderedOutput::stdout(
            config.context.print_buffer_capacity,
        ));
        Self::new(
            config,
            session,
            Box::new(StdinPrompter::new()),
            output,
            abort,
        )
    }

    pub fn chains(&self) -> &ChainSet {
        &self.chains
    }

    /// Runs the document loop until the queue is exhausted
    ///
    /// Outstanding jobs are always waited for and held output is written,
    /// even when the loop ends with an error.
    pub async fn run(&mut self) -> Result<(), ScrapeError> {
        tracing::info!("starting run with {} queued document(s)", self.queue.len());
        let start_time = Instant::now();

        let result = self.run_loop().await;
        if result.is_err() {
            self.abort.store(true, Ordering::SeqCst);
        }
        let finished = self.manager.finish().await;

        if let Some(session) = &self.session {
            if !self.session_dead {
                if let Err(e) = session.close().await {
                    tracing::warn!("failed to close the browser session: {}", e);
                }
            }
        }
        result?;
        finished?;
        if self.abort.load(Ordering::SeqCst) {
            return Err(ScrapeError::Aborted);
        }

        let stats = self.manager.stats();
        tracing::info!(
            "processed {} document(s) in {:.1}s, {} job(s) completed, {} failed",
            self.documents_processed,
            start_time.elapsed().as_secs_f64(),
            stats.completed(),
            stats.failed()
        );
        Ok(())
    }

    async fn run_loop(&mut self) -> Result<(), ScrapeError> {
        loop {
            while let Some(doc) = self.queue.pop() {
                self.check_abort()?;
                if self.process_document(doc).await? == Flow::Stop {
                    return Ok(());
                }
            }

            // jobs may still forward content into new documents
            self.manager.wait_until_done().await?;
            let mut forwarded = 0;
            while let Ok(doc) = self.forwarded.try_recv() {
                self.queue.push_forwarded(doc);
                forwarded += 1;
            }
            if forwarded == 0 {
                return Ok(());
            }
            tracing::debug!("processing {} forwarded content document(s)", forwarded);
        }
    }

    fn check_abort(&self) -> Result<(), ScrapeError> {
        if self.abort.load(Ordering::SeqCst) {
            Err(ScrapeError::Aborted)
        } else {
            Ok(())
        }
    }

    fn report_session_died(&mut self) {
        if !self.session_dead {
            self.session_dead = true;
            tracing::error!("the browser session was closed unexpectedly");
        }
    }

    /// Session a document is read through; forwarded content never is
    fn session_for(&self, doc: &Document) -> Option<Arc<dyn RenderedSession>> {
        match doc.kind {
            DocumentKind::ContentMatch => None,
            _ => self.session.clone(),
        }
    }

    #[tracing::instrument(skip_all, fields(path = %doc.path))]
    async fn process_document(&mut self, mut doc: Document) -> Result<Flow, ScrapeError> {
        let active: Vec<ChainId> = doc
            .chains
            .iter()
            .copied()
            .filter(|&id| self.chains.get(id).map_or(false, MatchChain::is_unsatisfied))
            .collect();
        if active.is_empty() {
            tracing::debug!("no chain needs {}, skipping", doc.path);
            return Ok(Flow::Continue);
        }
        self.documents_processed += 1;

        let session = self.session_for(&doc);
        let doc_as_content = self.session.is_none() && !self.chains.any_parses_documents(&active);
        let static_content = doc.kind != DocumentKind::Url || session.is_none();

        let (mut text, mut address) = (String::new(), doc.path.clone());
        if !doc_as_content {
            match self.fetch(&mut doc, session.as_deref()).await {
                Ok(fetched) => (text, address) = fetched,
                Err(FetchFailure::SessionDied) => {
                    self.report_session_died();
                    return Ok(Flow::Stop);
                }
                Err(FetchFailure::Failed(e)) => {
                    tracing::error!("Failed to fetch {}: {}", doc.path, e);
                    return Ok(Flow::Continue);
                }
            }
        }
        let doc = Arc::new(doc);
        let needs_tree = !doc_as_content
            && active
                .iter()
                .any(|&id| self.chains[id].flags.parses_documents);
        let mut tree = needs_tree.then(|| Html::parse_document(&text));

        let session_active = self.session.is_some();
        let mut unsatisfied = active.clone();
        let mut satisfied: Vec<ChainId> = Vec::new();
        let mut batch: Vec<ChainId> = Vec::new();
        let mut last_prompt = String::new();
        let mut content_change = true;
        let mut session_died = false;
        let mut try_number = 0;

        while !unsatisfied.is_empty() {
            self.check_abort()?;
            try_number += 1;
            let mut same_content = static_content && !content_change;

            if try_number > 1 && !same_content {
                if let Some(session) = &session {
                    match read_page(session.as_ref()).await {
                        Ok((current, source)) => {
                            same_content = source == text;
                            address = current;
                            if !same_content {
                                tree = needs_tree.then(|| Html::parse_document(&source));
                                text = source;
                            }
                        }
                        Err(SessionError::Died) => {
                            session_died = true;
                            break;
                        }
                        Err(e) => {
                            tracing::warn!("failed to read the page source: {}", e);
                            same_content = true;
                        }
                    }
                }
            }

            if !same_content || content_change {
                content_change = false;
                batch.clear();
                let view = DocumentView {
                    doc: &doc,
                    text: &text,
                    tree: tree.as_ref(),
                    address: &address,
                    session: session.as_deref(),
                    doc_as_content,
                };
                for id in unsatisfied.clone() {
                    let chain = &mut self.chains[id];
                    let outcome = run_chain_pass(chain, &view).await?;
                    match satisfaction(chain, session_active) {
                        Satisfaction::Satisfied => {
                            tracing::debug!("chain {} satisfied for {}", id, doc.path);
                            satisfied.push(id);
                            unsatisfied.retain(|&c| c != id);
                        }
                        Satisfaction::NeedsConfirmation => batch.push(id),
                        Satisfaction::Unsatisfied => {}
                    }
                    if outcome == PassOutcome::Mutated {
                        content_change = true;
                        break;
                    }
                }
                if content_change {
                    continue;
                }
            }

            if !batch.is_empty() {
                let poll = !static_content;
                match self.confirm_batch(&batch, &address, poll, &mut last_prompt).await {
                    Some(Choice::Accept) => {
                        satisfied.extend(batch.iter().copied());
                        unsatisfied.retain(|c| !batch.contains(c));
                        batch.clear();
                    }
                    Some(_) => {
                        tracing::debug!("skipping {} chain(s) on {}", batch.len(), doc.path);
                        unsatisfied.retain(|c| !batch.contains(c));
                        batch.clear();
                    }
                    None => {}
                }
            }

            if !unsatisfied.is_empty() && batch.is_empty() {
                if static_content {
                    break;
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        let mut skips = DocumentSkips::default();
        let mut new_docs = Vec::new();
        for &id in &active {
            if satisfied.contains(&id) {
                self.accept_chain(id, &doc.path, &address, &mut skips, &mut new_docs)
                    .await?;
            } else {
                let state = &mut self.chains[id].state;
                state.content_matches.clear();
                state.document_matches.clear();
                state.handled_content.clear();
                state.handled_documents.clear();
            }
        }
        if !new_docs.is_empty() {
            tracing::debug!("found {} new document(s) in {}", new_docs.len(), doc.path);
        }
        self.queue.extend(new_docs);

        if session_died {
            self.report_session_died();
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    /// Reads a document, through the session when one is given
    ///
    /// Returns the text and the address links in it are resolved against.
    async fn fetch(
        &self,
        doc: &mut Document,
        session: Option<&dyn RenderedSession>,
    ) -> Result<(String, String), FetchFailure> {
        let Some(session) = session else {
            let (encoding, forced) = match doc.source_chain.and_then(|c| self.chains.get(c)) {
                Some(chain) => chain.encoding_for(doc),
                None => (
                    doc.encoding.clone().unwrap_or_else(|| "utf-8".to_string()),
                    doc.forced_encoding,
                ),
            };
            let (text, used) = load_static(doc, &self.fetcher, &encoding, forced)
                .await
                .map_err(|e| FetchFailure::Failed(e.to_string()))?;
            doc.encoding = Some(used);
            return Ok((text, doc.path.clone()));
        };

        let target = if doc.kind.is_file_addressed() {
            file_url(&doc.path).map_err(|e| FetchFailure::Failed(e.to_string()))?
        } else {
            doc.path.clone()
        };
        tracing::info!("loading {} '{}'", doc.kind, doc.path);

        let result = async {
            session.navigate(&target).await?;
            self.wait_until_ready(session).await?;
            read_page(session).await
        }
        .await;
        match result {
            Ok((address, text)) => {
                let address = if doc.kind.is_file_addressed() {
                    doc.path.clone()
                } else {
                    address
                };
                Ok((text, address))
            }
            Err(SessionError::Died) => Err(FetchFailure::SessionDied),
            Err(e) => {
                if session.is_alive().await {
                    Err(FetchFailure::Failed(e.to_string()))
                } else {
                    tracing::debug!("session lost while loading {}: {}", doc.path, e);
                    Err(FetchFailure::SessionDied)
                }
            }
        }
    }

    async fn wait_until_ready(&self, session: &dyn RenderedSession) -> Result<(), SessionError> {
        let started = Instant::now();
        loop {
            let state = session
                .execute_script("return document.readyState;", Vec::new())
                .await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if started.elapsed() > self.request_timeout {
                return Err(SessionError::Timeout);
            }
            tokio::time::sleep(READY_STATE_POLL).await;
        }
    }

    /// Asks whether the matches of the interactive chains should be used
    ///
    /// Returns `None` while there is no valid answer yet. When `poll` is set
    /// the wait is bounded by the poll interval so that the page can be
    /// matched again in between.
    async fn confirm_batch(
        &mut self,
        batch: &[ChainId],
        path: &str,
        poll: bool,
        last_prompt: &mut String,
    ) -> Option<Choice> {
        let mut contents = 0;
        let mut documents = 0;
        let mut missing_labels = 0;
        let mut need_content = false;
        let mut need_documents = false;
        for &id in batch {
            let chain = &self.chains[id];
            contents += chain.state.content_matches.len();
            documents += chain.state.document_matches.len();
            missing_labels += chain.state.labels_none_for_n;
            need_content |= chain.need_content_matches();
            need_documents |= chain.need_document_matches(true);
        }

        let mut prompt = format!("{}: use page with potentially", path);
        if need_content {
            prompt.push_str(&format!(" < {} > {}", contents, plural(contents, "content")));
        }
        if missing_labels != 0 {
            prompt.push_str(&format!(" (missing {} labels)", missing_labels));
        }
        if need_documents {
            if need_content {
                prompt.push_str(" and");
            }
            prompt.push_str(&format!(" < {} > {}", documents, plural(documents, "document")));
        }
        prompt.push_str(" [Yes/skip]? ");

        let answer = if poll {
            let show = (prompt != *last_prompt).then_some(prompt.as_str());
            match self.prompter.poll_line(show, self.poll_interval).await {
                PollResult::Line(line) => line,
                PollResult::Pending => {
                    *last_prompt = prompt;
                    return None;
                }
                PollResult::Closed => return Some(Choice::Accept),
            }
        } else {
            match self.prompter.read_line(&prompt).await {
                Some(line) => line,
                None => return Some(Choice::Accept),
            }
        };

        let choice = parse_batch_answer(&answer);
        if choice.is_none() {
            self.prompter.message("please answer with \"yes\" or \"skip\"");
            last_prompt.clear();
        } else {
            *last_prompt = prompt;
        }
        choice
    }

    /// Accepts the pending matches of one chain for the current document
    async fn accept_chain(
        &mut self,
        id: ChainId,
        doc_path: &str,
        address: &str,
        skips: &mut DocumentSkips,
        new_docs: &mut Vec<Document>,
    ) -> Result<(), ScrapeError> {
        let chain = &mut self.chains[id];
        chain.begin_accept();
        let contents = std::mem::take(&mut chain.state.content_matches);
        let documents = std::mem::take(&mut chain.state.document_matches);
        let labels_missing = chain.state.labels_none_for_n;
        let duplication = chain.duplication;
        let interactive_documents = chain.document.interactive;

        if !skips.content {
            for mut cm in contents {
                let chain = &mut self.chains[id];
                let ci = match chain.next_content_slot() {
                    IndexSlot::Within(ci) => ci,
                    IndexSlot::Below => continue,
                    IndexSlot::Exhausted => break,
                };
                cm.ci = Some(ci);
                cm.di = Some(chain.di);
                match self.handle_content_match(id, cm, address).await? {
                    Choice::SkipChain => break,
                    Choice::SkipDoc => {
                        skips.content = true;
                        break;
                    }
                    _ => {}
                }
            }
            if labels_missing > 0 {
                tracing::warn!(
                    "no labels: skipping {} remaining content match(es) in {}",
                    labels_missing,
                    doc_path
                );
            }
        }

        if !skips.documents {
            for doc in documents {
                let (choice, doc) = if interactive_documents {
                    self.confirm_document(doc).await
                } else {
                    (Choice::Accept, doc)
                };
                match choice {
                    Choice::Accept => {
                        if self.queue.admit(&doc, duplication) {
                            new_docs.push(doc);
                        } else {
                            tracing::debug!("skipping already known document {}", doc.path);
                        }
                    }
                    Choice::SkipChain => break,
                    Choice::SkipDoc => {
                        skips.documents = true;
                        break;
                    }
                    _ => {}
                }
            }
        }

        self.chains[id].finish_document();
        Ok(())
    }

    async fn confirm_document(&mut self, mut doc: Document) -> (Choice, Document) {
        loop {
            let prompt = format!(
                "accept matched document \"{}\" [Yes/no/edit/chainskip/docskip]? ",
                doc.path
            );
            let choice = ask(self.prompter.as_mut(), &prompt, CONTENT_CHOICES)
                .await
                .unwrap_or(Choice::Accept);
            if choice != Choice::Edit {
                return (choice, doc);
            }
            if let Some(path) = self.prompter.read_line("enter new document: ").await {
                doc.path = path.trim().to_string();
            }
        }
    }

    /// Resolves, confirms and hands over one accepted content match
    async fn handle_content_match(
        &mut self,
        id: ChainId,
        mut cm: ContentMatch,
        address: &str,
    ) -> Result<Choice, ScrapeError> {
        let chain = &self.chains[id];
        let escape = chain.escape_sequence.clone();
        let is_link = chain.content_is_link;
        let policy = chain.link_policy.clone();

        let base = cm.format_args(&escape);
        chain.content.apply_template(&mut cm.content, &base);
        let base = cm.format_args(&escape);
        match cm.label.as_mut() {
            Some(label) => chain.label.apply_template(label, &base),
            None if chain.flags.need_label => {
                if let Some(default) = &chain.label_default_format {
                    cm.label = Some(LocatorMatch::new(default.render(&base)));
                }
            }
            None => {}
        }

        let context = match_context(&cm);
        let path = cm.document.path.clone();
        let content_kind = if is_link { "content link" } else { "content match" };

        loop {
            if is_link {
                match normalize_link(&cm.content.result, cm.document.kind, Some(address), Some(&policy)) {
                    Ok((link, _)) => cm.content.result = link,
                    Err(e) => {
                        tracing::warn!(
                            "{}{}: skipping content link '{}': {}",
                            path,
                            context,
                            cm.content.result,
                            e
                        );
                        return Ok(Choice::Reject);
                    }
                }
            }
            if !self.chains[id].content.interactive {
                break;
            }

            let label_context = cm
                .label
                .as_ref()
                .map(|l| format!(" (label \"{}\")", l.result))
                .unwrap_or_default();
            let (prompt, choices) = if is_link {
                (
                    format!(
                        "\"{}\"{}{}: accept {} \"{}\" [Yes/no/edit/chainskip/docskip]? ",
                        path, context, label_context, content_kind, cm.content.result
                    ),
                    CONTENT_CHOICES,
                )
            } else {
                (
                    format!(
                        "accept {} from \"{}\"{}{} [Yes/no/edit/inspect/chainskip/docskip]? ",
                        content_kind, path, context, label_context
                    ),
                    RAW_CONTENT_CHOICES,
                )
            };
            match ask(self.prompter.as_mut(), &prompt, choices)
                .await
                .unwrap_or(Choice::Accept)
            {
                Choice::Accept => break,
                Choice::Inspect => {
                    self.prompter.message(&format!(
                        "content for \"{}\"{}:\n{}",
                        path, label_context, cm.content.result
                    ));
                }
                Choice::Edit if is_link => {
                    if let Some(line) = self
                        .prompter
                        .read_line(&format!("enter new {}:\n", content_kind))
                        .await
                    {
                        cm.content.result = line.trim().to_string();
                    }
                }
                Choice::Edit => {
                    self.prompter.message(&format!(
                        "enter new {} (terminate with a newline followed by the string \"{}\"):",
                        content_kind, escape
                    ));
                    if let Some(text) = read_multiline(self.prompter.as_mut(), &escape).await {
                        cm.content.result = text;
                    }
                }
                other => return Ok(other),
            }
        }

        if self.chains[id].label.interactive {
            if let Some(choice) = self.confirm_label(id, &mut cm, &context).await {
                return Ok(choice);
            }
        }

        let mut job = DownloadJob::new(cm, self.specs[id].clone());
        if self.chains[id].save_path_interactive {
            if let Some(choice) = self.confirm_save_path(&mut job).await {
                return Ok(choice);
            }
        }

        if let Some(session) = self.session_for(&job.cm.document) {
            if job.requires_download() {
                if let Err(e) = job
                    .acquire_with_session(session.as_ref(), self.manager.env())
                    .await
                {
                    match e {
                        JobError::Session(SessionError::Died) => self.report_session_died(),
                        e => tracing::warn!("{}: {}", job.context(), e),
                    }
                    return Ok(Choice::Reject);
                }
            }
        }

        if job.requires_download() {
            self.manager.submit(job).await;
        } else {
            self.manager.run_inline(job).await;
        }
        Ok(Choice::Accept)
    }

    /// Returns the choice when the match is not to be used
    async fn confirm_label(
        &mut self,
        id: ChainId,
        cm: &mut ContentMatch,
        context: &str,
    ) -> Option<Choice> {
        let path = cm.document.path.clone();
        let is_link = self.chains[id].content_is_link;
        loop {
            let label = cm.label.as_ref()?.result.clone();
            if !self.chains[id].is_valid_label(&label) {
                tracing::warn!("\"{}\": labels cannot contain a slash (\"{}\")", path, label);
            } else {
                let (prompt, choices) = if is_link {
                    (
                        format!(
                            "\"{}\": content link {}{}: accept content label \"{}\" [Yes/no/edit/chainskip/docskip]? ",
                            path, cm.content.result, context, label
                        ),
                        CONTENT_CHOICES,
                    )
                } else {
                    (
                        format!(
                            "\"{}\"{}: accept content label \"{}\" [Yes/no/edit/inspect/chainskip/docskip]? ",
                            path, context, label
                        ),
                        RAW_CONTENT_CHOICES,
                    )
                };
                match ask(self.prompter.as_mut(), &prompt, choices)
                    .await
                    .unwrap_or(Choice::Accept)
                {
                    Choice::Accept => return None,
                    Choice::Inspect => {
                        self.prompter.message(&format!(
                            "\"{}\": content for \"{}\":\n{}",
                            path, label, cm.content.result
                        ));
                        continue;
                    }
                    Choice::Edit => {}
                    other => return Some(other),
                }
            }
            let line = self.prompter.read_line("enter new label: ").await?;
            if let Some(label) = cm.label.as_mut() {
                label.result = line.trim().to_string();
            }
        }
    }

    /// Returns the choice when the match is not to be used
    async fn confirm_save_path(&mut self, job: &mut DownloadJob) -> Option<Choice> {
        let mut path = match job.resolve_save_path(self.manager.env()).await {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("{}: {}", job.context(), e);
                return Some(Choice::Reject);
            }
        };
        loop {
            let prompt = format!(
                "{}: accept save path \"{}\" [Yes/no/edit/chainskip/docskip]? ",
                job.context(),
                path.display()
            );
            match ask(self.prompter.as_mut(), &prompt, CONTENT_CHOICES)
                .await
                .unwrap_or(Choice::Accept)
            {
                Choice::Accept => {
                    job.set_save_path(path);
                    return None;
                }
                Choice::Edit => {
                    if let Some(line) = self.prompter.read_line("enter new save path: ").await {
                        path = line.trim().into();
                    }
                }
                other => return Some(other),
            }
        }
    }
}

/// Current address and flattened source of the session's page
async fn read_page(session: &dyn RenderedSession) -> Result<(String, String), SessionError> {
    let address = session.current_address().await?;
    let source = session.page_source().await?;
    Ok((address, source))
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
