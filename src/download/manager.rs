//! Download manager
//!
//! Runs accepted jobs either inline on the scheduler task or on spawned
//! tasks, bounded by a semaphore. Submission never waits: the permit is
//! acquired inside the spawned task, so the scheduler keeps discovering
//! documents while earlier downloads run.

use super::job::{DownloadJob, JobEnv};
use super::output::OrderedOutput;
use super::progress::{ProgressBoard, ProgressRenderer, REFRESH_INTERVAL};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Outcome counts of every job run so far
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadStats {
    fn record(&self, success: bool) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct DownloadManager {
    output: Arc<OrderedOutput>,
    env: Arc<JobEnv>,
    /// `None` runs every job inline
    semaphore: Option<Arc<Semaphore>>,
    handles: Vec<JoinHandle<bool>>,
    board: Arc<ProgressBoard>,
    show_progress: bool,
    stats: Arc<DownloadStats>,
}

impl DownloadManager {
    pub fn new(
        output: Arc<OrderedOutput>,
        env: JobEnv,
        parallel_jobs: usize,
        show_progress: bool,
    ) -> Self {
        Self {
            output,
            env: Arc::new(env),
            semaphore: (parallel_jobs > 0).then(|| Arc::new(Semaphore::new(parallel_jobs))),
            handles: Vec::new(),
            board: Arc::new(ProgressBoard::default()),
            show_progress,
            stats: Arc::new(DownloadStats::default()),
        }
    }

    pub fn env(&self) -> &JobEnv {
        &self.env
    }

    pub fn output(&self) -> &Arc<OrderedOutput> {
        &self.output
    }

    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Jobs submitted since the last wait
    pub fn pending(&self) -> usize {
        self.handles.len()
    }

    /// Hands a job to the pool, or runs it inline without one
    pub async fn submit(&mut self, mut job: DownloadJob) {
        let Some(semaphore) = self.semaphore.clone() else {
            self.run_inline(job).await;
            return;
        };

        job.claim_ticket(&self.output, true);
        if self.show_progress && job.requires_download() {
            job.set_report(self.board.register(&job.display_name()));
        }
        tracing::debug!("queued job for {}", job.address());

        let env = Arc::clone(&self.env);
        let output = Arc::clone(&self.output);
        let stats = Arc::clone(&self.stats);
        self.handles.push(tokio::spawn(async move {
            // a closed semaphore only happens on shutdown, run anyway
            let _permit = semaphore.acquire_owned().await.ok();
            let success = job.run(&env, &output).await;
            stats.record(success);
            success
        }));
    }

    /// Runs a job on the calling task
    ///
    /// While no pooled job is queued ahead of it, the job prints on the
    /// scheduler's ticket and its output reaches the sink right away.
    /// Otherwise it takes a ticket of its own and buffers without waiting,
    /// since the caller holds the ticket that output waits for.
    pub async fn run_inline(&mut self, mut job: DownloadJob) -> bool {
        match self.output.latest_main() {
            Some(main) => job.share_ticket(main),
            None => job.claim_ticket(&self.output, false),
        }
        let success = job.run(&self.env, &self.output).await;
        self.stats.record(success);
        success
    }

    /// Releases the scheduler's output ticket and waits for every submitted
    /// job, then takes a fresh scheduler ticket
    pub async fn wait_until_done(&mut self) -> io::Result<()> {
        self.output.main_done()?;

        let handles = std::mem::take(&mut self.handles);
        if !handles.is_empty() {
            tracing::debug!("waiting for {} job(s) to finish", handles.len());
        }
        let mut all = Box::pin(futures_util::future::join_all(handles));
        let results = if self.show_progress {
            let mut renderer = ProgressRenderer::new();
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            let results = loop {
                tokio::select! {
                    results = &mut all => break results,
                    _ = ticker.tick() => {
                        renderer.refresh(&self.board);
                    }
                }
            };
            renderer.refresh(&self.board);
            renderer.clear();
            results
        } else {
            all.await
        };
        self.board.clear();

        for result in results {
            if let Err(e) = result {
                tracing::warn!("download task panicked: {}", e);
            }
        }

        if !self.output.try_reacquire_main() {
            tracing::warn!("output tickets still pending after all jobs finished");
        }
        Ok(())
    }

    /// Waits for the remaining jobs and writes out all held output
    pub async fn finish(&mut self) -> io::Result<()> {
        self.wait_until_done().await?;
        self.output.main_done()
    }
}
