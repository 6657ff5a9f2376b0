//! Progress reporting for running downloads
//!
//! Jobs push byte counts into their [`StatusReport`]; a single reporting pass
//! samples snapshots of all reports on a fixed interval and redraws only the
//! bars whose snapshot changed.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Samples kept for the speed estimate
const SPEED_SAMPLES: usize = 7;
const SAMPLE_SPACING: Duration = Duration::from_millis(100);
const MAX_NAME_LEN: usize = 60;

/// Point in time view of a report
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub name: String,
    pub expected: Option<u64>,
    pub observed: u64,
    /// Bytes per second over the recent samples
    pub speed: f64,
    pub finished: bool,
}

#[derive(Debug)]
struct ReportState {
    name: String,
    expected: Option<u64>,
    observed: u64,
    samples: VecDeque<(Instant, u64)>,
    finished: bool,
}

/// Progress of one job
#[derive(Debug)]
pub struct StatusReport {
    state: Mutex<ReportState>,
}

impl StatusReport {
    fn new(name: &str) -> Self {
        Self {
            state: Mutex::new(ReportState {
                name: truncate_name(name),
                expected: None,
                observed: 0,
                samples: VecDeque::with_capacity(SPEED_SAMPLES),
                finished: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_name(&self, name: &str) {
        self.lock().name = truncate_name(name);
    }

    pub fn set_expected(&self, expected: Option<u64>) {
        self.lock().expected = expected;
    }

    /// Records `bytes` more bytes received
    pub fn submit_update(&self, bytes: u64) {
        let mut state = self.lock();
        state.observed += bytes;
        let now = Instant::now();
        let due = state
            .samples
            .back()
            .map_or(true, |(at, _)| now.duration_since(*at) >= SAMPLE_SPACING);
        if due {
            if state.samples.len() == SPEED_SAMPLES {
                state.samples.pop_front();
            }
            let observed = state.observed;
            state.samples.push_back((now, observed));
        }
    }

    pub fn finish(&self) {
        self.lock().finished = true;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.lock();
        let speed = match (state.samples.front(), state.samples.back()) {
            (Some((t0, b0)), Some((t1, b1))) if t1 > t0 => {
                (b1 - b0) as f64 / t1.duration_since(*t0).as_secs_f64()
            }
            _ => 0.0,
        };
        StatusSnapshot {
            name: state.name.clone(),
            expected: state.expected,
            observed: state.observed,
            speed,
            finished: state.finished,
        }
    }
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let tail: String = name
        .chars()
        .rev()
        .take(MAX_NAME_LEN - 3)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}

/// Every report of the current round of jobs
#[derive(Debug, Default)]
pub struct ProgressBoard {
    reports: Mutex<Vec<Arc<StatusReport>>>,
}

impl ProgressBoard {
    pub fn register(&self, name: &str) -> Arc<StatusReport> {
        let report = Arc::new(StatusReport::new(name));
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        report
    }

    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.snapshot())
            .collect()
    }

    pub fn clear(&self) {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Draws the board with one `indicatif` bar per report
pub struct ProgressRenderer {
    multi: MultiProgress,
    bars: Vec<(ProgressBar, Option<StatusSnapshot>)>,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            bars: Vec::new(),
        }
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            bars: Vec::new(),
        }
    }

    fn style(known_size: bool) -> ProgressStyle {
        let template = if known_size {
            "{msg:60} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec}"
        } else {
            "{msg:60} {spinner} {bytes} {bytes_per_sec}"
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    /// Redraws bars whose snapshot changed, returns how many did
    pub fn refresh(&mut self, board: &ProgressBoard) -> usize {
        let mut redrawn = 0;
        for (i, snapshot) in board.snapshots().into_iter().enumerate() {
            if i == self.bars.len() {
                let bar = self.multi.add(ProgressBar::new(snapshot.expected.unwrap_or(0)));
                bar.set_style(Self::style(snapshot.expected.is_some()));
                self.bars.push((bar, None));
            }
            let (bar, last) = &mut self.bars[i];
            if last.as_ref() == Some(&snapshot) {
                continue;
            }
            if last.as_ref().map(|s| s.expected) != Some(snapshot.expected) {
                bar.set_style(Self::style(snapshot.expected.is_some()));
                if let Some(expected) = snapshot.expected {
                    bar.set_length(expected);
                }
            }
            bar.set_message(snapshot.name.clone());
            bar.set_position(snapshot.observed);
            if snapshot.finished {
                bar.finish();
            }
            *last = Some(snapshot);
            redrawn += 1;
        }
        redrawn
    }

    pub fn clear(&mut self) {
        let _ = self.multi.clear();
        self.bars.clear();
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}
