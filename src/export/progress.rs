//! Progress reporting for the download stage of an export.
//!
//! An export downloads one file per result descriptor. Reporters are told
//! when the batch starts, after every completed file, and when the batch
//! finishes; [`LogProgress`] turns that into periodic `[PROGRESS]` lines.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

use crate::ResultDescriptor;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Receives download progress of one export.
pub trait ProgressReporter: Send + Sync {
    /// `total` files are about to be downloaded.
    fn on_start(&self, total: usize);

    /// File `completed` of `total` finished with `rows` rows.
    fn on_item_complete(&self, completed: usize, total: usize, descriptor: &ResultDescriptor, rows: usize);

    /// All files are downloaded and consolidated into `total_rows` rows.
    fn on_finish(&self, total_rows: usize);
}

/// Reporter that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn on_start(&self, _total: usize) {}
    fn on_item_complete(&self, _: usize, _: usize, _: &ResultDescriptor, _: usize) {}
    fn on_finish(&self, _total_rows: usize) {}
}

/// Download progress of one export.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Files downloaded so far.
    pub files_fetched: usize,
    /// Files in the export.
    pub total_files: usize,
    /// Rows downloaded so far.
    pub rows_fetched: usize,
    /// When the download stage started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between time-based updates.
    pub update_interval: Duration,
    /// Last reported completion percentage.
    pub last_reported_percentage: f64,
    /// Percentage delta that forces an update.
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Fresh state for `total_files` downloads.
    pub fn new(total_files: usize) -> Self {
        let now = Instant::now();
        Self {
            files_fetched: 0,
            total_files,
            rows_fetched: 0,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Record one finished file.
    pub fn update(&mut self, rows: usize) {
        self.files_fetched = self.files_fetched.saturating_add(1);
        self.rows_fetched = self.rows_fetched.saturating_add(rows);
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        (self.files_fetched as f64 / self.total_files as f64) * 100.0
    }

    /// Files per second since the start.
    pub fn rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.files_fetched as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Remaining time extrapolated from the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let rate = self.rate();
        let remaining = self.total_files.saturating_sub(self.files_fetched);
        if rate > 0.0 && remaining > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        }
    }

    /// Whether enough progress or time has passed to log again.
    pub fn should_emit_update(&self) -> bool {
        if self.files_fetched == 0 {
            return false;
        }
        if self.files_fetched == self.total_files {
            return true;
        }
        self.percentage() - self.last_reported_percentage >= self.min_percentage_step
            || self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after an update was logged.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Human-readable progress line.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![
            format!("[PROGRESS] Fetched {}/{} files", self.files_fetched, self.total_files),
            format!("- {:.1}% complete", self.percentage()),
            format!("({} rows)", self.rows_fetched),
        ];

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

/// Reporter that logs progress lines through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    state: Mutex<Option<ProgressState>>,
}

impl LogProgress {
    /// New reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current state, if a batch has started.
    pub fn snapshot(&self) -> Option<ProgressState> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl ProgressReporter for LogProgress {
    fn on_start(&self, total: usize) {
        if let Ok(mut state) = self.state.lock() {
            *state = Some(ProgressState::new(total));
        }
        info!(files = total, "Downloading export results");
    }

    fn on_item_complete(&self, _completed: usize, _total: usize, _descriptor: &ResultDescriptor, rows: usize) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        if let Some(state) = guard.as_mut() {
            state.update(rows);
            if state.should_emit_update() {
                info!("{}", state.format_progress());
                state.mark_emitted();
            }
        }
    }

    fn on_finish(&self, total_rows: usize) {
        let elapsed = self
            .snapshot()
            .map(|s| s.start_time.elapsed())
            .unwrap_or_default();
        info!(
            rows = total_rows,
            elapsed_secs = elapsed.as_secs_f64(),
            "Export results consolidated"
        );
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
