//! Progress tracking for dump runs
//!
//! Shows a progress bar of completed units with a running record count and
//! throughput. The tracker is an observer, so it is plugged into a run the
//! same way the default tracing observer is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::DumpError;

use super::observer::{DumpObserver, TracingObserver, UnitStage};
use super::orchestrator::DumpSummary;

/// Progress tracker for dump runs
///
/// Tracks units and records and displays a progress bar with throughput.
/// Events are also forwarded to a [`TracingObserver`] so failures still
/// reach the log.
pub struct ProgressTracker {
    /// Records written so far
    records: AtomicU64,
    /// Units that finished, successfully or not
    units_done: AtomicU64,
    /// Start time of the run
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
    log: TracingObserver,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to display a progress bar
    pub fn new(enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new(0);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} units {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            bar.set_style(style);
            bar
        });

        Self {
            records: AtomicU64::new(0),
            units_done: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
            log: TracingObserver,
        }
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Units finished so far
    pub fn units_done(&self) -> u64 {
        self.units_done.load(Ordering::Relaxed)
    }

    fn refresh(&self) {
        let Some(ref bar) = self.bar else {
            return;
        };

        bar.set_position(self.units_done());

        let records = self.records();
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let speed = records as f64 / elapsed;
            bar.set_message(format!("({} records, {:.0} records/sec)", records, speed));
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl DumpObserver for ProgressTracker {
    fn run_started(&self, units: usize) {
        if let Some(ref bar) = self.bar {
            bar.set_length(units as u64);
        }
    }

    fn unit_started(&self, unit: &str) {
        self.log.unit_started(unit);
    }

    fn batch_written(&self, unit: &str, records: usize) {
        self.records.fetch_add(records as u64, Ordering::Relaxed);
        self.log.batch_written(unit, records);
        self.refresh();
    }

    fn unit_finished(&self, unit: &str, records: u64) {
        self.units_done.fetch_add(1, Ordering::Relaxed);
        self.log.unit_finished(unit, records);
        self.refresh();
    }

    fn unit_failed(&self, unit: &str, stage: UnitStage, error: &DumpError) {
        self.units_done.fetch_add(1, Ordering::Relaxed);
        if let Some(ref bar) = self.bar {
            bar.println(format!("failed: {unit} ({stage}): {error}"));
        }
        self.log.unit_failed(unit, stage, error);
        self.refresh();
    }

    fn run_finished(&self, _summary: &DumpSummary) {
        self.finish();
    }
}
