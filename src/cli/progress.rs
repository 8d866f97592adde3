//! Stage progress on stderr
//!
//! A spinner shows the running counters of the current stage. Every
//! `REPORT_EVERY` records a log line records how many inputs produced output,
//! over the last window and in total, so progress is still visible when stderr
//! is redirected to a file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use catchment::pipeline::{ProgressCallback, StageCounts};

const REPORT_EVERY: u64 = 250;

/// Creates a spinner for CLI display
pub fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

/// Percentage of processed inputs that produced at least one record
pub fn yield_percent(counts: &StageCounts) -> f64 {
    percent(counts.processed - counts.skipped, counts.processed)
}

fn summary(counts: &StageCounts) -> String {
    format!(
        "{} processed, {} emitted, {} skipped, {} malformed",
        counts.processed, counts.emitted, counts.skipped, counts.malformed
    )
}

/// Progress display for one pipeline stage
pub struct ProgressTracker {
    stage: String,
    pb: ProgressBar,
    /// Counters at the previous report
    reported_processed: AtomicU64,
    reported_skipped: AtomicU64,
}

impl ProgressTracker {
    pub fn new(stage: &str) -> Self {
        Self::with_bar(stage, create_spinner())
    }

    fn with_bar(stage: &str, pb: ProgressBar) -> Self {
        pb.set_message(format!("{stage}: starting"));
        Self {
            stage: stage.to_string(),
            pb,
            reported_processed: AtomicU64::new(0),
            reported_skipped: AtomicU64::new(0),
        }
    }

    /// Yield since the previous report, resetting the window
    fn window_yield(&self, counts: &StageCounts) -> f64 {
        let processed = counts.processed - self.reported_processed.swap(counts.processed, Ordering::Relaxed);
        let skipped = counts.skipped - self.reported_skipped.swap(counts.skipped, Ordering::Relaxed);
        percent(processed - skipped, processed)
    }

    pub fn update(&self, counts: &StageCounts) {
        self.pb.set_message(format!("{}: {}", self.stage, summary(counts)));
        self.pb.tick();

        if counts.processed > 0 && counts.processed % REPORT_EVERY == 0 {
            info!(
                "{}: {} records, {}% yielded output (last {REPORT_EVERY}: {}%)",
                self.stage,
                counts.processed,
                yield_percent(counts),
                self.window_yield(counts)
            );
        }
    }

    /// Callback for `StageOptions::progress`
    pub fn callback(self: &Arc<Self>) -> ProgressCallback {
        let tracker = Arc::clone(self);
        Arc::new(move |counts: &StageCounts| tracker.update(counts))
    }

    pub fn finish(&self, counts: &StageCounts) {
        self.pb.finish_and_clear();
        info!(
            "{} finished: {} ({}% yielded output)",
            self.stage,
            summary(counts),
            yield_percent(counts)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(processed: u64, skipped: u64) -> StageCounts {
        StageCounts {
            processed,
            emitted: (processed - skipped) * 3,
            skipped,
            malformed: 0,
        }
    }

    #[test]
    fn test_yield_counts_inputs_not_outputs() {
        assert_eq!(yield_percent(&counts(4, 1)), 75.0);
        assert_eq!(yield_percent(&counts(3, 1)), 66.7);
        assert_eq!(yield_percent(&StageCounts::default()), 0.0);
    }

    #[test]
    fn test_callback_updates_message() {
        let tracker = Arc::new(ProgressTracker::with_bar("routes", ProgressBar::hidden()));
        let callback = tracker.callback();
        callback(&counts(2, 0));
        assert_eq!(
            tracker.pb.message(),
            "routes: 2 processed, 6 emitted, 0 skipped, 0 malformed"
        );
        tracker.finish(&counts(2, 0));
        assert!(tracker.pb.is_finished());
    }

    #[test]
    fn test_window_yield_resets_after_each_report() {
        let tracker = ProgressTracker::with_bar("hexagon-origins", ProgressBar::hidden());
        assert_eq!(tracker.window_yield(&counts(250, 200)), 20.0);
        assert_eq!(tracker.window_yield(&counts(500, 250)), 80.0);
        assert_eq!(tracker.window_yield(&counts(500, 250)), 0.0);
    }
}
