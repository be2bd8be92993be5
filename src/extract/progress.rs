//! Progress reporting for extraction runs
//!
//! Reporting is purely observational: nothing a reporter does can fail a
//! run. Workers call [`ProgressReporter::increment`] concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives progress notifications from a running pipeline.
pub trait ProgressReporter: Send + Sync {
    /// Called once before any record is processed.
    fn start(&self, total: u64);

    /// Called by a worker after each decoded record is published.
    fn increment(&self);

    /// Called once when the run succeeded.
    fn finish(&self, message: &str);

    /// Called once when the run failed; leaves the bar where it stopped.
    fn abandon(&self);
}

/// Progress tracker backed by an `indicatif` progress bar
///
/// Tracks decoded records and displays a bar with throughput on stderr.
pub struct ProgressTracker {
    /// Number of records processed so far
    processed: AtomicU64,
    /// Start time of the run
    start_time: Instant,
    /// Progress bar, hidden when disabled
    bar: ProgressBar,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to draw the bar on stderr
    pub fn new(enable_bar: bool) -> Self {
        let bar = ProgressBar::new(0);
        if !enable_bar {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        Self {
            processed: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Records processed so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    fn refresh_rate(&self, count: u64) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let speed = count as f64 / elapsed;
            self.bar.set_message(format!("({:.0} docs/sec)", speed));
        }
    }
}

impl ProgressReporter for ProgressTracker {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn increment(&self) {
        let count = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        self.bar.inc(1);
        // Throughput text only needs an occasional refresh
        if count % 100 == 0 {
            self.refresh_rate(count);
        }
    }

    fn finish(&self, message: &str) {
        self.refresh_rate(self.processed());
        self.bar.finish_with_message(message.to_string());
    }

    fn abandon(&self) {
        self.bar.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_counts_increments() {
        let tracker = ProgressTracker::new(false);
        tracker.start(3);
        tracker.increment();
        tracker.increment();
        tracker.increment();
        assert_eq!(tracker.processed(), 3);
        tracker.finish("Done");
    }

    #[test]
    fn test_progress_tracker_shared_between_threads() {
        let tracker = std::sync::Arc::new(ProgressTracker::new(false));
        tracker.start(400);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.processed(), 400);
        tracker.abandon();
    }
}
