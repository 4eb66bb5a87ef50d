//! Progress indicator utilities for long-running operations.
//!
//! Provides:
//! - Determinate progress bars for known-count operations (flakiness probe)
//! - Spinners for indeterminate operations (suite execution)
//! - Conditional display based on terminal detection

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{IsTerminal, stderr};
use std::time::Duration;

/// Check if we should show progress indicators.
///
/// Progress is shown only if stderr is an interactive terminal.
#[must_use]
pub fn should_show_progress() -> bool {
    stderr().is_terminal()
}

/// Create a determinate progress bar for operations with known total count.
///
/// # Panics
/// Panics if the progress bar template string is invalid.
#[must_use]
pub fn create_progress_bar(total: u64, message: &str, show: bool) -> ProgressBar {
    let pb = ProgressBar::new(total);

    if show {
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .expect("valid template")
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
    } else {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    pb
}

/// Create a spinner for indeterminate operations.
///
/// # Panics
/// Panics if the spinner template string is invalid.
#[must_use]
pub fn create_spinner(message: &str, show: bool) -> ProgressBar {
    let pb = ProgressBar::new_spinner();

    if show {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("valid template"),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
    } else {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    pb
}

/// Progress bar wrapper that remembers whether it is drawing.
///
/// `ProgressBar` is internally reference counted, so a tracker can be shared
/// with rayon workers by reference.
pub struct ProgressTracker {
    bar: ProgressBar,
    showing: bool,
}

impl ProgressTracker {
    /// Create a determinate tracker.
    #[must_use]
    pub fn new(total: u64, message: &str, show: bool) -> Self {
        Self {
            bar: create_progress_bar(total, message, show),
            showing: show,
        }
    }

    /// Create a spinner tracker for indeterminate operations.
    #[must_use]
    pub fn new_spinner(message: &str, show: bool) -> Self {
        Self {
            bar: create_spinner(message, show),
            showing: show,
        }
    }

    /// A tracker that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self::new(0, "", false)
    }

    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn finish_with_message(&self, message: impl Into<String>) {
        self.bar.finish_with_message(message.into());
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }

    #[must_use]
    pub const fn is_showing(&self) -> bool {
        self.showing
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_hidden_when_not_terminal() {
        let pb = create_progress_bar(100, "Test", false);
        pb.inc(50);
        pb.finish();
    }

    #[test]
    fn test_spinner_hidden_when_not_terminal() {
        let spinner = create_spinner("Testing...", false);
        spinner.finish();
    }

    #[test]
    fn test_progress_tracker_counts_hidden() {
        let tracker = ProgressTracker::new(10, "Probing", false);
        for _ in 0..10 {
            tracker.inc(1);
        }
        assert_eq!(tracker.position(), 10);
        assert!(!tracker.is_showing());
        tracker.finish_with_message("Done");
    }

    #[test]
    fn test_progress_tracker_spinner() {
        let tracker = ProgressTracker::new_spinner("Running suite...", false);
        tracker.set_message("Still running...");
        tracker.finish_and_clear();
    }
}
