//! Progress accounting for a publish run.
//!
//! `processed_items` counts nodes *visited*, not nodes created, so a run that
//! finishes its traversal always ends at 100% even when some nodes failed.

use serde::Serialize;
use tokio::sync::watch;

/// Where the run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStep {
    Preparing,
    Preflight,
    CreatingRoot,
    CreatingChapters,
    CreatingTopics,
    CreatingLessons,
    /// Cancellation observed; waiting for the current call to unwind.
    Aborting,
    Complete,
    Error,
    Aborted,
}

impl PublishStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Aborted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Preparing => "Preparing",
            Self::Preflight => "Checking remote store",
            Self::CreatingRoot => "Creating book",
            Self::CreatingChapters => "Creating chapters",
            Self::CreatingTopics => "Creating topics",
            Self::CreatingLessons => "Creating lessons",
            Self::Aborting => "Aborting",
            Self::Complete => "Complete",
            Self::Error => "Failed",
            Self::Aborted => "Aborted",
        }
    }
}

/// Counters that only feed diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressDebug {
    pub node_failures: usize,
    pub link_failures: usize,
    pub fallback_credentials_used: usize,
    pub placeholders_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Snapshot pushed to observers after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressState {
    pub step: PublishStep,
    /// 0..=100.
    pub progress: u8,
    pub current_item: String,
    pub processed_items: usize,
    pub total_items: usize,
    pub message: String,
    pub debug: ProgressDebug,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            step: PublishStep::Preparing,
            progress: 0,
            current_item: String::new(),
            processed_items: 0,
            total_items: 0,
            message: String::new(),
            debug: ProgressDebug::default(),
        }
    }
}

/// Observer of progress snapshots.
pub trait ProgressReporter: Send + Sync {
    /// Called with the new state after every change.
    fn update(&self, state: &ProgressState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn update(&self, _state: &ProgressState) {}
}

/// Publishes snapshots on a `watch` channel for polling or subscribing consumers.
pub struct WatchProgress {
    tx: watch::Sender<ProgressState>,
}

impl WatchProgress {
    pub fn channel() -> (Self, watch::Receiver<ProgressState>) {
        let (tx, rx) = watch::channel(ProgressState::default());
        (Self { tx }, rx)
    }
}

impl ProgressReporter for WatchProgress {
    fn update(&self, state: &ProgressState) {
        // No receivers left is fine; the run carries on.
        let _ = self.tx.send(state.clone());
    }
}

/// Owns the progress state of one run and forwards every change to a reporter.
pub struct ProgressTracker<'a> {
    state: ProgressState,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            state: ProgressState::default(),
            reporter,
        }
    }

    /// Fix the denominator. Called once, before any remote call.
    pub fn start(&mut self, total_items: usize) {
        self.state.total_items = total_items;
        self.state.processed_items = 0;
        self.state.progress = 0;
        self.emit();
    }

    /// Change step without counting an item.
    pub fn set_step(&mut self, step: PublishStep, message: impl Into<String>) {
        self.state.step = step;
        self.state.message = message.into();
        self.emit();
    }

    /// Count one visited node.
    pub fn advance(&mut self, step: PublishStep, current_item: impl Into<String>) {
        self.state.step = step;
        self.state.current_item = current_item.into();
        self.state.processed_items += 1;
        self.state.progress = percent(self.state.processed_items, self.state.total_items);
        self.emit();
    }

    pub fn record_node_failure(&mut self, message: impl Into<String>) {
        self.state.debug.node_failures += 1;
        self.state.debug.last_error = Some(message.into());
        self.emit();
    }

    pub fn record_link_failure(&mut self, message: impl Into<String>) {
        self.state.debug.link_failures += 1;
        self.state.debug.last_error = Some(message.into());
        self.emit();
    }

    pub fn record_fallback(&mut self) {
        self.state.debug.fallback_credentials_used += 1;
    }

    pub fn record_placeholder(&mut self) {
        self.state.debug.placeholders_used += 1;
    }

    /// Enter `Aborting` the first time cancellation is seen; later calls are no-ops.
    pub fn begin_abort(&mut self, message: impl Into<String>) {
        if self.state.step != PublishStep::Aborting {
            self.set_step(PublishStep::Aborting, message);
        }
    }

    /// Enter a terminal step.
    pub fn finish(&mut self, step: PublishStep, message: impl Into<String>) {
        self.state.step = step;
        self.state.message = message.into();
        self.emit();
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    fn emit(&self) {
        self.reporter.update(&self.state);
    }
}

/// `round(processed / total * 100)`, clamped to 100.
fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (processed as f64 / total as f64 * 100.0).round();
    pct.min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds() {
        assert_eq!(percent(0, 6), 0);
        assert_eq!(percent(1, 6), 17);
        assert_eq!(percent(3, 6), 50);
        assert_eq!(percent(6, 6), 100);
        assert_eq!(percent(7, 6), 100);
        assert_eq!(percent(1, 0), 0);
    }

    #[test]
    fn advance_counts_exactly_one() {
        let reporter = SilentProgress;
        let mut tracker = ProgressTracker::new(&reporter);
        tracker.start(4);
        tracker.advance(PublishStep::CreatingRoot, "Book");
        tracker.advance(PublishStep::CreatingChapters, "Chapter 1");
        assert_eq!(tracker.state().processed_items, 2);
        assert_eq!(tracker.state().progress, 50);
        assert_eq!(tracker.state().current_item, "Chapter 1");
    }

    #[test]
    fn failures_do_not_move_the_bar() {
        let reporter = SilentProgress;
        let mut tracker = ProgressTracker::new(&reporter);
        tracker.start(2);
        tracker.record_node_failure("chapter 0: HTTP 500");
        tracker.record_link_failure("link failed");
        assert_eq!(tracker.state().processed_items, 0);
        assert_eq!(tracker.state().debug.node_failures, 1);
        assert_eq!(tracker.state().debug.link_failures, 1);
        assert_eq!(tracker.state().debug.last_error.as_deref(), Some("link failed"));
    }

    #[tokio::test]
    async fn watch_progress_delivers_latest_state() {
        let (reporter, rx) = WatchProgress::channel();
        let mut tracker = ProgressTracker::new(&reporter);
        tracker.start(2);
        tracker.advance(PublishStep::CreatingRoot, "Book");
        tracker.finish(PublishStep::Aborted, "cancelled");

        let state = rx.borrow().clone();
        assert_eq!(state.step, PublishStep::Aborted);
        assert_eq!(state.processed_items, 1);
        assert_eq!(state.progress, 50);
    }

    #[test]
    fn begin_abort_emits_once() {
        let reporter = crate::testing::RecordingProgress::default();
        let mut tracker = ProgressTracker::new(&reporter);
        tracker.start(3);
        tracker.begin_abort("Cancellation requested");
        tracker.begin_abort("Cancellation requested again");
        tracker.finish(PublishStep::Aborted, "Publishing aborted");

        let steps: Vec<_> = reporter.states().iter().map(|s| s.step).collect();
        assert_eq!(
            steps,
            vec![PublishStep::Preparing, PublishStep::Aborting, PublishStep::Aborted]
        );
        assert_eq!(reporter.states()[1].message, "Cancellation requested");
    }

    #[test]
    fn terminal_steps() {
        assert!(PublishStep::Complete.is_terminal());
        assert!(PublishStep::Aborted.is_terminal());
        assert!(!PublishStep::Aborting.is_terminal());
    }
}
