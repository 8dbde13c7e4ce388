//! Progress reporting towards the host
//!
//! The host owns the actual progress UI. Workers talk to it through
//! [`ProgressReporter`] and never touch UI threads themselves.

use std::sync::{Arc, Mutex};

/// Host-provided progress sink
pub trait ProgressReporter: Send + Sync {
    /// Set the completed fraction, `0.0..=1.0`
    fn set_fraction(&self, fraction: f64);

    fn fraction(&self) -> f64;

    /// Primary text
    fn set_text(&self, text: &str);

    /// Secondary text
    fn set_text2(&self, text: &str);

    fn is_cancelled(&self) -> bool;

    /// Cancel the progress scope (user abort or terminal error)
    fn cancel(&self);

    /// Called once when the owning scope ends
    fn finish(&self) {}
}

/// Host side factory of progress sinks
pub trait ProgressHost: Send + Sync {
    fn start(&self, title: &str) -> Arc<dyn ProgressReporter>;
}

/// RAII progress scope: the reporter is finished exactly once, when the
/// scope is dropped, whichever way the operation ends.
pub struct ProgressScope {
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressScope {
    pub fn open(host: &dyn ProgressHost, title: &str) -> Self {
        let reporter = host.start(title);
        reporter.set_fraction(0.0);
        reporter.set_text(title);
        Self { reporter }
    }

    pub fn reporter(&self) -> &Arc<dyn ProgressReporter> {
        &self.reporter
    }
}

impl Drop for ProgressScope {
    fn drop(&mut self) {
        self.reporter.finish();
    }
}

/// Maps a child's `0.0..=1.0` onto the `[start, end]` band of a parent
/// sink, so a sub-task can report its own full range inside a larger
/// operation. Text and cancellation pass straight through.
pub struct ProgressSlice {
    parent: Arc<dyn ProgressReporter>,
    start: f64,
    end: f64,
}

impl ProgressSlice {
    pub fn new(parent: Arc<dyn ProgressReporter>, start: f64, end: f64) -> Self {
        let start = start.clamp(0.0, 1.0);
        let end = end.clamp(start, 1.0);
        Self { parent, start, end }
    }
}

impl ProgressReporter for ProgressSlice {
    fn set_fraction(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.parent
            .set_fraction(self.start + (self.end - self.start) * fraction);
    }

    fn fraction(&self) -> f64 {
        let width = self.end - self.start;
        if width <= f64::EPSILON {
            return 0.0;
        }
        ((self.parent.fraction() - self.start) / width).clamp(0.0, 1.0)
    }

    fn set_text(&self, text: &str) {
        self.parent.set_text(text);
    }

    fn set_text2(&self, text: &str) {
        self.parent.set_text2(text);
    }

    fn is_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }

    fn cancel(&self) {
        self.parent.cancel();
    }
}

/// Snapshot of an in-memory progress sink
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub fraction: f64,
    pub text: String,
    pub text2: String,
    pub cancelled: bool,
    pub finished: bool,
}

/// Progress sink that keeps its state in memory.
///
/// Used for headless runs and wherever the UI may already be gone (a
/// dismissed undeploy dialog keeps reporting into one of these).
#[derive(Debug, Default)]
pub struct MemoryProgress {
    state: Mutex<ProgressSnapshot>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }
}

impl ProgressReporter for MemoryProgress {
    fn set_fraction(&self, fraction: f64) {
        self.update(|s| s.fraction = fraction.clamp(0.0, 1.0));
    }

    fn fraction(&self) -> f64 {
        self.snapshot().fraction
    }

    fn set_text(&self, text: &str) {
        self.update(|s| s.text = text.to_string());
    }

    fn set_text2(&self, text: &str) {
        self.update(|s| s.text2 = text.to_string());
    }

    fn is_cancelled(&self) -> bool {
        self.snapshot().cancelled
    }

    fn cancel(&self) {
        self.update(|s| s.cancelled = true);
    }

    fn finish(&self) {
        self.update(|s| s.finished = true);
    }
}

/// Host that hands out [`MemoryProgress`] sinks and remembers them
#[derive(Default)]
pub struct MemoryProgressHost {
    started: Mutex<Vec<(String, Arc<MemoryProgress>)>>,
}

impl MemoryProgressHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sink started so far, with its title
    pub fn started(&self) -> Vec<(String, Arc<MemoryProgress>)> {
        self.started.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ProgressHost for MemoryProgressHost {
    fn start(&self, title: &str) -> Arc<dyn ProgressReporter> {
        let progress = Arc::new(MemoryProgress::new());
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((title.to_string(), progress.clone()));
        progress
    }
}
