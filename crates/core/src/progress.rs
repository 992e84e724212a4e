//! Progress reporting and visualization hooks.

use crate::result::PlacedInstance;
use std::time::Instant;

/// Error returned by a hook. Hook failures are logged and never abort a run.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Progress callback for long-running operations.
pub type ProgressCallback = Box<dyn Fn(ProgressInfo) + Send + Sync>;

/// Progress information during packing.
#[derive(Debug, Clone, Default)]
pub struct ProgressInfo {
    /// Progress reports delivered so far.
    pub step: u64,
    /// Instances placed so far.
    pub items_placed: usize,
    /// Sum of all ingredient targets.
    pub total_items: usize,
    /// Overall completion (0.0 to 1.0).
    pub fraction: f64,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: u64,
    /// Current phase description.
    pub phase: String,
    /// Whether packing is still running.
    pub running: bool,
}

impl ProgressInfo {
    /// Creates a new progress info with default values.
    pub fn new() -> Self {
        Self {
            running: true,
            ..Default::default()
        }
    }

    /// Sets the step counter.
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Sets the items placed info.
    pub fn with_items(mut self, placed: usize, total: usize) -> Self {
        self.items_placed = placed;
        self.total_items = total;
        self
    }

    /// Sets the overall completion fraction.
    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Sets the elapsed time.
    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Sets the phase description.
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Marks packing as finished.
    pub fn finished(mut self) -> Self {
        self.running = false;
        self
    }
}

/// Observer notified while a packing runs.
///
/// Every method defaults to doing nothing. A returned error (or a panic) is
/// logged by the scheduler and packing continues.
pub trait VisualizationHook: Send {
    /// Called once when a run starts, with the sum of all ingredient targets.
    fn on_start(&mut self, _total: usize) -> Result<(), HookError> {
        Ok(())
    }

    /// Called with the overall completion and a short label.
    fn on_progress(&mut self, _fraction: f64, _label: &str) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after each accepted placement.
    fn on_instance_placed(&mut self, _instance: &PlacedInstance) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hook that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl VisualizationHook for NoopHook {}

/// Adapts a [`ProgressCallback`] closure into a [`VisualizationHook`].
///
/// The hook counts placements and reports, and times the run from the last
/// [`VisualizationHook::on_start`] (or from construction).
pub struct CallbackHook {
    callback: ProgressCallback,
    total: usize,
    placed: usize,
    step: u64,
    start: Instant,
}

impl CallbackHook {
    /// Wraps a progress callback.
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            total: 0,
            placed: 0,
            step: 0,
            start: Instant::now(),
        }
    }
}

impl VisualizationHook for CallbackHook {
    fn on_start(&mut self, total: usize) -> Result<(), HookError> {
        self.total = total;
        self.placed = 0;
        self.step = 0;
        self.start = Instant::now();
        Ok(())
    }

    fn on_progress(&mut self, fraction: f64, label: &str) -> Result<(), HookError> {
        self.step += 1;
        let info = ProgressInfo::new()
            .with_step(self.step)
            .with_fraction(fraction)
            .with_items(self.placed, self.total)
            .with_elapsed(self.start.elapsed().as_millis() as u64)
            .with_phase(label);
        let info = if fraction >= 1.0 { info.finished() } else { info };
        (self.callback)(info);
        Ok(())
    }

    fn on_instance_placed(&mut self, _instance: &PlacedInstance) -> Result<(), HookError> {
        self.placed += 1;
        Ok(())
    }
}
