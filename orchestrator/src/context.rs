use std::{
    process,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use worker::Stopwatch;

/// A clonable flag requesting the training loop to stop as soon as possible.
///
/// The flag is polled between items and between rounds, never in the middle
/// of scoring a datum. It is process local, only the orchestrator polls it.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the run to stop.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The state of a single training run, shared by both execution modes.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    stop: StopHandle,
    clock: Stopwatch,
}

impl RunContext {
    /// Creates a new context with a fresh run id of the form `mp-<pid>-<hex>`.
    pub fn new() -> Self {
        Self::with_stop(StopHandle::new())
    }

    /// Creates a new context around an existing stop handle.
    ///
    /// # Arguments
    /// * `stop` - A handle possibly already shared with other components.
    pub fn with_stop(stop: StopHandle) -> Self {
        let run_id = format!("mp-{}-{:08x}", process::id(), rand::random::<u32>());
        Self {
            run_id,
            stop,
            clock: Stopwatch::start(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stop(&self) -> &StopHandle {
        &self.stop
    }

    /// When the context was created.
    pub fn started_at(&self) -> Instant {
        self.clock.started_at()
    }

    /// Time elapsed since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_shared_by_clones() {
        let ctx = RunContext::new();
        let stop = ctx.stop().clone();
        assert!(!ctx.stop().is_requested());

        stop.request();
        assert!(ctx.stop().is_requested());
    }

    #[test]
    fn run_id_names_the_process() {
        let ctx = RunContext::new();
        let prefix = format!("mp-{}-", process::id());

        assert!(ctx.run_id().starts_with(&prefix));
        assert_eq!(ctx.run_id().len(), prefix.len() + 8);
        assert_ne!(RunContext::new().run_id(), "");
    }
}
