use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop signal scoped to one run.
///
/// `stop()` only ever sets the run's own flag. An optional external flag, such
/// as the CLI's Ctrl-C flag, is observed but never written, so a run stopped by
/// `stop_on_error` leaves the next run on the same engine untouched.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    run: Arc<AtomicBool>,
    external: Option<Arc<AtomicBool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh run signal that also reports stopped once `external` is set.
    pub fn linked(external: Arc<AtomicBool>) -> Self {
        Self {
            run: Arc::new(AtomicBool::new(false)),
            external: Some(external),
        }
    }

    pub fn stop(&self) {
        self.run.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.run.load(Ordering::Relaxed)
            || self
                .external
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_shared_between_clones() {
        let signal = StopSignal::new();
        let worker_view = signal.clone();
        assert!(!worker_view.is_stopped());

        signal.stop();
        assert!(worker_view.is_stopped());
    }

    #[test]
    fn test_linked_signal_never_writes_external_flag() {
        let external = Arc::new(AtomicBool::new(false));

        let first_run = StopSignal::linked(Arc::clone(&external));
        first_run.stop();
        assert!(first_run.is_stopped());
        assert!(!external.load(Ordering::Relaxed));

        let second_run = StopSignal::linked(Arc::clone(&external));
        assert!(!second_run.is_stopped());

        external.store(true, Ordering::Relaxed);
        assert!(second_run.is_stopped());
    }
}
