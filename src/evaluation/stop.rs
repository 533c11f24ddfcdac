//! Cooperative cancellation for the training and evaluation loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag, checked by the loops before every batch.
///
/// Clones share the same flag, so one clone can be handed to a signal handler
/// or another thread while the loop polls the other.
#[derive(Clone, Default, Debug)]
pub struct StopSignal {
    state: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every loop holding this signal to stop at the next batch boundary
    pub fn stop(&self) {
        self.state.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.state.store(false, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }
}
