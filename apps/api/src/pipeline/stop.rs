use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Cooperative cancellation, checked once between postings.
pub trait StopSignal: Send + Sync {
    fn is_stop_requested(&self) -> bool;
}

impl StopSignal for watch::Receiver<bool> {
    fn is_stop_requested(&self) -> bool {
        *self.borrow()
    }
}

impl StopSignal for AtomicBool {
    fn is_stop_requested(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub struct NeverStop;

#[cfg(test)]
impl StopSignal for NeverStop {
    fn is_stop_requested(&self) -> bool {
        false
    }
}
