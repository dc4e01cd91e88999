use tokio::sync::watch;

use crate::models::run::RunCounters;

/// Receives counter snapshots after each posting.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, counters: &RunCounters);
}

#[cfg(test)]
pub struct NoopProgress;

#[cfg(test)]
impl ProgressReporter for NoopProgress {
    fn report(&self, _counters: &RunCounters) {}
}

impl ProgressReporter for watch::Sender<RunCounters> {
    fn report(&self, counters: &RunCounters) {
        self.send_replace(*counters);
    }
}
