//! Reopen policy: how long the worker stays suspended after a failure.

use std::time::Duration;

use tokio::time::Instant;

/// Flat suspend interval.
///
/// Every failure suspends the worker for exactly `time_reopen`, no matter
/// how many failures came before it. There is no escalation and no retry
/// limit; delivery resumes once the backend recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReopenPolicy {
    time_reopen: Duration,
}

impl ReopenPolicy {
    pub const DEFAULT_TIME_REOPEN: Duration = Duration::from_secs(60);

    pub fn new(time_reopen: Duration) -> Self {
        Self { time_reopen }
    }

    pub fn time_reopen(&self) -> Duration {
        self.time_reopen
    }

    /// Absolute wake time for a failure observed at `now`.
    pub fn suspend_deadline(&self, now: Instant) -> Instant {
        now + self.time_reopen
    }
}

impl Default for ReopenPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIME_REOPEN)
    }
}
