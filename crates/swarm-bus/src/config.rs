//! Bus configuration.

use std::time::Duration;

use crate::DEFAULT_POLL_INTERVAL_MS;

/// Tunables for a [`crate::MessageBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Upper bound on how long the dispatch loop sleeps before re-checking
    /// the stop flag.
    pub poll_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl BusConfig {
    /// Configuration with a custom poll interval. A zero interval is raised
    /// to one millisecond so the loop never spins.
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }
}
