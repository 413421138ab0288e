//! Counters exported for external metrics collection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonically increasing counter, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct StatsCounter(Arc<AtomicU64>);

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// The counters a destination registers.
#[derive(Debug, Clone, Default)]
pub struct DriverCounters {
    pub stored_messages: StatsCounter,
    pub dropped_messages: StatsCounter,
}

impl DriverCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Point-in-time view of a destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStats {
    /// Stats instance, e.g. `redis,127.0.0.1,6379`.
    pub instance: String,
    pub stored_messages: u64,
    pub dropped_messages: u64,
    /// Current queue depth.
    pub queued: usize,
}
