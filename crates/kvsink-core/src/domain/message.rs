//! Log messages and the ack plumbing that travels with them.
//!
//! A `QueuedMessage` is the unit the queue hands to the worker. It owns the
//! message and its `PathOptions`; both come back unchanged on requeue, and the
//! ack is released exactly once, when the message is consumed by `ack()`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::ids::MessageId;

/// Name of the value holding the message text.
pub const MESSAGE: &str = "MESSAGE";
/// Name of the value holding the originating host.
pub const HOST: &str = "HOST";
/// Name of the value holding the program name.
pub const PROGRAM: &str = "PROGRAM";

/// A log message: timestamp + name/value pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    id: MessageId,
    timestamp: DateTime<Utc>,
    values: BTreeMap<String, String>,
}

impl LogMessage {
    /// Create a message whose `MESSAGE` value is `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(MESSAGE.to_string(), text.into());
        Self {
            id: MessageId::generate(),
            timestamp: Utc::now(),
            values,
        }
    }

    /// Create a message without any values.
    pub fn empty() -> Self {
        Self {
            id: MessageId::generate(),
            timestamp: Utc::now(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_value(name, value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Default)]
struct AckState {
    pending: AtomicUsize,
    acked: AtomicU64,
    idle: Notify,
}

/// Upstream view of acknowledgements.
///
/// Producers hand a tracker along with their messages and can observe how
/// many are still in flight, or wait until all of them were acknowledged.
#[derive(Debug, Clone, Default)]
pub struct AckTracker {
    inner: Arc<AckState>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handed out but not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Total acknowledgements received so far.
    pub fn acked(&self) -> u64 {
        self.inner.acked.load(Ordering::Acquire)
    }

    /// Resolve once nothing is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn add_ack(&self) {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
    }

    fn ack(&self) {
        self.inner.acked.fetch_add(1, Ordering::AcqRel);
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Per-path delivery options carried next to a message.
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    /// The producer wants the ack only after durable delivery.
    pub flow_control_requested: bool,
    ack_tracker: Option<AckTracker>,
}

impl PathOptions {
    /// No flow control, nobody listening for acks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ack is held until the worker delivered the message.
    pub fn with_flow_control(tracker: AckTracker) -> Self {
        Self {
            flow_control_requested: true,
            ack_tracker: Some(tracker),
        }
    }

    /// Ack is released as soon as the message is accepted into the queue.
    pub fn without_flow_control(tracker: AckTracker) -> Self {
        Self {
            flow_control_requested: false,
            ack_tracker: Some(tracker),
        }
    }

    /// Acknowledge upstream right away and return local options whose ack
    /// goes nowhere.
    pub fn break_ack(&self) -> PathOptions {
        if let Some(tracker) = &self.ack_tracker {
            tracker.add_ack();
            tracker.ack();
        }
        PathOptions::new()
    }
}

/// A message owned by the queue or, while in flight, by the worker.
///
/// Not `Clone`: a popped message exists exactly once.
#[derive(Debug)]
pub struct QueuedMessage {
    message: LogMessage,
    path_options: PathOptions,
}

impl QueuedMessage {
    /// Register one pending ack on the path and wrap the message.
    pub fn new(message: LogMessage, path_options: PathOptions) -> Self {
        if let Some(tracker) = &path_options.ack_tracker {
            tracker.add_ack();
        }
        Self {
            message,
            path_options,
        }
    }

    pub fn message(&self) -> &LogMessage {
        &self.message
    }

    /// Release the ack and drop the message.
    pub fn ack(self) {
        if let Some(tracker) = &self.path_options.ack_tracker {
            tracker.ack();
        }
    }
}
