//! MessageQueue port - the worker's message source.
//!
//! The queue has its own internal locking; every operation is non-blocking.
//! The worker never holds a queue reference across network I/O.

use std::sync::Arc;

use crate::domain::{QueueError, QueuedMessage};

/// Invoked on the producer's side when a message arrives for a parked consumer.
pub type ArrivalCallback = Arc<dyn Fn() + Send + Sync>;

pub trait MessageQueue: Send + Sync {
    /// Producer-side enqueue. Fails when the queue is at capacity.
    fn push_tail(&self, message: QueuedMessage) -> Result<(), QueueError>;

    /// Requeue at the front. Never fails, even above capacity, so a requeued
    /// message is never lost.
    fn push_head(&self, message: QueuedMessage);

    /// Take the oldest message, if any.
    fn pop_head(&self) -> Option<QueuedMessage>;

    /// Returns `true` when messages are available. Otherwise `on_arrival` is
    /// registered and fired once, by the next push.
    fn check_items(&self, on_arrival: ArrivalCallback) -> bool;

    /// Forget a registered arrival callback.
    fn reset_arrival_callback(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
