//! InMemoryMessageQueue - bounded FIFO with a one-shot arrival callback.
//!
//! # 実装詳細
//! - `VecDeque<QueuedMessage>` を Mutex で保護
//! - 空のときに `check_items` で登録された callback を、次の push で一度だけ呼ぶ
//! - callback はロックを外してから呼ぶ（callback 側で driver のロックを取るため）

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{QueueError, QueuedMessage};
use crate::ports::{ArrivalCallback, MessageQueue};

/// Default capacity when none is configured.
pub const DEFAULT_CAPACITY: usize = 10_000;

struct QueueState {
    items: VecDeque<QueuedMessage>,
    on_arrival: Option<ArrivalCallback>,
}

pub struct InMemoryMessageQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                on_arrival: None,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Callbacks run outside the queue lock.
fn fire(callback: Option<ArrivalCallback>) {
    if let Some(callback) = callback {
        callback();
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue for InMemoryMessageQueue {
    fn push_tail(&self, message: QueuedMessage) -> Result<(), QueueError> {
        let callback = {
            let mut state = self.lock();
            if state.items.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                    message: Box::new(message),
                });
            }
            state.items.push_back(message);
            state.on_arrival.take()
        };
        fire(callback);
        Ok(())
    }

    /// Front pushes never check capacity.
    fn push_head(&self, message: QueuedMessage) {
        let callback = {
            let mut state = self.lock();
            state.items.push_front(message);
            state.on_arrival.take()
        };
        fire(callback);
    }

    fn pop_head(&self) -> Option<QueuedMessage> {
        self.lock().items.pop_front()
    }

    fn check_items(&self, on_arrival: ArrivalCallback) -> bool {
        let mut state = self.lock();
        if !state.items.is_empty() {
            return true;
        }
        state.on_arrival = Some(on_arrival);
        false
    }

    fn reset_arrival_callback(&self) {
        self.lock().on_arrival = None;
    }

    fn len(&self) -> usize {
        self.lock().items.len()
    }
}
