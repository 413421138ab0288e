//! RedisDestDriver - the lifecycle hooks a host pipeline calls.
//!
//! - `init()`: spawn the delivery worker
//! - `queue()`: enqueue a message (any number of producers, via `DriverHandle`)
//! - `deinit()`: stop and join the worker, unregister the arrival callback
//! - `free()`: destroy the driver
//!
//! Delivery failures never reach the host. It only observes queue depth and
//! the counters in `stats()`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::builder::BackendFactory;
use super::controller::WorkerController;
use super::worker_loop::DeliveryWorker;
use crate::domain::{
    DriverCounters, DriverError, DriverStats, LogMessage, PathOptions, QueueError, QueuedMessage,
    ReopenPolicy, SequenceNumber, WorkerPhase,
};
use crate::ports::MessageQueue;
use crate::template::LogTemplate;

/// Producer-side handle; cheap to clone, safe to use from any task or thread.
#[derive(Clone)]
pub struct DriverHandle {
    driver_id: Arc<str>,
    queue: Arc<dyn MessageQueue>,
    counters: DriverCounters,
}

impl DriverHandle {
    /// Enqueue one message.
    ///
    /// Without flow control the upstream ack is released right away. A full
    /// queue drops the message; it is acked and counted, never blocks.
    pub fn queue(&self, message: LogMessage, path_options: &PathOptions) {
        let local_options = if path_options.flow_control_requested {
            path_options.clone()
        } else {
            path_options.break_ack()
        };

        let queued = QueuedMessage::new(message, local_options);
        if let Err(QueueError::Full { capacity, message }) = self.queue.push_tail(queued) {
            warn!(
                driver = %self.driver_id,
                capacity,
                message_id = %message.message().id(),
                "destination queue full, dropping message"
            );
            self.counters.dropped_messages.inc();
            message.ack();
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

pub struct RedisDestDriver {
    instance: String,
    policy: ReopenPolicy,
    key_template: LogTemplate,
    value_template: LogTemplate,
    backend_factory: BackendFactory,
    handle: DriverHandle,
    seq_num: SequenceNumber,
    controller: WorkerController,
}

impl RedisDestDriver {
    pub(crate) fn from_parts(
        instance: String,
        driver_id: String,
        policy: ReopenPolicy,
        key_template: LogTemplate,
        value_template: LogTemplate,
        queue: Arc<dyn MessageQueue>,
        backend_factory: BackendFactory,
    ) -> Self {
        Self {
            instance,
            policy,
            key_template,
            value_template,
            backend_factory,
            handle: DriverHandle {
                driver_id: Arc::from(driver_id),
                queue,
                counters: DriverCounters::new(),
            },
            seq_num: SequenceNumber::new(),
            controller: WorkerController::new(),
        }
    }

    /// Start delivering. Needs a tokio runtime.
    pub fn init(&mut self) -> Result<(), DriverError> {
        if self.controller.is_running() {
            return Err(DriverError::AlreadyStarted);
        }

        let backend = (self.backend_factory)();
        info!(
            driver = %self.handle.driver_id,
            address = %backend.address(),
            key = %self.key_template.source(),
            value = %self.value_template.source(),
            "initializing redis destination"
        );

        let worker = DeliveryWorker::new(
            &*self.handle.driver_id,
            Arc::clone(&self.handle.queue),
            backend,
            self.key_template.clone(),
            self.value_template.clone(),
            self.handle.counters.clone(),
            self.seq_num,
            self.policy,
        );
        self.controller.start(worker)
    }

    /// Stop the worker and wait for it to exit. Queued messages stay queued
    /// and are delivered after the next `init()`.
    pub async fn deinit(&mut self) -> Result<(), DriverError> {
        let result = self.controller.stop().await;
        self.handle.queue.reset_arrival_callback();

        let seq_num = result?;
        self.seq_num = seq_num;
        debug!(driver = %self.handle.driver_id, %seq_num, "redis destination stopped");
        Ok(())
    }

    pub fn queue(&self, message: LogMessage, path_options: &PathOptions) {
        self.handle.queue(message, path_options);
    }

    /// A producer handle usable after the driver was moved elsewhere.
    pub fn handle(&self) -> DriverHandle {
        self.handle.clone()
    }

    /// Destroy the driver. Call `deinit()` first; a still running worker is
    /// only asked to terminate, not joined.
    pub fn free(self) {
        if self.controller.is_running() {
            warn!(driver = %self.handle.driver_id, "freeing a running destination");
        }
    }

    pub fn stats_instance(&self) -> &str {
        &self.instance
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            instance: self.instance.clone(),
            stored_messages: self.handle.counters.stored_messages.get(),
            dropped_messages: self.handle.counters.dropped_messages.get(),
            queued: self.handle.queued(),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        self.controller.phase()
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Sequence number the next delivery will use.
    pub fn seq_num(&self) -> SequenceNumber {
        self.seq_num
    }
}
