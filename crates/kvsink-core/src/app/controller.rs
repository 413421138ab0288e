//! WorkerController - starts, signals and stops the delivery worker.
//!
//! Owns the synchronization pair shared with the worker:
//! - `Mutex<DriverState>`: the scalars (terminating / suspend deadline / phase)
//! - `Notify`: the wakeup signal, used like a condition variable
//!
//! Every signal is sent while holding the lock. The worker registers its
//! wait (`Notified::enable`) under the same lock before releasing it, so a
//! signal can never fall between "check" and "sleep".

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::worker_loop::DeliveryWorker;
use crate::domain::{DriverError, DriverState, SequenceNumber, WorkerPhase};
use crate::ports::ArrivalCallback;

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<DriverState>,
    pub(crate) wakeup: Notify,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, DriverState> {
        // the guarded scalars are always consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the worker, whichever wait it is in.
    pub(crate) fn signal(&self) {
        let _state = self.lock();
        self.wakeup.notify_one();
    }

    /// Callback for the queue: signals through a weak reference, so a late
    /// push after the driver is gone does nothing.
    pub(crate) fn arrival_callback(self: &Arc<Self>) -> ArrivalCallback {
        let shared: Weak<Shared> = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.signal();
            }
        })
    }
}

/// Lifecycle of one delivery worker.
pub struct WorkerController {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<SequenceNumber>>,
}

impl WorkerController {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            handle: None,
        }
    }

    /// Spawn the worker task on a fresh shared state.
    ///
    /// Each run gets its own `Notify`, so a wakeup left over from the
    /// previous run (a stop during delivery, a signal while busy) cannot
    /// reach the new worker. Callbacks bound to the old state go inert.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&mut self, worker: DeliveryWorker) -> Result<(), DriverError> {
        if self.handle.is_some() {
            return Err(DriverError::AlreadyStarted);
        }
        self.shared = Arc::new(Shared::default());
        self.shared.lock().reset();

        let shared = Arc::clone(&self.shared);
        self.handle = Some(tokio::spawn(worker.run(shared)));
        Ok(())
    }

    /// Request termination, wake the worker and wait until it has exited.
    ///
    /// A delivery in progress is finished first; nothing new starts after
    /// the worker observed the request. Returns the worker's final sequence
    /// number.
    pub async fn stop(&mut self) -> Result<SequenceNumber, DriverError> {
        let Some(handle) = self.handle.take() else {
            return Err(DriverError::NotStarted);
        };

        {
            let mut state = self.shared.lock();
            state.request_termination();
            self.shared.wakeup.notify_one();
        }

        match handle.await {
            Ok(seq_num) => {
                debug!(seq_num = %seq_num, "worker joined");
                Ok(seq_num)
            }
            Err(e) => {
                self.shared.lock().set_phase(WorkerPhase::Terminated);
                Err(DriverError::WorkerPanicked(e.to_string()))
            }
        }
    }

    /// Producer-side wakeup for a worker parked on an empty queue.
    pub fn notify_arrival(&self) {
        self.shared.signal();
    }

    pub fn phase(&self) -> WorkerPhase {
        self.shared.lock().phase()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Default for WorkerController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerController {
    fn drop(&mut self) {
        // Drop can't join; ask the worker to go away and let it finish on its own.
        if self.handle.is_some() {
            warn!("worker controller dropped while running; call stop() first");
            let mut state = self.shared.lock();
            state.request_termination();
            self.shared.wakeup.notify_one();
        }
    }
}
