//! DeliveryWorker - the single consumer turning queued messages into SETs.
//!
//! # フロー
//! 1. lock を取り、suspend 中なら deadline まで待つ
//! 2. そうでなければ queue を確認し、空なら arrival callback を登録して待つ
//! 3. 起きたら必ず terminating を確認する
//! 4. lock を外して 1 件配送（connect → pop → render → SET）
//! 5. 失敗したら suspend_deadline = now + time_reopen で suspend
//!
//! lock は network I/O の間は持たない。queue と backend は lock の外。

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error};

use super::controller::Shared;
use crate::domain::{
    BackendError, DriverCounters, QueuedMessage, ReopenPolicy, SequenceNumber, WorkerPhase,
};
use crate::ports::{ArrivalCallback, Command, KvBackend, MessageQueue};
use crate::template::{LogTemplate, wash_string};

pub struct DeliveryWorker {
    driver_id: String,
    queue: Arc<dyn MessageQueue>,
    backend: Box<dyn KvBackend>,
    key_template: LogTemplate,
    value_template: LogTemplate,
    counters: DriverCounters,
    seq_num: SequenceNumber,
    policy: ReopenPolicy,
}

impl DeliveryWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver_id: impl Into<String>,
        queue: Arc<dyn MessageQueue>,
        backend: Box<dyn KvBackend>,
        key_template: LogTemplate,
        value_template: LogTemplate,
        counters: DriverCounters,
        seq_num: SequenceNumber,
        policy: ReopenPolicy,
    ) -> Self {
        Self {
            driver_id: driver_id.into(),
            queue,
            backend,
            key_template,
            value_template,
            counters,
            seq_num,
            policy,
        }
    }

    /// Run until termination is observed. Returns the sequence number the
    /// next delivery would have used, so a restarted worker continues it.
    pub(crate) async fn run(mut self, shared: Arc<Shared>) -> SequenceNumber {
        debug!(driver = %self.driver_id, "worker started");
        let on_arrival = shared.arrival_callback();
        let mut failures: u32 = 0;

        while wait_for_work(self.queue.as_ref(), &shared, &on_arrival).await {
            match self.deliver_one().await {
                Ok(()) => {
                    failures = 0;
                    // give producers and the controller a turn between deliveries
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let deadline = self.policy.suspend_deadline(Instant::now());
                    error!(
                        driver = %self.driver_id,
                        error = %e,
                        failures,
                        time_reopen = ?self.policy.time_reopen(),
                        "redis server error, suspending"
                    );
                    shared.lock().suspend(deadline);
                }
            }
        }

        shared.lock().set_phase(WorkerPhase::Terminated);
        debug!(driver = %self.driver_id, seq_num = %self.seq_num, "worker finished");
        self.seq_num
    }

    /// One delivery attempt.
    ///
    /// - reconnect first if the backend is erroring; a failed reconnect pops nothing
    /// - an empty queue is a successful no-op
    /// - a failed SET puts the message back at the head of the queue
    pub(crate) async fn deliver_one(&mut self) -> Result<(), BackendError> {
        if self.backend.is_erroring() {
            self.backend.connect().await?;
        }

        let Some(message) = self.queue.pop_head() else {
            return Ok(());
        };

        let (key, value) = self.render(&message);
        let command = Command::Set {
            key: key.clone(),
            value,
        };

        match self.backend.execute(command).await {
            Ok(_) => {
                self.counters.stored_messages.inc();
                debug!(
                    driver = %self.driver_id,
                    seq_num = %self.seq_num,
                    key = %key,
                    "message stored"
                );
                self.seq_num.step();
                message.ack();
                Ok(())
            }
            Err(e) => {
                self.queue.push_head(message);
                Err(e)
            }
        }
    }

    fn render(&self, message: &QueuedMessage) -> (String, String) {
        let msg = message.message();

        let mut key = self.key_template.render(msg, self.seq_num);
        let _ = write!(key, ":{}", self.seq_num);
        wash_string(&mut key);

        let mut value = self.value_template.render(msg, self.seq_num);
        wash_string(&mut value);

        (key, value)
    }
}

/// Block until there is something to do. `false` means terminate.
///
/// Free function so the worker's future only borrows the queue, never the
/// whole worker (the backend handle is `Send` but not `Sync`).
async fn wait_for_work(
    queue: &dyn MessageQueue,
    shared: &Shared,
    on_arrival: &ArrivalCallback,
) -> bool {
    let deadline = {
        let state = shared.lock();
        if state.is_terminating() {
            return false;
        }
        state.suspend_deadline()
    };

    if let Some(deadline) = deadline {
        sleep_until_deadline(shared, deadline).await;
        let mut state = shared.lock();
        state.resume();
        state.set_phase(WorkerPhase::Running);
        return !state.is_terminating();
    }

    // a wakeup is only a hint; the queue is re-checked before reporting work
    loop {
        let notified = shared.wakeup.notified();
        tokio::pin!(notified);
        {
            let mut state = shared.lock();
            if state.is_terminating() {
                return false;
            }
            if queue.check_items(Arc::clone(on_arrival)) {
                state.set_phase(WorkerPhase::Running);
                return true;
            }
            state.set_phase(WorkerPhase::Waiting);
            notified.as_mut().enable();
        }
        notified.await;
    }
}

/// Absolute-deadline wait. Early wakeups re-arm against the same deadline,
/// so only termination or the deadline itself ends the suspension.
async fn sleep_until_deadline(shared: &Shared, deadline: Instant) {
    loop {
        let notified = shared.wakeup.notified();
        tokio::pin!(notified);
        {
            let mut state = shared.lock();
            if state.is_terminating() || Instant::now() >= deadline {
                return;
            }
            state.set_phase(WorkerPhase::Suspended);
            notified.as_mut().enable();
        }

        tokio::select! {
            _ = &mut notified => {}
            _ = tokio::time::sleep_until(deadline) => {}
        }
    }
}
