//! Driver state shared between the lifecycle controller and the worker.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Where the delivery worker currently is.
///
/// State transitions:
/// - Init -> Running (start)
/// - Running -> Suspended (delivery failure) -> Running (deadline elapsed)
/// - Running -> Waiting (queue empty) -> Running (arrival)
/// - Running/Suspended/Waiting -> Terminating (stop) -> Terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerPhase {
    /// Created, not started.
    Init,

    /// Popping and delivering.
    Running,

    /// Parked until a message arrives.
    Waiting,

    /// Parked until the suspend deadline.
    Suspended,

    /// Stop requested, worker not yet gone.
    Terminating,

    /// Worker exited.
    Terminated,
}

impl WorkerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerPhase::Terminated)
    }
}

/// Scalars guarded by the driver lock.
///
/// - `terminating` is written only by the controller and never cleared
///   while a worker is alive.
/// - `suspended_until` is written only by the worker.
#[derive(Debug, Clone)]
pub struct DriverState {
    terminating: bool,
    suspended_until: Option<Instant>,
    phase: WorkerPhase,
}

impl DriverState {
    pub fn new() -> Self {
        Self {
            terminating: false,
            suspended_until: None,
            phase: WorkerPhase::Init,
        }
    }

    /// Fresh state for a (re)started worker.
    pub fn reset(&mut self) {
        self.terminating = false;
        self.suspended_until = None;
        self.phase = WorkerPhase::Running;
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    pub fn request_termination(&mut self) {
        self.terminating = true;
        if !self.phase.is_terminal() {
            self.phase = WorkerPhase::Terminating;
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_until.is_some()
    }

    pub fn suspend_deadline(&self) -> Option<Instant> {
        self.suspended_until
    }

    pub fn suspend(&mut self, deadline: Instant) {
        self.suspended_until = Some(deadline);
    }

    pub fn resume(&mut self) {
        self.suspended_until = None;
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Record a phase change; termination phases are sticky.
    pub fn set_phase(&mut self, phase: WorkerPhase) {
        if self.terminating && phase != WorkerPhase::Terminated {
            return;
        }
        self.phase = phase;
    }
}

impl Default for DriverState {
    fn default() -> Self {
        Self::new()
    }
}
