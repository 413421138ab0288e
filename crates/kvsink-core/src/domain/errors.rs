//! Error types.
//!
//! Backend failures never leave the worker: they are absorbed by the
//! suspend/requeue loop. The other errors surface at construction time or
//! to the host calling the lifecycle hooks.

use std::time::Duration;

use thiserror::Error;

use super::message::QueuedMessage;

/// Failure talking to the key/value backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("cannot connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("connect to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },

    #[error("command failed: {message}")]
    Command { message: String },

    #[error("not connected")]
    NotConnected,
}

impl BackendError {
    /// Connection-level failure (nothing was popped for it).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            BackendError::Connect { .. } | BackendError::Timeout { .. } | BackendError::NotConnected
        )
    }
}

/// Failure pushing into the message queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The rejected message is handed back so the caller can account for it.
    #[error("queue is full (capacity={capacity})")]
    Full {
        capacity: usize,
        message: Box<QueuedMessage>,
    },
}

/// Template compile failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed '${{' at byte {position}")]
    UnclosedBrace { position: usize },

    #[error("empty macro name at byte {position}")]
    EmptyMacroName { position: usize },
}

/// Bad configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

/// Lifecycle errors reported to the host.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("worker is already running")]
    AlreadyStarted,

    #[error("worker is not running")]
    NotStarted,

    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),
}
