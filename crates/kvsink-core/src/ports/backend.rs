//! KvBackend port - connection to the remote key/value store.
//!
//! A backend handle is owned by exactly one worker and is never shared, so
//! methods take `&mut self` and the trait only requires `Send`.

use async_trait::async_trait;

use crate::domain::BackendError;

/// A command understood by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Set { key: String, value: String },
}

/// The backend's answer to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Int(i64),
    Data(String),
    Nil,
}

#[async_trait]
pub trait KvBackend: Send {
    /// (Re)establish the connection.
    async fn connect(&mut self) -> Result<(), BackendError>;

    /// `true` when there is no usable connection, or the last command failed.
    fn is_erroring(&self) -> bool;

    async fn execute(&mut self, command: Command) -> Result<Reply, BackendError>;

    /// `host:port` for log fields.
    fn address(&self) -> String;
}
