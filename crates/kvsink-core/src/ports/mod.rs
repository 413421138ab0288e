//! Ports: the collaborators the delivery worker talks to.
//!
//! - `MessageQueue`: the bounded FIFO feeding the worker.
//! - `KvBackend`: the connection to the remote key/value store.

pub mod backend;
pub mod message_queue;

pub use self::backend::{Command, KvBackend, Reply};
pub use self::message_queue::{ArrivalCallback, MessageQueue};
