//! Impls - port implementations.
//!
//! - **InMemoryMessageQueue**: bounded FIFO with arrival callback
//! - **MemoryBackend**: in-process store with scriptable outages (dev/test)
//! - **RedisBackend**: production backend

pub mod inmem_queue;
pub mod memory_backend;
pub mod redis_backend;

pub use self::inmem_queue::InMemoryMessageQueue;
pub use self::memory_backend::{MemoryBackend, MemoryStore, WriteAttempt};
pub use self::redis_backend::RedisBackend;
