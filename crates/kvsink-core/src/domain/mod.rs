//! Domain model: messages, ack tracking, driver state, counters, errors.

pub mod errors;
pub mod ids;
pub mod message;
pub mod reopen;
pub mod sequence;
pub mod state;
pub mod stats;

pub use self::errors::{BackendError, ConfigError, DriverError, QueueError, TemplateError};
pub use self::ids::MessageId;
pub use self::message::{AckTracker, LogMessage, PathOptions, QueuedMessage};
pub use self::reopen::ReopenPolicy;
pub use self::sequence::SequenceNumber;
pub use self::state::{DriverState, WorkerPhase};
pub use self::stats::{DriverCounters, DriverStats, StatsCounter};
