//! kvsink-core
//!
//! A log destination that writes each message to a key/value store as a
//! `SET <key>:<seq> <value>`, with one background delivery worker per driver.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（message, ack, sequence, reopen policy, state, stats, errors）
//! - **ports**: 抽象化レイヤー（MessageQueue, KvBackend）
//! - **template**: key / value テンプレートと wash_string
//! - **impls**: 実装（InMemoryMessageQueue, MemoryBackend, RedisBackend）
//! - **app**: DriverBuilder, RedisDestDriver, WorkerController, DeliveryWorker
//! - **config**: RedisDestConfig
//!
//! # 配送の保証
//! - 単一 worker 内では FIFO。失敗したメッセージは queue の先頭に戻る
//! - backend の失敗は worker 内で吸収され、time_reopen の間 suspend する
//! - queue の容量を超えない限りメッセージは失われない

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod template;

pub use app::{BuildError, DriverBuilder, DriverHandle, RedisDestDriver};
pub use config::RedisDestConfig;
pub use domain::{AckTracker, DriverStats, LogMessage, PathOptions};
