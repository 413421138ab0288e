//! App - アプリケーション層
//!
//! ports を組み合わせてドライバを組み立てる。
//!
//! # 主要コンポーネント
//! - **DriverBuilder**: 設定の検証とワイヤリング
//! - **RedisDestDriver**: init / deinit / queue / free
//! - **WorkerController**: worker の start / stop / notify
//! - **DeliveryWorker**: 配送ループ（wait → connect → pop → SET → ack / requeue + suspend）

pub mod builder;
pub mod controller;
pub mod driver;
pub mod worker_loop;

pub use self::builder::{BackendFactory, BuildError, DriverBuilder};
pub use self::controller::WorkerController;
pub use self::driver::{DriverHandle, RedisDestDriver};
pub use self::worker_loop::DeliveryWorker;
