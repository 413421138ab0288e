//! DriverBuilder - 構築とワイヤリング
//!
//! # Fail-fast
//! - 設定値の検証（host / port / time_reopen / queue_capacity）
//! - key / value テンプレートのコンパイル
//! - 問題があれば build() 時に BuildError を返し、driver は作られない

use std::sync::Arc;

use super::driver::RedisDestDriver;
use crate::config::RedisDestConfig;
use crate::domain::{ReopenPolicy, TemplateError};
use crate::impls::{InMemoryMessageQueue, RedisBackend};
use crate::ports::{KvBackend, MessageQueue};
use crate::template::LogTemplate;

/// Creates a fresh backend handle for every `init()`.
pub type BackendFactory = Box<dyn Fn() -> Box<dyn KvBackend> + Send + Sync>;

/// BuildError はドライバ構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid {field} template: {source}")]
    Template {
        field: &'static str,
        #[source]
        source: TemplateError,
    },
}

/// # 使用例
/// ```ignore
/// let mut driver = DriverBuilder::new(RedisDestConfig::from_env()?).build()?;
/// driver.init()?;
/// ```
///
/// queue と backend を差し替えなければ、`queue_capacity` の
/// `InMemoryMessageQueue` と設定された host/port の `RedisBackend` を使う。
pub struct DriverBuilder {
    config: RedisDestConfig,
    queue: Option<Arc<dyn MessageQueue>>,
    backend_factory: Option<BackendFactory>,
}

impl DriverBuilder {
    pub fn new(config: RedisDestConfig) -> Self {
        Self {
            config,
            queue: None,
            backend_factory: None,
        }
    }

    /// Use `queue` instead of a fresh in-memory queue.
    pub fn queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use `factory` instead of connecting to Redis.
    pub fn backend_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn KvBackend> + Send + Sync + 'static,
    {
        self.backend_factory = Some(Box::new(factory));
        self
    }

    pub fn build(self) -> Result<RedisDestDriver, BuildError> {
        let config = self.config;
        validate(&config)?;

        let key_template = LogTemplate::compile(&config.key).map_err(|source| {
            BuildError::Template {
                field: "key",
                source,
            }
        })?;
        let value_template = LogTemplate::compile(&config.value).map_err(|source| {
            BuildError::Template {
                field: "value",
                source,
            }
        })?;

        let instance = config.stats_instance();
        let driver_id = config.driver_id.clone().unwrap_or_else(|| instance.clone());

        let queue: Arc<dyn MessageQueue> = match self.queue {
            Some(queue) => queue,
            None => Arc::new(InMemoryMessageQueue::with_capacity(config.queue_capacity)),
        };

        let backend_factory: BackendFactory = match self.backend_factory {
            Some(factory) => factory,
            None => {
                let host = config.host.clone();
                let port = config.port;
                let timeout = config.connect_timeout();
                Box::new(move || -> Box<dyn KvBackend> {
                    Box::new(RedisBackend::new(host.clone(), port, timeout))
                })
            }
        };

        Ok(RedisDestDriver::from_parts(
            instance,
            driver_id,
            ReopenPolicy::new(config.time_reopen()),
            key_template,
            value_template,
            queue,
            backend_factory,
        ))
    }
}

fn validate(config: &RedisDestConfig) -> Result<(), BuildError> {
    if config.host.trim().is_empty() {
        return Err(BuildError::InvalidConfig("host must not be empty".to_string()));
    }
    if config.port == 0 {
        return Err(BuildError::InvalidConfig("port must not be 0".to_string()));
    }
    if config.time_reopen_secs == 0 {
        return Err(BuildError::InvalidConfig(
            "time_reopen must be at least 1 second".to_string(),
        ));
    }
    if config.queue_capacity == 0 {
        return Err(BuildError::InvalidConfig(
            "queue_capacity must not be 0".to_string(),
        ));
    }
    Ok(())
}
