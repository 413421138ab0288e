//! Destination configuration.
//!
//! | env var                   | field              | default     |
//! |---------------------------|--------------------|-------------|
//! | `KVSINK_REDIS_HOST`       | `host`             | `127.0.0.1` |
//! | `KVSINK_REDIS_PORT`       | `port`             | `6379`      |
//! | `KVSINK_KEY_TEMPLATE`     | `key`              | `$PROGRAM`  |
//! | `KVSINK_VALUE_TEMPLATE`   | `value`            | `$MESSAGE`  |
//! | `KVSINK_TIME_REOPEN_SECS` | `time_reopen_secs` | `60`        |
//! | `KVSINK_QUEUE_CAPACITY`   | `queue_capacity`   | `10000`     |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, ReopenPolicy};
use crate::impls::inmem_queue::DEFAULT_CAPACITY;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_KEY_TEMPLATE: &str = "$PROGRAM";
pub const DEFAULT_VALUE_TEMPLATE: &str = "$MESSAGE";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisDestConfig {
    pub host: String,
    pub port: u16,
    /// Key template; the delivered key is `<rendered>:<seq_num>`.
    pub key: String,
    /// Value template.
    pub value: String,
    pub time_reopen_secs: u64,
    pub queue_capacity: usize,
    pub connect_timeout_secs: u64,
    /// Name used in log fields. Defaults to the stats instance.
    pub driver_id: Option<String>,
}

impl Default for RedisDestConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            key: DEFAULT_KEY_TEMPLATE.to_string(),
            value: DEFAULT_VALUE_TEMPLATE.to_string(),
            time_reopen_secs: ReopenPolicy::DEFAULT_TIME_REOPEN.as_secs(),
            queue_capacity: DEFAULT_CAPACITY,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            driver_id: None,
        }
    }
}

impl RedisDestConfig {
    /// Load from `KVSINK_*` environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("KVSINK_REDIS_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "KVSINK_REDIS_PORT", defaults.port)?,
            key: lookup("KVSINK_KEY_TEMPLATE").unwrap_or(defaults.key),
            value: lookup("KVSINK_VALUE_TEMPLATE").unwrap_or(defaults.value),
            time_reopen_secs: parse_var(
                &lookup,
                "KVSINK_TIME_REOPEN_SECS",
                defaults.time_reopen_secs,
            )?,
            queue_capacity: parse_var(&lookup, "KVSINK_QUEUE_CAPACITY", defaults.queue_capacity)?,
            connect_timeout_secs: defaults.connect_timeout_secs,
            driver_id: defaults.driver_id,
        })
    }

    pub fn time_reopen(&self) -> Duration {
        Duration::from_secs(self.time_reopen_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Counters are registered under `redis,<host>,<port>`.
    pub fn stats_instance(&self) -> String {
        format!("redis,{},{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
    }
}
