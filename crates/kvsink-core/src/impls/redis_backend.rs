//! RedisBackend - `KvBackend` over a Redis connection.
//!
//! The connection is established lazily by `connect()` and dropped on the
//! first failed command, which flips the handle into the erroring state so
//! the worker reconnects before its next delivery.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use crate::domain::BackendError;
use crate::ports::{Command, KvBackend, Reply};

pub struct RedisBackend {
    host: String,
    port: u16,
    connect_timeout: Duration,
    conn: Option<MultiplexedConnection>,
    last_error: Option<String>,
}

impl RedisBackend {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            conn: None,
            last_error: None,
        }
    }

    fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    fn connect_error(&mut self, message: String) -> BackendError {
        self.conn = None;
        self.last_error = Some(message.clone());
        BackendError::Connect {
            addr: self.address(),
            message,
        }
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.conn.is_some() && self.last_error.is_none() {
            return Ok(());
        }

        if let Some(previous) = &self.last_error {
            debug!(
                addr = %self.address(),
                previous_error = %previous,
                "reconnecting to redis server"
            );
        }

        let client = redis::Client::open(self.url())
            .map_err(|e| self.connect_error(e.to_string()))?;
        let mut conn = match tokio::time::timeout(
            self.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(self.connect_error(e.to_string())),
            Err(_) => {
                self.conn = None;
                self.last_error = Some("connect timed out".to_string());
                return Err(BackendError::Timeout {
                    addr: self.address(),
                    after: self.connect_timeout,
                });
            }
        };

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.connect_error(e.to_string()))?;
        debug!(addr = %self.address(), reply = %pong, "connected to redis server");

        self.conn = Some(conn);
        self.last_error = None;
        Ok(())
    }

    fn is_erroring(&self) -> bool {
        self.conn.is_none() || self.last_error.is_some()
    }

    async fn execute(&mut self, command: Command) -> Result<Reply, BackendError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(BackendError::NotConnected);
        };

        let cmd = match &command {
            Command::Ping => redis::cmd("PING"),
            Command::Set { key, value } => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value);
                cmd
            }
        };

        let result: redis::RedisResult<redis::Value> = cmd.query_async(conn).await;
        match result {
            Ok(value) => Ok(to_reply(value)),
            Err(e) => {
                let message = e.to_string();
                self.conn = None;
                self.last_error = Some(message.clone());
                Err(BackendError::Command { message })
            }
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn to_reply(value: redis::Value) -> Reply {
    match value {
        redis::Value::Nil => Reply::Nil,
        redis::Value::Int(n) => Reply::Int(n),
        redis::Value::Okay => Reply::Status("OK".to_string()),
        redis::Value::SimpleString(s) => Reply::Status(s),
        redis::Value::BulkString(bytes) => {
            Reply::Data(String::from_utf8_lossy(&bytes).into_owned())
        }
        other => Reply::Data(format!("{other:?}")),
    }
}
