//! MemoryBackend - in-process key/value store with scriptable outages.
//!
//! `MemoryStore` is the shared store; every `MemoryBackend` handed out by
//! `MemoryStore::backend()` is one "connection" to it. Tests use the store
//! to inject failures and to inspect what was attempted and what landed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::BackendError;
use crate::ports::{Command, KvBackend, Reply};

/// One `SET` the backend saw, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttempt {
    pub at: Instant,
    pub key: String,
    pub value: String,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<String, String>,
    attempts: Vec<WriteAttempt>,
    connects: usize,
    down: bool,
    fail_connects: u32,
    fail_writes: u32,
    write_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh, not yet connected handle.
    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend {
            store: self.clone(),
            connected: false,
            erroring: true,
        }
    }

    /// While down, every connect and write fails.
    pub fn set_down(&self, down: bool) {
        self.lock().down = down;
    }

    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_connects = n;
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.lock().fail_writes = n;
    }

    /// Make every write take `delay` before it completes.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.lock().write_delay = delay;
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().entries.get(key).cloned()
    }

    pub fn entries(&self) -> BTreeMap<String, String> {
        self.lock().entries.clone()
    }

    pub fn attempts(&self) -> Vec<WriteAttempt> {
        self.lock().attempts.clone()
    }

    /// Successful writes, in the order they landed.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.lock()
            .attempts
            .iter()
            .filter(|a| a.succeeded)
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }
}

pub struct MemoryBackend {
    store: MemoryStore,
    connected: bool,
    erroring: bool,
}

impl MemoryBackend {
    fn fail(&mut self, message: &str) -> BackendError {
        self.connected = false;
        self.erroring = true;
        BackendError::Command {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn connect(&mut self) -> Result<(), BackendError> {
        let mut state = self.store.lock();
        state.connects += 1;
        if state.down || state.fail_connects > 0 {
            state.fail_connects = state.fail_connects.saturating_sub(1);
            drop(state);
            self.connected = false;
            self.erroring = true;
            return Err(BackendError::Connect {
                addr: self.address(),
                message: "connection refused".to_string(),
            });
        }
        self.connected = true;
        self.erroring = false;
        Ok(())
    }

    fn is_erroring(&self) -> bool {
        self.erroring || !self.connected
    }

    async fn execute(&mut self, command: Command) -> Result<Reply, BackendError> {
        if !self.connected {
            return Err(BackendError::NotConnected);
        }

        let (key, value) = match command {
            Command::Ping => {
                if self.store.lock().down {
                    return Err(self.fail("connection reset"));
                }
                return Ok(Reply::Status("PONG".to_string()));
            }
            Command::Set { key, value } => (key, value),
        };

        let started = Instant::now();
        let delay = self.store.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let succeeded = {
            let mut state = self.store.lock();
            let succeeded = if state.down {
                false
            } else if state.fail_writes > 0 {
                state.fail_writes -= 1;
                false
            } else {
                state.entries.insert(key.clone(), value.clone());
                true
            };
            state.attempts.push(WriteAttempt {
                at: started,
                key,
                value,
                succeeded,
            });
            succeeded
        };

        if succeeded {
            Ok(Reply::Status("OK".to_string()))
        } else {
            Err(self.fail("write rejected"))
        }
    }

    fn address(&self) -> String {
        "memory:0".to_string()
    }
}
