use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use rama::error::OpaqueError;

use super::{Store, StoreConnection};

#[derive(Debug)]
enum Value {
    String(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
}

#[derive(Debug, Default)]
struct Shared {
    data: Mutex<HashMap<String, Value>>,
    ops: AtomicU64,
    fail_every: AtomicU64,
    failing: AtomicBool,
    connections: AtomicU64,
}

impl Shared {
    fn check_failure(&self, op: &'static str) -> Result<(), OpaqueError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(OpaqueError::from_display(format!(
                "in-memory store: {op} rejected (store is failing)"
            )));
        }
        let n = self.ops.fetch_add(1, Ordering::Relaxed) + 1;
        let fail_every = self.fail_every.load(Ordering::Relaxed);
        if fail_every > 0 && n % fail_every == 0 {
            return Err(OpaqueError::from_display(format!(
                "in-memory store: injected {op} failure (op #{n})"
            )));
        }
        Ok(())
    }
}

fn wrong_type() -> OpaqueError {
    OpaqueError::from_display("WRONGTYPE Operation against a key holding the wrong kind of value")
}

/// In-process [`Store`] with Redis-like string and hash semantics.
///
/// Used to measure the overhead of the benchmark itself
/// and to exercise the workload engine without a server.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every n-th operation (counted across all connections) fails.
    /// `0` disables the injector.
    pub fn with_failure_every(n: u64) -> Self {
        let store = Self::new();
        store.set_failure_every(n);
        store
    }

    /// Change the failure injector of a live store, see [`Self::with_failure_every`].
    pub fn set_failure_every(&self, n: u64) {
        self.shared.fail_every.store(n, Ordering::Relaxed);
    }

    /// Make all operations fail (`true`) or behave normally again (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.shared.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.data.lock().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.shared.data.lock().contains_key(key)
    }

    /// Amount of connections opened so far.
    pub fn connections(&self) -> u64 {
        self.shared.connections.load(Ordering::Relaxed)
    }
}

impl Store for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection, OpaqueError> {
        self.shared.connections.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryConnection {
            shared: self.shared.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl MemoryConnection {
    // every op yields once, like a network round trip would,
    // so that busy workers cannot starve the other tasks
    async fn enter(&self, op: &'static str) -> Result<(), OpaqueError> {
        tokio::task::yield_now().await;
        self.shared.check_failure(op)
    }
}

impl StoreConnection for MemoryConnection {
    async fn set(&mut self, key: &str, value: &[u8]) -> Result<(), OpaqueError> {
        self.enter("SET").await?;
        self.shared
            .data
            .lock()
            .insert(key.to_owned(), Value::String(value.to_vec()));
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, OpaqueError> {
        self.enter("GET").await?;
        match self.shared.data.lock().get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(Value::Hash(_)) => Err(wrong_type()),
        }
    }

    async fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<(), OpaqueError> {
        self.enter("HSET").await?;
        let mut data = self.shared.data.lock();
        match data
            .entry(key.to_owned())
            .or_insert_with(|| Value::Hash(HashMap::new()))
        {
            Value::Hash(fields) => {
                fields.insert(field.to_owned(), value.to_vec());
                Ok(())
            }
            Value::String(_) => Err(wrong_type()),
        }
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, OpaqueError> {
        self.enter("HGET").await?;
        match self.shared.data.lock().get(key) {
            None => Ok(None),
            Some(Value::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Value::String(_)) => Err(wrong_type()),
        }
    }

    async fn del(&mut self, key: &str) -> Result<(), OpaqueError> {
        self.enter("DEL").await?;
        self.shared.data.lock().remove(key);
        Ok(())
    }

    async fn hdel(&mut self, key: &str, field: &str) -> Result<(), OpaqueError> {
        self.enter("HDEL").await?;
        let mut data = self.shared.data.lock();
        let now_empty = match data.get_mut(key) {
            None => return Ok(()),
            Some(Value::Hash(fields)) => {
                fields.remove(field);
                fields.is_empty()
            }
            Some(Value::String(_)) => return Err(wrong_type()),
        };
        if now_empty {
            data.remove(key);
        }
        Ok(())
    }

    async fn disconnect(self) -> Result<(), OpaqueError> {
        Ok(())
    }
}
