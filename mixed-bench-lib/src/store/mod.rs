//! The boundary between the workload engine and the key-value store it drives.
//!
//! The engine only needs to connect, issue the four benchmarked operations
//! (plus the deletes used to reset the key space) and disconnect.
//! Everything else (wire protocol, cluster routing, TLS) is owned by the
//! concrete [`Store`] implementation.

use std::fmt;

use rama::error::OpaqueError;

mod memory;
mod redis;
mod tls;

pub use self::{
    memory::{MemoryConnection, MemoryStore},
    redis::{RedisConnection, RedisStore, RedisStoreConfig},
    tls::TlsFiles,
};

/// A store that can hand out connections.
pub trait Store: fmt::Debug + Send + Sync + 'static {
    type Connection: StoreConnection;

    /// Open a new logical connection to the store.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, OpaqueError>> + Send + '_;
}

/// A single logical connection.
///
/// Connections are cheap to clone: clones share the same underlying
/// connection, which allows many operations to be in flight at once
/// (e.g. while pre-populating the key space).
pub trait StoreConnection: fmt::Debug + Clone + Send + Sync + 'static {
    fn set(
        &mut self,
        key: &str,
        value: &[u8],
    ) -> impl Future<Output = Result<(), OpaqueError>> + Send;

    fn get(&mut self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, OpaqueError>> + Send;

    fn hset(
        &mut self,
        key: &str,
        field: &str,
        value: &[u8],
    ) -> impl Future<Output = Result<(), OpaqueError>> + Send;

    fn hget(
        &mut self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, OpaqueError>> + Send;

    fn del(&mut self, key: &str) -> impl Future<Output = Result<(), OpaqueError>> + Send;

    fn hdel(&mut self, key: &str, field: &str)
    -> impl Future<Output = Result<(), OpaqueError>> + Send;

    /// Close the connection. Other clones of it become unusable.
    fn disconnect(self) -> impl Future<Output = Result<(), OpaqueError>> + Send;
}
