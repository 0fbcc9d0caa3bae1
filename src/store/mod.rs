//! Store abstraction
//!
//! The coalescer and the HTTP API only ever talk to a `Store`. Every method
//! maps one-to-one onto a Redis command and is atomic on its own; nothing
//! here offers multi-command transactions.
//!
//! Implementations:
//! - `InMemoryStore`: for unit tests and DST
//! - `RespStore`: Redis over TCP, for production
//! - `SimulatedStore`: fault-injecting wrapper around either of the above

pub mod data;
mod memory;
mod remote;
pub mod resp;
mod simulated;

pub use memory::InMemoryStore;
pub use remote::{RedisUrl, RespStore};
pub use simulated::{SimulatedStore, SimulatedStoreConfig, SimulatedStoreStats};

use crate::error::StoreError;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by `Store` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Key-value backend with list, set and hash primitives.
pub trait Store: Send + Sync + 'static {
    /// LPUSH a single value; returns the new list length
    fn lpush<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, usize>;

    /// LREM; returns the number of removed entries
    fn lrem<'a>(&'a self, key: &'a str, count: i64, value: &'a str) -> StoreFuture<'a, usize>;

    /// LRANGE with Redis index semantics
    fn lrange<'a>(&'a self, key: &'a str, start: isize, stop: isize)
        -> StoreFuture<'a, Vec<String>>;

    /// SADD a single member; true if it was not already present
    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool>;

    /// SREM a single member; true if it was present
    fn srem<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool>;

    /// SMEMBERS (unordered)
    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<String>>;

    /// HINCRBY; returns the value after the increment
    fn hincrby<'a>(&'a self, key: &'a str, field: &'a str, delta: i64) -> StoreFuture<'a, i64>;

    /// HGETALL as field/value pairs (unordered)
    fn hgetall<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<(String, String)>>;

    /// Round-trip check used at startup
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// Store key layout under one namespace prefix.
///
/// The prefix is concatenated verbatim, so it normally ends with a
/// separator (the default is `coalesce.v1.`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        StoreKeys {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Set of tracked coalescing keys
    pub fn key_set(&self) -> String {
        format!("{}list_keys", self.prefix)
    }

    /// Newest-first queue for one coalescing key
    pub fn queue(&self, key: &str) -> String {
        format!("{}lists.{}", self.prefix, key)
    }

    /// Counter hash maintained by the stats sink
    pub fn stats(&self) -> String {
        format!("{}stats", self.prefix)
    }
}
