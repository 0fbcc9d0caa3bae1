//! Task coalescing bookkeeping over a Redis-compatible store.
//!
//! `CoalescingMachine` groups task ids under coalescing keys in newest-first
//! queues and tracks which keys are active. A read-only HTTP view lives in
//! `web`; `coalesce_dst` checks the machine against a model under faults.

pub mod coalesce_dst;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod observability;
pub mod rng;
pub mod stats;
pub mod store;
pub mod web;

pub use coalescer::CoalescingMachine;
pub use config::{LogFormat, ServiceConfig};
pub use error::{ConfigError, StoreError};
pub use stats::{HashStatsSink, NoopStats, RecordingStats, StatEvent, StatsSink};
pub use store::{InMemoryStore, RedisUrl, RespStore, Store, StoreKeys};
