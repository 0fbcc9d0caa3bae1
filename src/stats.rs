//! Stats sinks notified by the coalescer after each mutation.
//!
//! Sinks are observability only. The coalescer logs and ignores sink
//! failures, so a broken sink never fails an insert or remove.

use crate::error::StoreError;
use crate::store::{Store, StoreFuture, StoreKeys};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatEvent {
    Insert,
    Remove,
}

impl StatEvent {
    /// Counter field name in the stats hash
    pub fn as_str(&self) -> &'static str {
        match self {
            StatEvent::Insert => "insert",
            StatEvent::Remove => "remove",
        }
    }
}

impl std::fmt::Display for StatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait StatsSink: Send + Sync + 'static {
    fn notify<'a>(
        &'a self,
        event: StatEvent,
        key: &'a str,
        task_id: &'a str,
    ) -> StoreFuture<'a, ()>;
}

/// Increments `<prefix>stats` counters, one field per event kind.
pub struct HashStatsSink {
    store: Arc<dyn Store>,
    stats_key: String,
}

impl HashStatsSink {
    pub fn new(store: Arc<dyn Store>, keys: &StoreKeys) -> Self {
        HashStatsSink {
            store,
            stats_key: keys.stats(),
        }
    }
}

impl StatsSink for HashStatsSink {
    fn notify<'a>(
        &'a self,
        event: StatEvent,
        _key: &'a str,
        _task_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.store
                .hincrby(&self.stats_key, event.as_str(), 1)
                .await?;
            Ok(())
        })
    }
}

/// One recorded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStat {
    pub event: StatEvent,
    pub key: String,
    pub task_id: String,
}

/// Records notifications in call order (for testing).
#[derive(Debug, Clone, Default)]
pub struct RecordingStats {
    events: Arc<Mutex<Vec<RecordedStat>>>,
    failing: bool,
}

impl RecordingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records and then reports a failure
    pub fn failing() -> Self {
        RecordingStats {
            events: Arc::default(),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<RecordedStat> {
        self.events.lock().clone()
    }
}

impl StatsSink for RecordingStats {
    fn notify<'a>(
        &'a self,
        event: StatEvent,
        key: &'a str,
        task_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.events.lock().push(RecordedStat {
                event,
                key: key.to_string(),
                task_id: task_id.to_string(),
            });
            if self.failing {
                return Err(StoreError::Injected("stats"));
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn notify<'a>(
        &'a self,
        _event: StatEvent,
        _key: &'a str,
        _task_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}
