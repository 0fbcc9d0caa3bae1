//! In-memory store for unit tests and deterministic simulation

use super::data::{HashValue, ListValue, SetValue, Value};
use super::{Store, StoreFuture};
use crate::error::StoreError;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared in-memory keyspace. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<AHashMap<String, Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            data: Arc::new(RwLock::new(AHashMap::new())),
        }
    }

    /// Number of keys currently stored (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn with_list<R>(
        &self,
        key: &str,
        create: bool,
        f: impl FnOnce(&mut ListValue) -> R,
    ) -> Result<Option<R>, StoreError> {
        let mut data = self.data.write();
        if create {
            data.entry(key.to_string())
                .or_insert_with(|| Value::List(ListValue::new()));
        }
        let result = match data.get_mut(key) {
            Some(Value::List(l)) => Some(f(l)),
            Some(_) => return Err(StoreError::wrong_type()),
            None => None,
        };
        remove_if_empty(&mut data, key);
        Ok(result)
    }

    fn with_set<R>(
        &self,
        key: &str,
        create: bool,
        f: impl FnOnce(&mut SetValue) -> R,
    ) -> Result<Option<R>, StoreError> {
        let mut data = self.data.write();
        if create {
            data.entry(key.to_string())
                .or_insert_with(|| Value::Set(SetValue::new()));
        }
        let result = match data.get_mut(key) {
            Some(Value::Set(s)) => Some(f(s)),
            Some(_) => return Err(StoreError::wrong_type()),
            None => None,
        };
        remove_if_empty(&mut data, key);
        Ok(result)
    }

    fn read_value<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&Value>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let data = self.data.read();
        f(data.get(key))
    }
}

fn remove_if_empty(data: &mut AHashMap<String, Value>, key: &str) {
    if data.get(key).is_some_and(Value::is_empty) {
        data.remove(key);
    }
}

impl Store for InMemoryStore {
    fn lpush<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let len = self.with_list(key, true, |l| l.lpush(value.to_string()))?;
            Ok(len.unwrap_or(0))
        })
    }

    fn lrem<'a>(&'a self, key: &'a str, count: i64, value: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let removed = self.with_list(key, false, |l| l.remove_matching(count, value))?;
            Ok(removed.unwrap_or(0))
        })
    }

    fn lrange<'a>(
        &'a self,
        key: &'a str,
        start: isize,
        stop: isize,
    ) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.read_value(key, |value| match value {
                Some(Value::List(l)) => Ok(l.range(start, stop)),
                Some(_) => Err(StoreError::wrong_type()),
                None => Ok(Vec::new()),
            })
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let added = self.with_set(key, true, |s| s.add(member))?;
            Ok(added.unwrap_or(false))
        })
    }

    fn srem<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let removed = self.with_set(key, false, |s| s.remove(member))?;
            Ok(removed.unwrap_or(false))
        })
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.read_value(key, |value| match value {
                Some(Value::Set(s)) => Ok(s.members()),
                Some(_) => Err(StoreError::wrong_type()),
                None => Ok(Vec::new()),
            })
        })
    }

    fn hincrby<'a>(&'a self, key: &'a str, field: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let mut data = self.data.write();
            let value = data
                .entry(key.to_string())
                .or_insert_with(|| Value::Hash(HashValue::new()));
            let result = match value {
                Value::Hash(h) => h.incr_by(field, delta).map_err(StoreError::Server),
                _ => Err(StoreError::wrong_type()),
            };
            remove_if_empty(&mut data, key);
            result
        })
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<(String, String)>> {
        Box::pin(async move {
            self.read_value(key, |value| match value {
                Some(Value::Hash(h)) => Ok(h.entries()),
                Some(_) => Err(StoreError::wrong_type()),
                None => Ok(Vec::new()),
            })
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_round_trip_newest_first() {
        let store = InMemoryStore::new();
        store.lpush("q", "a").await.unwrap();
        store.lpush("q", "b").await.unwrap();
        assert_eq!(store.lrange("q", 0, -1).await.unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_list_is_deleted() {
        let store = InMemoryStore::new();
        store.lpush("q", "a").await.unwrap();
        assert_eq!(store.lrem("q", 0, "a").await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_keys_read_as_empty() {
        let store = InMemoryStore::new();
        assert!(store.lrange("nope", 0, -1).await.unwrap().is_empty());
        assert!(store.smembers("nope").await.unwrap().is_empty());
        assert!(store.hgetall("nope").await.unwrap().is_empty());
        assert_eq!(store.lrem("nope", 0, "x").await.unwrap(), 0);
        assert!(!store.srem("nope", "x").await.unwrap());
        assert!(store.is_empty(), "reads and no-op removes must not create keys");
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let store = InMemoryStore::new();
        store.sadd("k", "member").await.unwrap();
        let err = store.lpush("k", "v").await.unwrap_err();
        assert!(matches!(err, StoreError::Server(ref msg) if msg.starts_with("WRONGTYPE")));
        assert!(store.hincrby("k", "f", 1).await.is_err());
        assert_eq!(store.smembers("k").await.unwrap(), vec!["member"]);
    }

    #[tokio::test]
    async fn test_hincrby_accumulates() {
        let store = InMemoryStore::new();
        assert_eq!(store.hincrby("h", "insert", 1).await.unwrap(), 1);
        assert_eq!(store.hincrby("h", "insert", 2).await.unwrap(), 3);
        assert_eq!(
            store.hgetall("h").await.unwrap(),
            vec![("insert".to_string(), "3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.sadd("s", "a").await.unwrap();
        assert_eq!(other.smembers("s").await.unwrap(), vec!["a"]);
    }
}
