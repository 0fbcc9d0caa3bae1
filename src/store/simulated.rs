//! Simulated store with fault injection
//!
//! DST-compatible wrapper: each call first rolls the seeded RNG and either
//! fails with `StoreError::Injected` without touching the inner store, or
//! forwards the call unchanged. Same seed, same faults.

use super::{Store, StoreFuture};
use crate::error::StoreError;
use crate::rng::DeterministicRng;
use parking_lot::Mutex;
use std::sync::Arc;

/// Per-operation failure probabilities
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    pub lpush_fail_prob: f64,
    pub lrem_fail_prob: f64,
    pub sadd_fail_prob: f64,
    pub srem_fail_prob: f64,
    pub hincrby_fail_prob: f64,
    /// Applies to LRANGE, SMEMBERS, HGETALL and PING
    pub read_fail_prob: f64,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            lpush_fail_prob: 0.01,   // 1%
            lrem_fail_prob: 0.01,    // 1%
            sadd_fail_prob: 0.01,    // 1%
            srem_fail_prob: 0.01,    // 1%
            hincrby_fail_prob: 0.02, // 2%
            read_fail_prob: 0.01,    // 1%
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            lpush_fail_prob: 0.10,
            lrem_fail_prob: 0.10,
            sadd_fail_prob: 0.10,
            srem_fail_prob: 0.10,
            hincrby_fail_prob: 0.20,
            read_fail_prob: 0.05,
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            lpush_fail_prob: 0.0,
            lrem_fail_prob: 0.0,
            sadd_fail_prob: 0.0,
            srem_fail_prob: 0.0,
            hincrby_fail_prob: 0.0,
            read_fail_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub attempts: u64,
    pub lpush_failures: u64,
    pub lrem_failures: u64,
    pub sadd_failures: u64,
    pub srem_failures: u64,
    pub hincrby_failures: u64,
    pub read_failures: u64,
}

impl SimulatedStoreStats {
    pub fn total_failures(&self) -> u64 {
        self.lpush_failures
            + self.lrem_failures
            + self.sadd_failures
            + self.srem_failures
            + self.hincrby_failures
            + self.read_failures
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    LPush,
    LRem,
    SAdd,
    SRem,
    HIncrBy,
    Read,
}

struct SimulatedStoreInner {
    rng: DeterministicRng,
    stats: SimulatedStoreStats,
}

/// Store wrapper that injects faults ahead of the wrapped store
pub struct SimulatedStore<S: Store> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

impl<S: Store> SimulatedStore<S> {
    pub fn new(inner_store: S, seed: u64, config: SimulatedStoreConfig) -> Self {
        SimulatedStore {
            inner_store,
            config,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng: DeterministicRng::new(seed),
                stats: SimulatedStoreStats::default(),
            })),
        }
    }

    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Roll for a fault; the lock is released before the inner call runs.
    fn check(&self, op: Op) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.stats.attempts += 1;

        let (prob, fault) = match op {
            Op::LPush => (self.config.lpush_fail_prob, "lpush"),
            Op::LRem => (self.config.lrem_fail_prob, "lrem"),
            Op::SAdd => (self.config.sadd_fail_prob, "sadd"),
            Op::SRem => (self.config.srem_fail_prob, "srem"),
            Op::HIncrBy => (self.config.hincrby_fail_prob, "hincrby"),
            Op::Read => (self.config.read_fail_prob, "read"),
        };

        if !state.rng.gen_bool(prob) {
            return Ok(());
        }

        let stats = &mut state.stats;
        match op {
            Op::LPush => stats.lpush_failures += 1,
            Op::LRem => stats.lrem_failures += 1,
            Op::SAdd => stats.sadd_failures += 1,
            Op::SRem => stats.srem_failures += 1,
            Op::HIncrBy => stats.hincrby_failures += 1,
            Op::Read => stats.read_failures += 1,
        }
        Err(StoreError::Injected(fault))
    }
}

impl<S: Store> Store for SimulatedStore<S> {
    fn lpush<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            self.check(Op::LPush)?;
            self.inner_store.lpush(key, value).await
        })
    }

    fn lrem<'a>(&'a self, key: &'a str, count: i64, value: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            self.check(Op::LRem)?;
            self.inner_store.lrem(key, count, value).await
        })
    }

    fn lrange<'a>(
        &'a self,
        key: &'a str,
        start: isize,
        stop: isize,
    ) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check(Op::Read)?;
            self.inner_store.lrange(key, start, stop).await
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.check(Op::SAdd)?;
            self.inner_store.sadd(key, member).await
        })
    }

    fn srem<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.check(Op::SRem)?;
            self.inner_store.srem(key, member).await
        })
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check(Op::Read)?;
            self.inner_store.smembers(key).await
        })
    }

    fn hincrby<'a>(&'a self, key: &'a str, field: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            self.check(Op::HIncrBy)?;
            self.inner_store.hincrby(key, field, delta).await
        })
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<(String, String)>> {
        Box::pin(async move {
            self.check(Op::Read)?;
            self.inner_store.hgetall(key).await
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check(Op::Read)?;
            self.inner_store.ping().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_no_faults_passes_through() {
        let store = SimulatedStore::new(InMemoryStore::new(), 1, SimulatedStoreConfig::no_faults());
        for i in 0..100 {
            store.lpush("q", &i.to_string()).await.unwrap();
        }
        assert_eq!(store.lrange("q", 0, -1).await.unwrap().len(), 100);
        assert_eq!(store.stats().total_failures(), 0);
        assert_eq!(store.stats().attempts, 101);
    }

    #[tokio::test]
    async fn test_injected_fault_skips_inner_store() {
        let config = SimulatedStoreConfig {
            sadd_fail_prob: 1.0,
            ..SimulatedStoreConfig::no_faults()
        };
        let store = SimulatedStore::new(InMemoryStore::new(), 3, config);
        let err = store.sadd("s", "k").await.unwrap_err();
        assert!(matches!(err, StoreError::Injected("sadd")));
        assert!(store.inner().is_empty());
        assert_eq!(store.stats().sadd_failures, 1);
    }

    #[tokio::test]
    async fn test_faults_are_reproducible() {
        async fn failure_pattern(seed: u64) -> Vec<bool> {
            let store =
                SimulatedStore::new(InMemoryStore::new(), seed, SimulatedStoreConfig::high_chaos());
            let mut pattern = Vec::new();
            for _ in 0..200 {
                pattern.push(store.lpush("q", "t").await.is_err());
            }
            pattern
        }

        let first = failure_pattern(42).await;
        assert_eq!(first, failure_pattern(42).await);
        assert!(first.iter().any(|failed| *failed), "high chaos should inject faults");
    }
}
