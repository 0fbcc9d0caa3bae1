//! Deterministic Simulation Testing for the coalescer
//!
//! VOPR-style harness for `CoalescingMachine` that enables:
//! - Deterministic random insert/remove generation over a small universe
//! - Cross-checking the store against a reference model after each operation
//! - Optional fault injection through `SimulatedStore`
//! - Seed-based reproducibility for debugging

use crate::coalescer::CoalescingMachine;
use crate::error::StoreError;
use crate::rng::DeterministicRng;
use crate::stats::HashStatsSink;
use crate::store::{InMemoryStore, SimulatedStore, SimulatedStoreConfig, Store, StoreKeys};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const DST_PREFIX: &str = "dst.";

/// Configuration for coalescer DST
#[derive(Debug, Clone)]
pub struct CoalesceDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of distinct coalescing keys
    pub num_keys: usize,
    /// Number of distinct task ids
    pub num_tasks: usize,
    /// Probability of remove (vs insert)
    pub remove_prob: f64,
    /// Probability that a remove targets a task actually queued under the key
    pub targeted_remove_prob: f64,
    /// Fault injection; `None` runs directly against the in-memory store
    pub faults: Option<SimulatedStoreConfig>,
}

impl Default for CoalesceDSTConfig {
    fn default() -> Self {
        CoalesceDSTConfig {
            seed: 0,
            num_keys: 5,
            num_tasks: 20,
            remove_prob: 0.3,
            targeted_remove_prob: 0.7,
            faults: None,
        }
    }
}

impl CoalesceDSTConfig {
    pub fn new(seed: u64) -> Self {
        CoalesceDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Few tasks, so duplicates within a queue are common
    pub fn duplicate_heavy(seed: u64) -> Self {
        CoalesceDSTConfig {
            seed,
            num_keys: 2,
            num_tasks: 4,
            remove_prob: 0.35,
            ..Default::default()
        }
    }

    /// Default mix with 1% store faults
    pub fn with_faults(seed: u64) -> Self {
        CoalesceDSTConfig {
            seed,
            faults: Some(SimulatedStoreConfig::default()),
            ..Default::default()
        }
    }

    /// Default mix with 10-20% store faults
    pub fn high_chaos(seed: u64) -> Self {
        CoalesceDSTConfig {
            seed,
            faults: Some(SimulatedStoreConfig::high_chaos()),
            ..Default::default()
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum CoalesceOp {
    Insert { task_id: String, key: String },
    Remove { task_id: String, key: String },
}

/// Result of a coalescer DST run
#[derive(Debug, Clone)]
pub struct CoalesceDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub inserts: u64,
    pub removes: u64,
    pub failed_inserts: u64,
    pub failed_removes: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<CoalesceOp>,
}

impl CoalesceDSTResult {
    pub fn new(seed: u64) -> Self {
        CoalesceDSTResult {
            seed,
            total_operations: 0,
            inserts: 0,
            removes: 0,
            failed_inserts: 0,
            failed_removes: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (insert:{}, remove:{}, failed insert:{}, failed remove:{}), {} violations",
            self.seed,
            self.total_operations,
            self.inserts,
            self.removes,
            self.failed_inserts,
            self.failed_removes,
            self.invariant_violations.len()
        )
    }
}

/// Reference model of what the store must contain
#[derive(Debug, Default)]
struct Model {
    /// Newest-first queues; empty queues are not stored
    queues: BTreeMap<String, Vec<String>>,
    tracked: BTreeSet<String>,
}

impl Model {
    fn push(&mut self, key: &str, task_id: &str) {
        self.queues
            .entry(key.to_string())
            .or_default()
            .insert(0, task_id.to_string());
    }

    fn remove_all(&mut self, key: &str, task_id: &str) {
        if let Some(queue) = self.queues.get_mut(key) {
            queue.retain(|t| t != task_id);
            if queue.is_empty() {
                self.queues.remove(key);
            }
        }
    }
}

/// DST harness for `CoalescingMachine`
pub struct CoalesceDSTHarness {
    config: CoalesceDSTConfig,
    rng: DeterministicRng,
    machine: CoalescingMachine,
    /// Unfaulted view of the data for invariant checks
    inner: InMemoryStore,
    keys: StoreKeys,
    model: Model,
    result: CoalesceDSTResult,
}

impl CoalesceDSTHarness {
    pub fn new(config: CoalesceDSTConfig) -> Self {
        let inner = InMemoryStore::new();
        let keys = StoreKeys::new(DST_PREFIX);
        let store: Arc<dyn Store> = match &config.faults {
            Some(faults) => Arc::new(SimulatedStore::new(
                inner.clone(),
                config.seed.wrapping_add(1),
                faults.clone(),
            )),
            None => Arc::new(inner.clone()),
        };
        let stats = Arc::new(HashStatsSink::new(store.clone(), &keys));

        CoalesceDSTHarness {
            rng: DeterministicRng::new(config.seed),
            machine: CoalescingMachine::new(DST_PREFIX, store, stats),
            inner,
            keys,
            model: Model::default(),
            result: CoalesceDSTResult::new(config.seed),
            config,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(CoalesceDSTConfig::new(seed))
    }

    fn random_key(&mut self) -> String {
        let idx = self.rng.gen_range(0, self.config.num_keys as u64);
        format!("key:{}", idx)
    }

    fn random_task(&mut self) -> String {
        let idx = self.rng.gen_range(0, self.config.num_tasks as u64);
        format!("task:{}", idx)
    }

    fn pick_remove_target(&mut self, key: &str) -> String {
        let queued = self.model.queues.get(key).map(|q| q.len()).unwrap_or(0);
        if queued > 0 && self.rng.gen_bool(self.config.targeted_remove_prob) {
            let idx = self.rng.gen_range(0, queued as u64) as usize;
            self.model.queues[key][idx].clone()
        } else {
            self.random_task()
        }
    }

    async fn run_single_op(&mut self) {
        let key = self.random_key();
        let remove = self.rng.gen_bool(self.config.remove_prob);

        let outcome = if remove {
            let task_id = self.pick_remove_target(&key);
            self.result.last_op = Some(CoalesceOp::Remove {
                task_id: task_id.clone(),
                key: key.clone(),
            });
            let outcome = self.machine.remove_task(&task_id, &key).await;
            self.apply_remove(&task_id, &key, &outcome);
            outcome
        } else {
            let task_id = self.random_task();
            self.result.last_op = Some(CoalesceOp::Insert {
                task_id: task_id.clone(),
                key: key.clone(),
            });
            let outcome = self.machine.insert_task(&task_id, &key).await;
            self.apply_insert(&task_id, &key, &outcome);
            outcome
        };

        self.result.total_operations += 1;

        let checked = match self.check_invariants().await {
            Ok(()) => self.check_post_remove(remove, &key, &outcome).await,
            Err(e) => Err(e),
        };
        if let Err(violation) = checked {
            self.result.invariant_violations.push(format!(
                "Op #{}: {:?} - {}",
                self.result.total_operations, self.result.last_op, violation
            ));
        }
    }

    /// Mirror into the model exactly the steps that ran before any fault.
    fn apply_insert(&mut self, task_id: &str, key: &str, outcome: &Result<(), StoreError>) {
        match outcome {
            Ok(()) => {
                self.result.inserts += 1;
                self.model.push(key, task_id);
                self.model.tracked.insert(key.to_string());
            }
            Err(StoreError::Injected("sadd")) => {
                self.result.failed_inserts += 1;
                self.model.push(key, task_id);
            }
            Err(_) => self.result.failed_inserts += 1,
        }
    }

    fn apply_remove(&mut self, task_id: &str, key: &str, outcome: &Result<(), StoreError>) {
        match outcome {
            Ok(()) => {
                self.result.removes += 1;
                self.model.remove_all(key, task_id);
                self.model.tracked.remove(key);
            }
            Err(StoreError::Injected("srem")) => {
                self.result.failed_removes += 1;
                self.model.remove_all(key, task_id);
            }
            Err(_) => self.result.failed_removes += 1,
        }
    }

    async fn check_invariants(&self) -> Result<(), String> {
        // Invariant 1: every queue matches the model, newest-first
        for idx in 0..self.config.num_keys {
            let key = format!("key:{}", idx);
            let actual = self
                .inner
                .lrange(&self.keys.queue(&key), 0, -1)
                .await
                .map_err(|e| format!("LRANGE failed: {}", e))?;
            let expected = self.model.queues.get(&key).cloned().unwrap_or_default();
            if actual != expected {
                return Err(format!(
                    "Queue mismatch for {}: actual={:?}, expected={:?}",
                    key, actual, expected
                ));
            }
        }

        // Invariant 2: key set has no duplicates and matches the model
        let members = self
            .inner
            .smembers(&self.keys.key_set())
            .await
            .map_err(|e| format!("SMEMBERS failed: {}", e))?;
        let unique: BTreeSet<String> = members.iter().cloned().collect();
        if unique.len() != members.len() {
            return Err(format!("Key set contains duplicates: {:?}", members));
        }
        if unique != self.model.tracked {
            return Err(format!(
                "Key set mismatch: actual={:?}, expected={:?}",
                unique, self.model.tracked
            ));
        }

        Ok(())
    }

    /// Invariant 3: a successful remove always leaves the key untracked
    async fn check_post_remove(
        &self,
        was_remove: bool,
        key: &str,
        outcome: &Result<(), StoreError>,
    ) -> Result<(), String> {
        if !was_remove || outcome.is_err() {
            return Ok(());
        }
        let members = self
            .inner
            .smembers(&self.keys.key_set())
            .await
            .map_err(|e| format!("SMEMBERS failed: {}", e))?;
        if members.iter().any(|m| m == key) {
            return Err(format!("Key {} still tracked after remove", key));
        }
        Ok(())
    }

    pub async fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.run_single_op().await;
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &CoalesceDSTResult {
        &self.result
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.inner
    }
}

/// Run a batch of DST tests
pub async fn run_coalesce_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> CoalesceDSTConfig,
) -> Vec<CoalesceDSTResult> {
    let mut results = Vec::with_capacity(num_seeds);
    for i in 0..num_seeds {
        let seed = start_seed + i as u64;
        let mut harness = CoalesceDSTHarness::new(config_fn(seed));
        harness.run(ops_per_seed).await;
        results.push(harness.result().clone());
    }
    results
}

/// Summarize batch results
pub fn summarize_coalesce_batch(results: &[CoalesceDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let total_faults: u64 = results
        .iter()
        .map(|r| r.failed_inserts + r.failed_removes)
        .sum();

    let mut summary = format!(
        "Coalesce DST Summary\n\
         ====================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {} ({} failed by injected faults)\n",
        total, passed, failed, total_ops, total_faults
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
