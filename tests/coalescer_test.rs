//! Coalescer behaviour tests against the in-memory store.

use coalesce::{CoalescingMachine, InMemoryStore, RecordingStats, StatEvent, Store};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;

const PREFIX: &str = "testing.prefix.";

struct Fixture {
    machine: CoalescingMachine,
    store: InMemoryStore,
    stats: RecordingStats,
}

impl Fixture {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let stats = RecordingStats::new();
        let machine =
            CoalescingMachine::new(PREFIX, Arc::new(store.clone()), Arc::new(stats.clone()));
        Fixture {
            machine,
            store,
            stats,
        }
    }

    fn queue_key(key: &str) -> String {
        format!("{}lists.{}", PREFIX, key)
    }

    fn key_set() -> String {
        format!("{}list_keys", PREFIX)
    }

    async fn queue(&self, key: &str) -> Vec<String> {
        self.store.lrange(&Self::queue_key(key), 0, -1).await.unwrap()
    }

    async fn tracked(&self) -> BTreeSet<String> {
        self.store
            .smembers(&Self::key_set())
            .await
            .unwrap()
            .into_iter()
            .collect()
    }
}

fn set_of(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

// =============================================================================
// Insert
// =============================================================================

#[tokio::test]
async fn test_insert_single_task() {
    let f = Fixture::new();
    f.machine.insert_task("taskId1", "key").await.unwrap();
    assert_eq!(f.queue("key").await, vec!["taskId1"]);
}

#[tokio::test]
async fn test_insert_is_newest_first() {
    let f = Fixture::new();
    for task in ["taskId1", "taskId2", "taskId3"] {
        f.machine.insert_task(task, "key").await.unwrap();
    }
    assert_eq!(f.queue("key").await, vec!["taskId3", "taskId2", "taskId1"]);
}

#[tokio::test]
async fn test_insert_tracks_each_key() {
    let f = Fixture::new();
    for key in ["sample_key1", "sample_key2", "sample_key3"] {
        f.machine.insert_task("taskId1", key).await.unwrap();
    }
    assert_eq!(
        f.tracked().await,
        set_of(&["sample_key1", "sample_key2", "sample_key3"])
    );
}

#[tokio::test]
async fn test_insert_already_tracked_key_is_idempotent() {
    let f = Fixture::new();
    f.store.sadd(&Fixture::key_set(), "sample_key1").await.unwrap();
    f.machine.insert_task("taskId1", "sample_key1").await.unwrap();
    f.machine.insert_task("taskId2", "sample_key1").await.unwrap();

    let members = f.store.smembers(&Fixture::key_set()).await.unwrap();
    assert_eq!(members, vec!["sample_key1"]);
}

#[tokio::test]
async fn test_insert_keeps_duplicates() {
    let f = Fixture::new();
    f.machine.insert_task("same", "key").await.unwrap();
    f.machine.insert_task("same", "key").await.unwrap();
    assert_eq!(f.queue("key").await, vec!["same", "same"]);
}

// =============================================================================
// Remove
// =============================================================================

#[tokio::test]
async fn test_remove_only_task_empties_queue() {
    let f = Fixture::new();
    f.store.lpush(&Fixture::queue_key("key"), "taskId").await.unwrap();
    f.machine.remove_task("taskId", "key").await.unwrap();
    assert!(f.queue("key").await.is_empty());
}

#[tokio::test]
async fn test_remove_middle_task_preserves_order() {
    let f = Fixture::new();
    for task in ["taskId1", "taskId2", "taskId3"] {
        f.store.lpush(&Fixture::queue_key("key"), task).await.unwrap();
    }
    f.machine.remove_task("taskId2", "key").await.unwrap();
    assert_eq!(f.queue("key").await, vec!["taskId3", "taskId1"]);
}

#[tokio::test]
async fn test_remove_untracks_only_that_key() {
    let f = Fixture::new();
    for key in ["sample_key1", "sample_key2", "sample_key3"] {
        f.store.sadd(&Fixture::key_set(), key).await.unwrap();
    }
    f.machine.remove_task("taskId1", "sample_key2").await.unwrap();
    assert_eq!(f.tracked().await, set_of(&["sample_key1", "sample_key3"]));
}

#[tokio::test]
async fn test_remove_from_unknown_key_succeeds() {
    let f = Fixture::new();
    f.machine.remove_task("taskId", "key").await.unwrap();
    assert!(f.queue("key").await.is_empty());
    assert!(f.tracked().await.is_empty());
}

#[tokio::test]
async fn test_remove_unknown_task_still_untracks_key() {
    let f = Fixture::new();
    f.machine.insert_task("present", "sample_key").await.unwrap();
    f.machine.remove_task("absent", "sample_key").await.unwrap();

    assert_eq!(f.queue("sample_key").await, vec!["present"]);
    assert!(f.tracked().await.is_empty());
}

#[tokio::test]
async fn test_remove_drops_all_duplicates() {
    let f = Fixture::new();
    for task in ["x", "y", "x", "x"] {
        f.machine.insert_task(task, "key").await.unwrap();
    }
    f.machine.remove_task("x", "key").await.unwrap();
    assert_eq!(f.queue("key").await, vec!["y"]);
}

// =============================================================================
// Stats
// =============================================================================

#[tokio::test]
async fn test_stats_events_follow_call_order() {
    let f = Fixture::new();
    f.machine.insert_task("a", "k1").await.unwrap();
    f.machine.insert_task("b", "k2").await.unwrap();
    f.machine.remove_task("a", "k1").await.unwrap();

    let events: Vec<(StatEvent, String, String)> = f
        .stats
        .events()
        .into_iter()
        .map(|e| (e.event, e.key, e.task_id))
        .collect();
    assert_eq!(
        events,
        vec![
            (StatEvent::Insert, "k1".to_string(), "a".to_string()),
            (StatEvent::Insert, "k2".to_string(), "b".to_string()),
            (StatEvent::Remove, "k1".to_string(), "a".to_string()),
        ]
    );
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_inserts_are_all_recorded() {
    let f = Fixture::new();
    let calls = (0..50).map(|i| {
        let machine = f.machine.clone();
        async move {
            let key = format!("key{}", i % 5);
            machine.insert_task(&format!("task{}", i), &key).await
        }
    });
    for outcome in join_all(calls).await {
        outcome.unwrap();
    }

    assert_eq!(
        f.tracked().await,
        set_of(&["key0", "key1", "key2", "key3", "key4"])
    );
    let mut total = 0;
    for i in 0..5 {
        total += f.queue(&format!("key{}", i)).await.len();
    }
    assert_eq!(total, 50);
    assert_eq!(f.stats.events().len(), 50);
}

#[test]
fn test_machine_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync + Clone>() {}
    assert_send_sync::<CoalescingMachine>();
}
