//! Queue and key-set bookkeeping for coalesced tasks.
//!
//! `CoalescingMachine` is the only writer of the queues and the key set.
//! Each operation is two independent store commands followed by a stats
//! notification:
//!
//! | operation     | step 1                         | step 2                      |
//! |---------------|--------------------------------|-----------------------------|
//! | `insert_task` | `LPUSH <p>lists.<key> task`    | `SADD <p>list_keys key`     |
//! | `remove_task` | `LREM <p>lists.<key> 0 task`   | `SREM <p>list_keys key`     |
//!
//! The steps are not transactional. A failure in step 2, or a concurrent
//! call on the same key, can leave the key set disagreeing with the queue.
//!
//! `remove_task` untracks the key unconditionally, even when other tasks are
//! still queued under it: the listener drains a whole group at once and one
//! remove marks the group as drained.

use crate::error::StoreError;
use crate::stats::{StatEvent, StatsSink};
use crate::store::{Store, StoreKeys};
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// LREM count: remove every entry equal to the task id.
const REMOVE_ALL_MATCHES: i64 = 0;

#[derive(Clone)]
pub struct CoalescingMachine {
    keys: StoreKeys,
    store: Arc<dyn Store>,
    stats: Arc<dyn StatsSink>,
}

impl CoalescingMachine {
    pub fn new(prefix: impl Into<String>, store: Arc<dyn Store>, stats: Arc<dyn StatsSink>) -> Self {
        CoalescingMachine {
            keys: StoreKeys::new(prefix),
            store,
            stats,
        }
    }

    /// Prepend `task_id` to the queue for `key` and mark `key` as tracked.
    ///
    /// Duplicates are kept. A store error aborts the call at the failing
    /// step and is returned as-is; earlier steps are not rolled back.
    pub async fn insert_task(&self, task_id: &str, key: &str) -> Result<(), StoreError> {
        let span = tracing::debug_span!("coalesce.insert", key, task_id);
        async {
            let queue_len = self.store.lpush(&self.keys.queue(key), task_id).await?;
            let newly_tracked = self.store.sadd(&self.keys.key_set(), key).await?;

            // TigerStyle: Postcondition - the queue can't be empty after a push
            debug_assert!(queue_len >= 1, "Postcondition violated: queue empty after LPUSH");

            debug!(queue_len, newly_tracked, "Task queued");
            self.notify(StatEvent::Insert, key, task_id).await;
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Remove every occurrence of `task_id` from the queue for `key` and
    /// untrack `key`, whatever is left in its queue.
    ///
    /// Valid for keys and tasks that were never inserted.
    pub async fn remove_task(&self, task_id: &str, key: &str) -> Result<(), StoreError> {
        let span = tracing::debug_span!("coalesce.remove", key, task_id);
        async {
            let removed = self
                .store
                .lrem(&self.keys.queue(key), REMOVE_ALL_MATCHES, task_id)
                .await?;
            let was_tracked = self.store.srem(&self.keys.key_set(), key).await?;

            debug!(removed, was_tracked, "Task removed");
            self.notify(StatEvent::Remove, key, task_id).await;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn notify(&self, event: StatEvent, key: &str, task_id: &str) {
        if let Err(e) = self.stats.notify(event, key, task_id).await {
            warn!(%event, error = %e, "Stats sink failed");
        }
    }
}

impl std::fmt::Debug for CoalescingMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingMachine")
            .field("prefix", &self.keys.prefix())
            .finish()
    }
}
