//! Worker record store: the map underneath the registry.
//!
//! Records are stored as `Arc<Worker>` and never mutated in place: a
//! write swaps in a new `Arc`, so a snapshot handed to a reader stays
//! consistent no matter what happens to the map afterwards. The map is
//! ordered by worker id, which makes snapshot iteration order stable.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::{Worker, WorkerId};

#[derive(Debug, Default)]
pub struct WorkerStore {
    records: RwLock<BTreeMap<WorkerId, Arc<Worker>>>,
}

impl WorkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Worker>> {
        self.records.read().await.get(id).cloned()
    }

    /// Insert or replace a record. Returns the previous one, if any.
    pub async fn put(&self, worker: Worker) -> Option<Arc<Worker>> {
        let mut records = self.records.write().await;
        records.insert(worker.id.clone(), Arc::new(worker))
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Worker>> {
        self.records.write().await.remove(id)
    }

    /// Remove a record only if `predicate` holds for its current value.
    ///
    /// The predicate runs under the write lock, so it sees the latest
    /// record rather than whatever a caller snapshotted earlier.
    pub async fn remove_if<F>(&self, id: &str, predicate: F) -> Option<Arc<Worker>>
    where
        F: FnOnce(&Worker) -> bool,
    {
        let mut records = self.records.write().await;
        let matched = records.get(id).is_some_and(|current| predicate(current));
        if matched { records.remove(id) } else { None }
    }

    /// Copy of every record, in id order.
    pub async fn snapshot(&self) -> Vec<Arc<Worker>> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_replaces_by_id() {
        let store = WorkerStore::new();
        assert!(store.put(Worker::new("w1", "10.0.0.1", 8000)).await.is_none());

        let prev = store.put(Worker::new("w1", "10.0.0.9", 8000)).await.unwrap();
        assert_eq!(prev.ip_address, "10.0.0.1");
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("w1").await.unwrap().ip_address, "10.0.0.9");
    }

    #[tokio::test]
    async fn snapshot_is_ordered_and_detached() {
        let store = WorkerStore::new();
        store.put(Worker::new("b", "10.0.0.2", 8000)).await;
        store.put(Worker::new("a", "10.0.0.1", 8000)).await;

        let snap = store.snapshot().await;
        let ids: Vec<_> = snap.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        store.remove("a").await;
        assert_eq!(snap.len(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_if_checks_current_record() {
        let store = WorkerStore::new();
        store.put(Worker::new("w1", "10.0.0.1", 8000)).await;

        assert!(store.remove_if("w1", |w| w.port == 1).await.is_none());
        assert!(store.remove_if("w1", |w| w.port == 8000).await.is_some());
        assert!(store.is_empty().await);
        assert!(store.remove_if("w1", |_| true).await.is_none());
    }
}
