//! Registry: concurrency-safe membership over the worker store.
//!
//! Register and update share a mutation lock; remove and sweep share a
//! separate cleanup lock, so a registration never queues behind an
//! eviction pass. Both only hold the store's write lock for a single
//! insert or removal. Reads copy a snapshot and filter it lock-free.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::RegistryResult;
use crate::liveness::Liveness;
use crate::store::WorkerStore;
use crate::types::{UpdateContext, Worker, WorkerId, WorkerUpdate};

/// What a heartbeat did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// An existing record was updated in place.
    Merged,
    /// The worker was unknown and has been registered from the update.
    Registered,
}

struct Inner {
    store: WorkerStore,
    mutation: Mutex<()>,
    cleanup: Mutex<()>,
    liveness: Liveness,
}

/// In-memory worker registry.
///
/// Cheap to clone; all clones share the same records. Nothing is
/// persisted across restarts.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: WorkerStore::new(),
                mutation: Mutex::new(()),
                cleanup: Mutex::new(()),
                liveness: Liveness::new(heartbeat_timeout),
            }),
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.inner.liveness.timeout()
    }

    pub fn liveness(&self) -> Liveness {
        self.inner.liveness
    }

    /// Insert a worker, replacing any record with the same id.
    pub async fn register(&self, worker: Worker) {
        let _guard = self.inner.mutation.lock().await;
        let id = worker.id.clone();
        let endpoint = worker.endpoint();
        match self.inner.store.put(worker).await {
            Some(_) => info!(worker_id = %id, %endpoint, "worker re-registered"),
            None => info!(worker_id = %id, %endpoint, "worker registered"),
        }
    }

    /// Apply a heartbeat.
    ///
    /// Known workers get a field-wise merge. Unknown workers are
    /// registered from the update, with `ctx` filling in the address.
    /// A result that could not be dispatched to is rejected and the
    /// stored record is left as it was.
    pub async fn update(
        &self,
        id: &str,
        update: WorkerUpdate,
        ctx: &UpdateContext,
    ) -> RegistryResult<UpdateOutcome> {
        let _guard = self.inner.mutation.lock().await;
        match self.inner.store.get(id).await {
            Some(current) => {
                let merged = current.merged(&update);
                merged.validate()?;
                self.inner.store.put(merged).await;
                debug!(worker_id = %id, "heartbeat merged");
                Ok(UpdateOutcome::Merged)
            }
            None => {
                let worker = update.into_worker(id, ctx);
                worker.validate()?;
                let endpoint = worker.endpoint();
                self.inner.store.put(worker).await;
                info!(worker_id = %id, %endpoint, "heartbeat from unknown worker, registered");
                Ok(UpdateOutcome::Registered)
            }
        }
    }

    /// Delete a worker. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let _guard = self.inner.cleanup.lock().await;
        match self.inner.store.remove(id).await {
            Some(_) => {
                info!(worker_id = %id, "worker removed");
                true
            }
            None => {
                warn!(worker_id = %id, "remove requested for unknown worker");
                false
            }
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Arc<Worker>> {
        self.inner.store.get(id).await
    }

    /// Workers whose heartbeat is younger than the timeout, in id order.
    pub async fn list_active(&self) -> Vec<Arc<Worker>> {
        self.list_active_at(Utc::now()).await
    }

    pub async fn list_active_at(&self, now: DateTime<Utc>) -> Vec<Arc<Worker>> {
        let liveness = self.inner.liveness;
        let mut snapshot = self.inner.store.snapshot().await;
        snapshot.retain(|w| liveness.is_active(w, now));
        snapshot
    }

    /// Every stored record, stale ones included.
    pub async fn list_all(&self) -> Vec<Arc<Worker>> {
        self.inner.store.snapshot().await
    }

    /// Number of stored records, stale ones included.
    pub async fn len(&self) -> usize {
        self.inner.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.store.is_empty().await
    }

    /// Evict stale workers. Returns the evicted ids.
    pub async fn sweep(&self) -> Vec<WorkerId> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<WorkerId> {
        let _guard = self.inner.cleanup.lock().await;
        let liveness = self.inner.liveness;

        let candidates: Vec<WorkerId> = self
            .inner
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|w| liveness.is_stale(w, now))
            .map(|w| w.id.clone())
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for id in candidates {
            // A heartbeat may have landed since the snapshot.
            let removed = self
                .inner
                .store
                .remove_if(&id, |current| liveness.is_stale(current, now))
                .await;
            if let Some(worker) = removed {
                warn!(
                    worker_id = %id,
                    last_heartbeat = %worker.last_heartbeat,
                    "evicted stale worker"
                );
                evicted.push(id);
            }
        }
        evicted
    }

    /// Run a sweep on a background task without waiting for it.
    pub fn spawn_sweep(&self) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let evicted = registry.sweep().await;
            if !evicted.is_empty() {
                debug!(count = evicted.len(), "background sweep evicted workers");
            }
        })
    }
}
