//! Where the dispatcher gets its candidate workers from.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gpumesh_registry::{Registry, Worker};

/// Boxed future returned by [`WorkerSource::active_workers`].
pub type ActiveWorkersFuture<'a> = Pin<Box<dyn Future<Output = Vec<Arc<Worker>>> + Send + 'a>>;

/// Live workers eligible for selection, injected so selection can be
/// driven without a real registry.
pub trait WorkerSource: Send + Sync {
    fn active_workers(&self) -> ActiveWorkersFuture<'_>;
}

impl WorkerSource for Registry {
    fn active_workers(&self) -> ActiveWorkersFuture<'_> {
        Box::pin(self.list_active())
    }
}
