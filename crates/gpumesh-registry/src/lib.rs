//! gpumesh-registry: in-memory membership for GPU workers.
//!
//! Workers register once, heartbeat periodically, and drop out of
//! dispatch consideration as soon as their last heartbeat is older than
//! the configured timeout. A background [`Sweeper`] physically removes
//! stale records later; reads never depend on it having run.
//!
//! # Architecture
//!
//! ```text
//! Registry (Clone, Arc<Inner>)
//!   ├── WorkerStore   RwLock<BTreeMap<id, Arc<Worker>>>
//!   ├── mutation lock register / update
//!   ├── cleanup lock  remove / sweep
//!   └── Liveness      now - last_heartbeat < timeout
//! ```

pub mod error;
pub mod liveness;
pub mod registry;
pub mod store;
pub mod sweeper;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use liveness::Liveness;
pub use registry::{Registry, UpdateOutcome};
pub use store::WorkerStore;
pub use sweeper::Sweeper;
pub use types::{
    Capabilities, GpuInfo, UpdateContext, Worker, WorkerId, WorkerStatus, WorkerUpdate,
};
