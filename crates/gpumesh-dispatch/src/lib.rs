//! gpumesh-dispatch: routes inference requests to GPU workers.
//!
//! - [`selector`]: loaded-model first, then any idle worker with a GPU
//! - [`Dispatcher`]: bounded selection, forward, one reselect-and-retry
//! - [`PredictRequest`]: request validation and `image_data` normalization
//! - [`WorkerSource`]: candidate workers, the registry in production
//! - [`DispatchStats`]: counters exported on `/metrics`

pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod selector;
pub mod source;
pub mod stats;

pub use dispatcher::{DispatchPhase, Dispatcher, WorkerResponse};
pub use error::{DispatchError, DispatchResult};
pub use payload::PredictRequest;
pub use selector::{Selection, SelectionReason};
pub use source::{ActiveWorkersFuture, WorkerSource};
pub use stats::{DispatchStats, StatsSnapshot};
