//! Dispatch error types.

use std::time::Duration;

use thiserror::Error;

/// Why a request could not be served by a worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Payload missing required fields or not a JSON object.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no suitable worker available for model {0}")]
    NoSuitableWorker(String),

    #[error("worker selection timed out after {0:?}")]
    SelectionTimeout(Duration),

    /// The worker answered with a non-2xx status, or could not be reached
    /// (`status` is `None`).
    #[error("worker {worker_id} failed: {detail}")]
    ForwardFailure {
        worker_id: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("worker {worker_id} did not respond within {timeout:?}")]
    ForwardTimeout { worker_id: String, timeout: Duration },

    #[error("internal dispatch error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Whether the failure came from the worker side of a forward.
    pub fn is_forward_error(&self) -> bool {
        matches!(
            self,
            DispatchError::ForwardFailure { .. } | DispatchError::ForwardTimeout { .. }
        )
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
