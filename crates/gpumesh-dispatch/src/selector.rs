//! Worker selection policy.
//!
//! Pure functions over a snapshot of active workers. The snapshot comes
//! from the registry in worker-id order, so the first match is stable
//! for a given membership.

use std::fmt;
use std::sync::Arc;

use gpumesh_registry::{Worker, WorkerStatus};

/// Why a worker was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// The requested model is already loaded on the worker.
    LoadedModel,
    /// Fallback: an idle worker with a usable GPU.
    GpuCapability,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::LoadedModel => f.write_str("loaded_model"),
            SelectionReason::GpuCapability => f.write_str("gpu_capability"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub worker: Arc<Worker>,
    pub reason: SelectionReason,
}

/// Pick a worker for `model` from `active`.
///
/// 1. first worker with `model` loaded
/// 2. else first worker reporting `active` with a GPU present
/// 3. else none
pub fn select(active: &[Arc<Worker>], model: &str) -> Option<Selection> {
    select_excluding(active, model, None)
}

/// Like [`select`], but skips `exclude`.
pub fn select_excluding(
    active: &[Arc<Worker>],
    model: &str,
    exclude: Option<&str>,
) -> Option<Selection> {
    let eligible = |w: &&Arc<Worker>| exclude != Some(w.id.as_str());

    if let Some(w) = active.iter().filter(eligible).find(|w| w.has_model(model)) {
        return Some(Selection {
            worker: Arc::clone(w),
            reason: SelectionReason::LoadedModel,
        });
    }

    active
        .iter()
        .filter(eligible)
        .find(|w| w.status == WorkerStatus::Active && w.gpu_info.is_present())
        .map(|w| Selection {
            worker: Arc::clone(w),
            reason: SelectionReason::GpuCapability,
        })
}

/// Reselection after a failed forward to `failed`.
///
/// Another qualifying worker wins; `failed` itself is only returned
/// when it is the sole candidate.
pub fn reselect(active: &[Arc<Worker>], model: &str, failed: &str) -> Option<Selection> {
    select_excluding(active, model, Some(failed)).or_else(|| select(active, model))
}
