//! Registry error types.

use thiserror::Error;

/// Errors surfaced by registry validation.
///
/// Only records that could not be dispatched to are refused. Register
/// replaces, heartbeats for unknown ids self-register, and removing an
/// absent worker is a no-op.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid worker record: {0}")]
    InvalidRecord(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
