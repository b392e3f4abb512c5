//! Engine error type
//!
//! "No match" and "no duplicates" are ordinary outcomes, not errors. Only
//! collaborator failures, cancellation and bad configuration end up here.

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Duplicate scan stopped between buckets; no partial plan was produced
    #[error("scan cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
