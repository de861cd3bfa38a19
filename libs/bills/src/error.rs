//! Errors surfaced by the bill core

use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Error, Debug)]
pub enum BillError {
    /// Input fields were malformed or out of range
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// The referenced bill or user does not exist
    #[error("{0}")]
    NotFound(String),

    /// The acting user may not perform this operation on the bill
    #[error("{0}")]
    AccessDenied(String),

    /// The bill changed since the revision the caller based its update on
    #[error("{0}")]
    Conflict(String),

    /// The storage backend failed
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type BillResult<T> = Result<T, BillError>;
