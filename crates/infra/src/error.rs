use std::time::Duration;

use thiserror::Error;

use agristock_core::DomainError;

/// Stock ledger operation error.
///
/// Domain failures (validation, missing batch, insufficient stock) pass through
/// unchanged; everything the backend itself fails at is a `Store` error.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage failure: {0}")]
    Store(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl LedgerError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, LedgerError::Domain(DomainError::InsufficientStock(_)))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::Domain(DomainError::NotFound))
    }
}
