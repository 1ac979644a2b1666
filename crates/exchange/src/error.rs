use bourse_core::{OrderId, ValidationError};
use bourse_ports::{BookError, LedgerError, StorageError, StoreError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the exchange service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Book(#[from] BookError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Needs an operator; automated processing for the affected state stopped
    #[error("reconciliation required: {0}")]
    Reconciliation(String),
}

impl ExchangeError {
    /// Whether this is an expected business rejection rather than a fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExchangeError::Validation(_)
                | ExchangeError::NotFound(_)
                | ExchangeError::Unsupported(_)
                | ExchangeError::Ledger(LedgerError::InsufficientFunds { .. })
                | ExchangeError::Ledger(LedgerError::Overflow { .. })
                | ExchangeError::Ledger(LedgerError::Validation(_))
                | ExchangeError::Book(BookError::Validation(_))
                | ExchangeError::Book(BookError::NotFound(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
