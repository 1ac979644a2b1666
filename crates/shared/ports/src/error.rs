use bourse_core::{BalanceKey, OrderId, Symbol, ValidationError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Whether a storage failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Transient,
    Permanent,
}

/// Failure reported by a persistence adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} storage error: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StorageErrorKind::Transient
    }
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Self::transient(error.to_string())
            }
            _ => Self::permanent(error.to_string()),
        }
    }
}

/// Errors from order book and registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order {0} is already in the book")]
    Conflict(OrderId),

    #[error("order {0} is not resting in the book")]
    NotFound(OrderId),

    #[error("order for {actual} submitted to the {expected} book")]
    SymbolMismatch { expected: Symbol, actual: Symbol },

    #[error("book {0} is halted pending reconciliation")]
    Halted(Symbol),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type BookResult<T> = std::result::Result<T, BookError>;

/// Errors from the funds ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("insufficient funds for {key}: need {needed}, available {available}")]
    InsufficientFunds {
        key: BalanceKey,
        needed: Decimal,
        available: Decimal,
    },

    /// Ledger and orders disagree; never retried
    #[error("insufficient locked funds for {key}: need {needed}, locked {locked}")]
    InsufficientLockedFunds {
        key: BalanceKey,
        needed: Decimal,
        locked: Decimal,
    },

    #[error("balance {0} is halted pending reconciliation")]
    Halted(BalanceKey),

    /// The result would not fit a `Decimal`; never retried
    #[error("adding {amount} to {key} overflows the balance")]
    Overflow { key: BalanceKey, amount: Decimal },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_transient())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::InsufficientLockedFunds { .. })
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors from the durable order store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {0} already exists")]
    Conflict(OrderId),

    #[error("invalid transition for order {id}: {reason}")]
    InvalidTransition { id: OrderId, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Storage(e) if e.is_transient())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_classified() {
        let interrupted = std::io::Error::new(std::io::ErrorKind::Interrupted, "signal");
        assert!(StorageError::from(interrupted).is_transient());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro fs");
        assert!(!StorageError::from(denied).is_transient());
    }

    #[test]
    fn test_only_transient_storage_is_retryable() {
        assert!(LedgerError::Storage(StorageError::transient("busy")).is_transient());
        assert!(!LedgerError::Storage(StorageError::permanent("gone")).is_transient());
        assert!(!StoreError::NotFound(OrderId::nil()).is_transient());
    }
}
