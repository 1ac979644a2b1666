use bourse_ports::{LedgerError, StorageError, StoreError};
use thiserror::Error;

/// Why a trade could not be settled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("order store: {0}")]
    Store(#[from] StoreError),

    #[error("journal: {0}")]
    Journal(#[from] StorageError),

    /// Trade and order records disagree
    #[error("divergence: {0}")]
    Divergence(String),
}

impl SettlementError {
    pub fn is_transient(&self) -> bool {
        match self {
            SettlementError::Ledger(e) => e.is_transient(),
            SettlementError::Store(e) => e.is_transient(),
            SettlementError::Journal(e) => e.is_transient(),
            SettlementError::Divergence(_) => false,
        }
    }
}
