use bourse_core::Trade;

use crate::error::StorageError;

/// Hand-off from matching to settlement
///
/// Called with the book's exclusive lock held. A successful return means
/// the trades are durable and will be settled exactly once.
pub trait SettlementQueue: Send + Sync {
    fn enqueue(&self, trades: Vec<Trade>) -> Result<(), StorageError>;
}
