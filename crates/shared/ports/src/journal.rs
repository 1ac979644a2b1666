use bourse_core::{Symbol, Trade, TradeKey};

use crate::error::StorageError;

/// Durable log of matched trades awaiting settlement
///
/// Appends happen while a book's exclusive lock is held, so this port is
/// synchronous. Implementations must make `append` durable before
/// returning.
pub trait TradeJournal: Send + Sync {
    /// Record newly matched trades, in match order
    fn append(&self, trades: &[Trade]) -> Result<(), StorageError>;

    /// Record that a trade's effects are durable
    fn mark_settled(&self, key: &TradeKey) -> Result<(), StorageError>;

    fn is_settled(&self, key: &TradeKey) -> Result<bool, StorageError>;

    /// Matched but not yet settled trades, in match order
    fn unsettled(&self) -> Result<Vec<Trade>, StorageError>;

    /// Highest match sequence journaled for `symbol`, 0 if none
    fn last_sequence(&self, symbol: &Symbol) -> Result<u64, StorageError>;
}
