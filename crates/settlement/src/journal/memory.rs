use bourse_core::{Symbol, Trade, TradeKey};
use bourse_ports::{StorageError, TradeJournal};
use parking_lot::Mutex;

use super::{JournalRecord, JournalState};

/// Volatile journal for tests and single-process deployments
#[derive(Default)]
pub struct InMemoryTradeJournal {
    state: Mutex<JournalState>,
}

impl InMemoryTradeJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeJournal for InMemoryTradeJournal {
    fn append(&self, trades: &[Trade]) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        for trade in trades {
            state.apply(JournalRecord::Matched {
                trade: trade.clone(),
            });
        }
        Ok(())
    }

    fn mark_settled(&self, key: &TradeKey) -> Result<(), StorageError> {
        self.state.lock().apply(JournalRecord::Settled { key: *key });
        Ok(())
    }

    fn is_settled(&self, key: &TradeKey) -> Result<bool, StorageError> {
        Ok(self.state.lock().settled.contains(key))
    }

    fn unsettled(&self) -> Result<Vec<Trade>, StorageError> {
        Ok(self.state.lock().unsettled())
    }

    fn last_sequence(&self, symbol: &Symbol) -> Result<u64, StorageError> {
        Ok(self.state.lock().last_sequence(symbol))
    }
}
