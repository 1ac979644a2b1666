//! Trade journal adapters
//!
//! Both adapters keep the same in-memory index of pending trades; the file
//! adapter also writes every change as one JSON line before applying it.

mod file;
mod memory;

use std::collections::{BTreeMap, HashMap, HashSet};

use bourse_core::{Symbol, Trade, TradeKey};
use serde::{Deserialize, Serialize};

pub use file::FileTradeJournal;
pub use memory::InMemoryTradeJournal;

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JournalRecord {
    Matched { trade: Trade },
    Settled { key: TradeKey },
}

#[derive(Default)]
struct JournalState {
    next_position: u64,
    /// Unsettled trades by journal position
    pending: BTreeMap<u64, Trade>,
    positions: HashMap<TradeKey, u64>,
    settled: HashSet<TradeKey>,
    last_sequence: HashMap<Symbol, u64>,
}

impl JournalState {
    fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::Matched { trade } => self.record_matched(trade),
            JournalRecord::Settled { key } => self.record_settled(key),
        }
    }

    fn record_matched(&mut self, trade: Trade) {
        let key = trade.key();
        if self.settled.contains(&key) || self.positions.contains_key(&key) {
            return;
        }

        let last = self.last_sequence.entry(trade.symbol.clone()).or_insert(0);
        *last = (*last).max(trade.sequence);

        let position = self.next_position;
        self.next_position += 1;
        self.positions.insert(key, position);
        self.pending.insert(position, trade);
    }

    fn record_settled(&mut self, key: TradeKey) {
        if let Some(position) = self.positions.remove(&key) {
            self.pending.remove(&position);
        }
        self.settled.insert(key);
    }

    fn unsettled(&self) -> Vec<Trade> {
        self.pending.values().cloned().collect()
    }

    fn last_sequence(&self, symbol: &Symbol) -> u64 {
        self.last_sequence.get(symbol).copied().unwrap_or(0)
    }
}
