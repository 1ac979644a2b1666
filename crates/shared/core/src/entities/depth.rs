use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity, Symbol, Timestamp};

/// Aggregated resting quantity at one price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
}

/// Point-in-time view of a book, one level per distinct price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDepth {
    pub symbol: Symbol,
    /// Highest price first
    pub bids: Vec<DepthLevel>,
    /// Lowest price first
    pub asks: Vec<DepthLevel>,
    /// Match sequence of the book when the snapshot was taken
    pub sequence: u64,
    pub timestamp: Timestamp,
}

impl BookDepth {
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|level| level.price)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
