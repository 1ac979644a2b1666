use std::fmt;

use serde::{Deserialize, Serialize};

use super::{OrderId, Side, checked_notional};
use crate::values::{Price, Quantity, Symbol, Timestamp, ValidationError};

/// Idempotency key for settling a trade
///
/// The same maker/taker pair can meet more than once, so the book's match
/// sequence is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeKey {
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub sequence: u64,
}

impl fmt::Display for TradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.maker_order_id, self.taker_order_id, self.sequence
        )
    }
}

/// Trade resulting from matching an incoming order against a resting one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Resting order
    pub maker_order_id: OrderId,
    /// Incoming order
    pub taker_order_id: OrderId,
    pub taker_side: Side,
    pub symbol: Symbol,
    /// Always the maker's price
    pub price: Price,
    pub quantity: Quantity,
    /// Book-local match sequence, strictly increasing per symbol
    pub sequence: u64,
    pub timestamp: Timestamp,
}

impl Trade {
    pub fn key(&self) -> TradeKey {
        TradeKey {
            maker_order_id: self.maker_order_id,
            taker_order_id: self.taker_order_id,
            sequence: self.sequence,
        }
    }

    /// Quote value exchanged by this trade
    pub fn notional(&self) -> Result<Quantity, ValidationError> {
        checked_notional(self.price, self.quantity)
    }
}
