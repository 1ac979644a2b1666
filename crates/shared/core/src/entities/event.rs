use serde::{Deserialize, Serialize};

use super::{OrderId, Trade};
use crate::values::{Price, Quantity, Symbol, Timestamp};

/// Published once a trade's effects are durable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSettled {
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub symbol: Symbol,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
    pub sequence: u64,
}

impl From<&Trade> for TradeSettled {
    fn from(trade: &Trade) -> Self {
        Self {
            maker_order_id: trade.maker_order_id,
            taker_order_id: trade.taker_order_id,
            symbol: trade.symbol.clone(),
            price: trade.price,
            quantity: trade.quantity,
            timestamp: trade.timestamp,
            sequence: trade.sequence,
        }
    }
}
