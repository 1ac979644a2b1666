use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use bourse_core::{
    BookDepth, DepthLevel, Order, OrderId, Price, Side, Symbol, Timestamp, Trade, ValidationError,
};
use bourse_ports::{BookError, BookResult};
use rust_decimal::Decimal;

/// Position of a resting order within its side
///
/// Bids sort by price descending, asks by price ascending; both then by
/// arrival. A partial fill never changes the key, so queue position is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueKey {
    price: Price,
    arrival: u64,
    is_bid: bool,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_price = if self.is_bid {
            // Bids: higher price first (reverse order)
            other.price.cmp(&self.price)
        } else {
            self.price.cmp(&other.price)
        };
        by_price.then_with(|| self.arrival.cmp(&other.arrival))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Order book for a single symbol
///
/// Pure data structure: no locking and no ledger access. Callers serialize
/// mutations (see [`crate::BookRegistry`]).
pub struct OrderBook {
    symbol: Symbol,
    bids: BTreeMap<QueueKey, Order>,
    asks: BTreeMap<QueueKey, Order>,
    index: HashMap<OrderId, QueueKey>,
    next_arrival: u64,
    /// Match sequence of the last trade produced
    sequence: u64,
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("bids_count", &self.bids.len())
            .field("asks_count", &self.asks.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            next_arrival: 0,
            sequence: 0,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Continue numbering after `sequence`; never moves backwards
    pub fn seed_sequence(&mut self, sequence: u64) {
        self.sequence = self.sequence.max(sequence);
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first_key_value().map(|(key, _)| key.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(key, _)| key.price)
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        let key = self.index.get(id)?;
        self.side(key.is_bid).get(key)
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Match `order` against the opposite side, then rest any remainder
    ///
    /// Trades execute at the resting order's price. Only limit orders are
    /// accepted.
    pub fn add_order(&mut self, mut order: Order, now: Timestamp) -> BookResult<Vec<Trade>> {
        if order.symbol != self.symbol {
            return Err(BookError::SymbolMismatch {
                expected: self.symbol.clone(),
                actual: order.symbol,
            });
        }
        if !order.kind.can_rest() {
            return Err(ValidationError::new(
                "kind",
                format!("{} orders cannot be added to a book", order.kind),
            )
            .into());
        }
        order.validate()?;
        if !order.status.is_active() || order.remaining_quantity.is_zero() {
            return Err(ValidationError::new(
                "remaining_quantity",
                format!("order {} has nothing left to match", order.id),
            )
            .into());
        }
        let Some(price) = order.price else {
            return Err(ValidationError::new("price", "required for limit orders").into());
        };
        if self.index.contains_key(&order.id) {
            return Err(BookError::Conflict(order.id));
        }

        let trades = self.match_incoming(&mut order, now)?;

        if !order.remaining_quantity.is_zero() {
            self.rest(order, price);
        }

        Ok(trades)
    }

    fn match_incoming(&mut self, taker: &mut Order, now: Timestamp) -> BookResult<Vec<Trade>> {
        let mut trades = Vec::new();
        let opposite = match taker.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        while !taker.remaining_quantity.is_zero() {
            let Some(mut best) = opposite.first_entry() else {
                break;
            };
            let resting_price = best.key().price;
            if !taker.crosses(resting_price) {
                break;
            }

            let maker = best.get_mut();
            let quantity = taker.remaining_quantity.min(maker.remaining_quantity);
            maker.fill(quantity, now)?;
            taker.fill(quantity, now)?;

            self.sequence += 1;
            trades.push(Trade {
                maker_order_id: maker.id,
                taker_order_id: taker.id,
                taker_side: taker.side,
                symbol: self.symbol.clone(),
                price: resting_price,
                quantity,
                sequence: self.sequence,
                timestamp: now,
            });

            if maker.remaining_quantity.is_zero() {
                let filled = best.remove();
                self.index.remove(&filled.id);
            }
        }

        Ok(trades)
    }

    /// Insert without matching; the order must not cross the book
    fn rest(&mut self, order: Order, price: Price) {
        let key = QueueKey {
            price,
            arrival: self.next_arrival,
            is_bid: order.side == Side::Buy,
        };
        self.next_arrival += 1;
        self.index.insert(order.id, key);
        self.side_mut(key.is_bid).insert(key, order);
    }

    /// Remove a resting order, returning it as it was just before removal
    pub fn cancel_order(&mut self, id: &OrderId) -> BookResult<Order> {
        let key = self.index.remove(id).ok_or(BookError::NotFound(*id))?;
        self.side_mut(key.is_bid)
            .remove(&key)
            .ok_or(BookError::NotFound(*id))
    }

    /// Aggregated quantity per distinct price on both sides
    pub fn depth(&self, now: Timestamp) -> BookDepth {
        BookDepth {
            symbol: self.symbol.clone(),
            bids: aggregate(self.bids.iter()),
            asks: aggregate(self.asks.iter()),
            sequence: self.sequence,
            timestamp: now,
        }
    }

    fn side(&self, is_bid: bool) -> &BTreeMap<QueueKey, Order> {
        if is_bid { &self.bids } else { &self.asks }
    }

    fn side_mut(&mut self, is_bid: bool) -> &mut BTreeMap<QueueKey, Order> {
        if is_bid {
            &mut self.bids
        } else {
            &mut self.asks
        }
    }
}

/// Levels come out in the side's own order because equal prices are adjacent
fn aggregate<'a>(orders: impl Iterator<Item = (&'a QueueKey, &'a Order)>) -> Vec<DepthLevel> {
    let mut levels: Vec<DepthLevel> = Vec::new();
    for (key, order) in orders {
        match levels.last_mut() {
            Some(level) if level.price == key.price => {
                level.quantity = level.quantity.saturating_add(order.remaining_quantity);
            }
            _ => levels.push(DepthLevel {
                price: key.price,
                quantity: order.remaining_quantity,
            }),
        }
    }
    levels.retain(|level| level.quantity > Decimal::ZERO);
    levels
}
