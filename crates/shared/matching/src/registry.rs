use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bourse_core::{BookDepth, Order, Symbol, Trade};
use bourse_ports::{BookError, BookResult, Clock, SettlementQueue};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::OrderBook;

/// A book plus its lock and halt flag
///
/// Mutations take the write lock for the whole call, depth snapshots take
/// the read lock.
pub struct BookHandle {
    book: RwLock<OrderBook>,
    halted: AtomicBool,
}

impl BookHandle {
    fn new(book: OrderBook) -> Self {
        Self {
            book: RwLock::new(book),
            halted: AtomicBool::new(false),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.book.read().symbol().clone()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Re-open a halted book after manual reconciliation
    pub fn resume(&self) {
        self.halted.store(false, Ordering::Release);
    }

    pub fn sequence(&self) -> u64 {
        self.book.read().sequence()
    }
}

/// Directory of order books keyed by canonical symbol
///
/// Books are created on first reference and never removed. Every batch of
/// trades is handed to the settlement queue before the book lock is
/// released, so settlement sees trades in match order.
pub struct BookRegistry {
    books: DashMap<Symbol, Arc<BookHandle>>,
    settlement: Arc<dyn SettlementQueue>,
    clock: Arc<dyn Clock>,
}

impl BookRegistry {
    pub fn new(settlement: Arc<dyn SettlementQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            books: DashMap::new(),
            settlement,
            clock,
        }
    }

    /// Existing book for `symbol`, or a new one created exactly once
    pub fn get_or_create(&self, symbol: &Symbol) -> Arc<BookHandle> {
        if let Some(handle) = self.books.get(symbol) {
            return handle.value().clone();
        }

        self.books
            .entry(symbol.clone())
            .or_insert_with(|| {
                log::info!("Creating order book for {}", symbol);
                Arc::new(BookHandle::new(OrderBook::new(symbol.clone())))
            })
            .value()
            .clone()
    }

    /// Canonicalize a raw symbol and resolve its book
    pub fn resolve(&self, raw: &str) -> BookResult<Arc<BookHandle>> {
        let symbol = Symbol::parse(raw)?;
        Ok(self.get_or_create(&symbol))
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Arc<BookHandle>> {
        self.books.get(symbol).map(|handle| handle.value().clone())
    }

    /// All known symbols, sorted
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Match an order whose funds are already locked and recorded
    ///
    /// Returns once matching is done; the returned trades are journaled and
    /// queued for settlement. If the hand-off fails after the book has
    /// changed, the book is halted.
    pub fn submit_order(&self, order: Order) -> BookResult<Vec<Trade>> {
        let handle = self.get_or_create(&order.symbol);
        let order_id = order.id;

        let mut book = handle.book.write();
        if handle.is_halted() {
            return Err(BookError::Halted(book.symbol().clone()));
        }

        let trades = book.add_order(order, self.clock.now())?;
        if trades.is_empty() {
            log::debug!("Order {} resting on {}", order_id, book.symbol());
            return Ok(trades);
        }

        if let Err(err) = self.settlement.enqueue(trades.clone()) {
            handle.halt();
            log::error!(
                "CRITICAL: {} trade(s) for order {} matched on {} but could not be journaled, book halted: {}",
                trades.len(),
                order_id,
                book.symbol(),
                err
            );
            return Err(BookError::Storage(err));
        }

        log::info!(
            "Order {} matched {} trade(s) on {}",
            order_id,
            trades.len(),
            book.symbol()
        );
        Ok(trades)
    }

    /// Remove a resting order, returning it as it was before removal
    pub fn cancel_order(&self, order: &Order) -> BookResult<Order> {
        let handle = self
            .get(&order.symbol)
            .ok_or(BookError::NotFound(order.id))?;

        let mut book = handle.book.write();
        if handle.is_halted() {
            return Err(BookError::Halted(book.symbol().clone()));
        }

        let removed = book.cancel_order(&order.id)?;
        log::info!(
            "Order {} removed from {} with {} remaining",
            removed.id,
            book.symbol(),
            removed.remaining_quantity
        );
        Ok(removed)
    }

    /// Aggregated depth of the book for `symbol`, empty for a new book
    pub fn book_depth(&self, symbol: &Symbol) -> BookDepth {
        let handle = self.get_or_create(symbol);
        let book = handle.book.read();
        book.depth(self.clock.now())
    }

    /// Continue a book's match sequence after `sequence` (used on recovery)
    pub fn seed_sequence(&self, symbol: &Symbol, sequence: u64) {
        let handle = self.get_or_create(symbol);
        handle.book.write().seed_sequence(sequence);
    }
}
