use std::sync::Arc;

use bourse_core::{
    Balance, BookDepth, Order, OrderId, OrderKind, Price, Quantity, Side, Symbol, Trade, UserId,
    ValidationError,
};
use bourse_matching::BookRegistry;
use bourse_ports::{
    BookError, Clock, FundsLedger, LedgerError, OrderStore, SettlementQueue, TradeEventSink,
    TradeJournal,
};
use bourse_settlement::{
    BlockedTrade, ReconciliationIssue, ReconciliationRegistry, SettlementConfig,
    SettlementCoordinator, SettlementDeps, SettlementStats,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, Result};

/// An order request as it arrives from a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub user: UserId,
    /// Raw symbol, canonicalized on placement
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Price>,
    pub quantity: Quantity,
}

impl PlaceOrder {
    pub fn limit(
        user: UserId,
        symbol: impl Into<String>,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            user,
            symbol: symbol.into(),
            side,
            kind: OrderKind::Limit,
            price: Some(price),
            quantity,
        }
    }

    pub fn market(user: UserId, symbol: impl Into<String>, side: Side, quantity: Quantity) -> Self {
        Self {
            user,
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            price: None,
            quantity,
        }
    }
}

/// Outcome of a placement
///
/// `order` is the record as accepted; fills show up in the order store once
/// settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub order: Order,
    pub trades: Vec<Trade>,
}

/// Storage and notification adapters the service runs on
pub struct ExchangeComponents {
    pub ledger: Arc<dyn FundsLedger>,
    pub orders: Arc<dyn OrderStore>,
    pub journal: Arc<dyn TradeJournal>,
    pub events: Arc<dyn TradeEventSink>,
    pub clock: Arc<dyn Clock>,
    pub settlement: SettlementConfig,
}

/// Caller-side service around the books, ledger and settlement pipeline
///
/// Funds are locked and the order recorded before it reaches a book;
/// cancellation removes it from the book before releasing anything.
pub struct Exchange {
    pub(crate) registry: BookRegistry,
    pub(crate) ledger: Arc<dyn FundsLedger>,
    pub(crate) orders: Arc<dyn OrderStore>,
    pub(crate) journal: Arc<dyn TradeJournal>,
    pub(crate) settlement: Arc<SettlementCoordinator>,
    pub(crate) reconciliation: Arc<ReconciliationRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Exchange {
    /// Wire the service; must be called inside a tokio runtime
    pub fn with_components(components: ExchangeComponents) -> Self {
        let reconciliation = Arc::new(ReconciliationRegistry::new());
        let settlement = SettlementCoordinator::start(SettlementDeps {
            ledger: Arc::clone(&components.ledger),
            orders: Arc::clone(&components.orders),
            journal: Arc::clone(&components.journal),
            events: components.events,
            reconciliation: Arc::clone(&reconciliation),
            clock: Arc::clone(&components.clock),
            config: components.settlement,
        });
        let queue: Arc<dyn SettlementQueue> = settlement.clone();
        let registry = BookRegistry::new(queue, Arc::clone(&components.clock));

        Self {
            registry,
            ledger: components.ledger,
            orders: components.orders,
            journal: components.journal,
            settlement,
            reconciliation,
            clock: components.clock,
        }
    }

    /// Lock funds, record the order and hand it to its book
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Placement> {
        let symbol = Symbol::parse(&request.symbol)?;
        let price = match (request.kind, request.price) {
            (OrderKind::Market, _) => {
                return Err(ExchangeError::Unsupported(
                    "market orders are not accepted".to_string(),
                ));
            }
            (OrderKind::Limit, Some(price)) => price,
            (OrderKind::Limit, None) => {
                return Err(ValidationError::new("price", "required for limit orders").into());
            }
        };

        let order = Order::limit(
            request.user,
            symbol,
            request.side,
            price,
            request.quantity,
            self.clock.now(),
        );
        order.validate()?;
        let (asset, amount) = order.reservation(order.quantity)?;

        self.ledger.get_or_create_balance(order.owner, &asset).await?;
        self.ledger.lock_funds(order.owner, &asset, amount).await?;

        if let Err(err) = self.orders.insert(order.clone()).await {
            log::warn!("Could not record order {}: {}", order.id, err);
            self.release(&order, &asset, amount).await;
            return Err(err.into());
        }

        match self.registry.submit_order(order.clone()) {
            Ok(trades) => {
                log::info!(
                    "Accepted order {} from {}: {} {} {} @ {} ({} trade(s))",
                    order.id,
                    order.owner,
                    order.side,
                    order.quantity,
                    order.symbol,
                    price,
                    trades.len()
                );
                Ok(Placement { order, trades })
            }
            Err(BookError::Storage(err)) => {
                // The book matched but the trades were not journaled
                self.reconciliation.report(ReconciliationIssue::for_order(
                    order.id,
                    format!("matched on {} but not journaled: {}", order.symbol, err),
                    self.clock.now(),
                ));
                Err(BookError::Storage(err).into())
            }
            Err(err) => {
                // Rejected before touching the book
                self.withdraw_order(&order, &asset, amount).await;
                Err(err.into())
            }
        }
    }

    /// Undo a recorded order that never reached a book
    async fn withdraw_order(&self, order: &Order, asset: &str, amount: Decimal) {
        if let Err(err) = self
            .orders
            .mark_cancelled(order.id, order.remaining_quantity, self.clock.now())
            .await
        {
            self.reconciliation.report(ReconciliationIssue::for_order(
                order.id,
                format!("rejected by book but record not cancelled: {err}"),
                self.clock.now(),
            ));
        }
        self.release(order, asset, amount).await;
    }

    /// Return a reservation that no longer backs any order
    async fn release(&self, order: &Order, asset: &str, amount: Decimal) {
        if let Err(err) = self.ledger.unlock_funds(order.owner, asset, amount).await {
            let mut issue = ReconciliationIssue::for_order(
                order.id,
                format!("could not release {amount} {asset}: {err}"),
                self.clock.now(),
            );
            if let LedgerError::InsufficientLockedFunds { key, .. }
            | LedgerError::Halted(key)
            | LedgerError::Overflow { key, .. } = &err
            {
                issue = issue.with_balance(key.clone());
            }
            self.reconciliation.report(issue);
        }
    }

    /// Remove a resting order, mark it cancelled and unlock its remainder
    pub async fn cancel_order(&self, user: UserId, id: OrderId) -> Result<Order> {
        let order = self.owned_order(user, id).await?;
        if order.status.is_terminal() {
            return Err(ValidationError::new(
                "status",
                format!("order {} is already {:?}", id, order.status),
            )
            .into());
        }

        let removed = self.registry.cancel_order(&order)?;
        let now = self.clock.now();
        let cancelled = match self
            .orders
            .mark_cancelled(id, removed.remaining_quantity, now)
            .await
        {
            Ok(cancelled) => cancelled,
            Err(err) => {
                self.reconciliation.report(ReconciliationIssue::for_order(
                    id,
                    format!("removed from book but record not cancelled: {err}"),
                    now,
                ));
                return Err(err.into());
            }
        };

        let (asset, amount) = removed.reservation(removed.remaining_quantity)?;
        if amount > Decimal::ZERO {
            match self.ledger.unlock_funds(user, &asset, amount).await {
                Ok(_) => {}
                Err(LedgerError::InsufficientLockedFunds {
                    key,
                    needed,
                    locked,
                }) => {
                    let reason = format!(
                        "cancel of order {id} needs {needed} {} unlocked but only {locked} is locked",
                        key.asset
                    );
                    self.reconciliation.report(
                        ReconciliationIssue::for_order(id, reason.clone(), now).with_balance(key),
                    );
                    return Err(ExchangeError::Reconciliation(reason));
                }
                Err(err) => return Err(err.into()),
            }
        }

        log::info!(
            "Cancelled order {} for {} ({} unfilled released)",
            id,
            user,
            removed.remaining_quantity
        );
        Ok(cancelled)
    }

    /// The durable record of one of `user`'s orders
    pub async fn order(&self, user: UserId, id: OrderId) -> Result<Order> {
        self.owned_order(user, id).await
    }

    async fn owned_order(&self, user: UserId, id: OrderId) -> Result<Order> {
        match self.orders.get(id).await? {
            Some(order) if order.owner == user => Ok(order),
            _ => Err(ExchangeError::NotFound(id)),
        }
    }

    /// Every order of `user` in any status, oldest first
    pub async fn orders(&self, user: UserId) -> Result<Vec<Order>> {
        Ok(self.orders.orders_for_user(user).await?)
    }

    /// Open and partially filled orders of `user`, oldest first
    pub async fn open_orders(&self, user: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.orders_for_user(user).await?;
        Ok(orders
            .into_iter()
            .filter(|order| order.status.is_active())
            .collect())
    }

    pub async fn balances(&self, user: UserId) -> Result<Vec<Balance>> {
        Ok(self.ledger.balances(user).await?)
    }

    pub async fn deposit(&self, user: UserId, asset: &str, amount: Decimal) -> Result<Balance> {
        Ok(self.ledger.deposit(user, asset, amount).await?)
    }

    pub async fn withdraw(&self, user: UserId, asset: &str, amount: Decimal) -> Result<Balance> {
        Ok(self.ledger.withdraw(user, asset, amount).await?)
    }

    /// Aggregated book depth for a raw symbol
    pub fn depth(&self, symbol: &str) -> Result<BookDepth> {
        let symbol = Symbol::parse(symbol)?;
        Ok(self.registry.book_depth(&symbol))
    }

    /// Open the book for `symbol` ahead of the first order
    pub fn open_book(&self, symbol: &str) -> Result<Symbol> {
        let handle = self.registry.resolve(symbol)?;
        Ok(handle.symbol())
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.registry.symbols()
    }

    /// Re-open a halted book once book and journal agree again
    pub fn resume_book(&self, symbol: &str) -> Result<()> {
        let symbol = Symbol::parse(symbol)?;
        if let Some(handle) = self.registry.get(&symbol) {
            handle.resume();
            log::warn!("Book {} resumed after reconciliation", symbol);
        }
        Ok(())
    }

    /// Resolve once every queued trade is settled or blocked
    pub async fn wait_settled(&self) {
        self.settlement.wait_idle().await;
    }

    /// Try blocked trades again after manual repair
    pub fn retry_blocked(&self) -> Result<()> {
        Ok(self.settlement.retry_blocked()?)
    }

    pub fn blocked_trades(&self) -> Vec<BlockedTrade> {
        self.settlement.blocked()
    }

    pub fn settlement_stats(&self) -> SettlementStats {
        self.settlement.stats()
    }

    pub fn reconciliation(&self) -> &ReconciliationRegistry {
        &self.reconciliation
    }
}
