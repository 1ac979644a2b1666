use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bourse_core::{Order, OrderId, Side, Timestamp, Trade, TradeSettled, checked_notional};
use bourse_ports::{
    Clock, FillInstruction, FundsLedger, LedgerError, OrderStore, SettlementQueue, StorageError,
    StoreError, TradeEventSink, TradeJournal,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};

use crate::{ReconciliationIssue, ReconciliationRegistry, SettlementConfig, SettlementError};

/// Everything the settlement worker talks to
#[derive(Clone)]
pub struct SettlementDeps {
    pub ledger: Arc<dyn FundsLedger>,
    pub orders: Arc<dyn OrderStore>,
    pub journal: Arc<dyn TradeJournal>,
    pub events: Arc<dyn TradeEventSink>,
    pub reconciliation: Arc<ReconciliationRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: SettlementConfig,
}

/// A trade parked until someone reconciles it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedTrade {
    pub trade: Trade,
    pub reason: String,
    pub blocked_at: Timestamp,
}

/// Counters since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettlementStats {
    pub settled: u64,
    /// Trades found already settled (replays, duplicates)
    pub skipped: u64,
    pub blocked: usize,
    pub pending: usize,
}

enum Command {
    Settle(Trade),
    RetryBlocked,
}

#[derive(Default)]
struct Shared {
    pending: AtomicUsize,
    idle: Notify,
    settled: AtomicU64,
    skipped: AtomicU64,
    blocked: Mutex<Vec<BlockedTrade>>,
}

impl Shared {
    fn finish_command(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Single-writer settlement pipeline
///
/// Trades are settled one at a time, in the order they were queued. Once a
/// trade is blocked, every later trade touching either of its orders is
/// held behind it so fills of an order are never applied out of order.
pub struct SettlementCoordinator {
    tx: mpsc::UnboundedSender<Command>,
    journal: Arc<dyn TradeJournal>,
    shared: Arc<Shared>,
}

impl SettlementCoordinator {
    /// Spawn the worker task; must be called inside a tokio runtime
    pub fn start(deps: SettlementDeps) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let journal = Arc::clone(&deps.journal);

        let worker = Worker {
            deps,
            shared: Arc::clone(&shared),
            parked: HashSet::new(),
        };
        tokio::spawn(worker.run(rx));

        Arc::new(Self {
            tx,
            journal,
            shared,
        })
    }

    fn dispatch(&self, command: Command) -> Result<(), StorageError> {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(command).is_err() {
            self.shared.finish_command();
            return Err(StorageError::permanent("settlement worker has stopped"));
        }
        Ok(())
    }

    /// Queue every journaled but unsettled trade, oldest first
    pub fn replay(&self) -> Result<usize, StorageError> {
        let trades = self.journal.unsettled()?;
        let count = trades.len();
        for trade in trades {
            self.dispatch(Command::Settle(trade))?;
        }
        if count > 0 {
            log::info!("Replaying {} unsettled trade(s) from the journal", count);
        }
        Ok(count)
    }

    /// Try every blocked trade again, in original order
    pub fn retry_blocked(&self) -> Result<(), StorageError> {
        self.dispatch(Command::RetryBlocked)
    }

    /// Resolve once every queued command has been processed
    ///
    /// Blocked trades do not count as queued.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn blocked(&self) -> Vec<BlockedTrade> {
        self.shared.blocked.lock().clone()
    }

    pub fn stats(&self) -> SettlementStats {
        SettlementStats {
            settled: self.shared.settled.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
            blocked: self.shared.blocked.lock().len(),
            pending: self.shared.pending.load(Ordering::Acquire),
        }
    }
}

impl SettlementQueue for SettlementCoordinator {
    fn enqueue(&self, trades: Vec<Trade>) -> Result<(), StorageError> {
        self.journal.append(&trades)?;
        for trade in trades {
            self.dispatch(Command::Settle(trade))?;
        }
        Ok(())
    }
}

struct Worker {
    deps: SettlementDeps,
    shared: Arc<Shared>,
    /// Orders with a blocked trade ahead of them
    parked: HashSet<OrderId>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        log::info!("Settlement worker started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Settle(trade) => self.process(trade).await,
                Command::RetryBlocked => self.retry_blocked().await,
            }
            self.shared.finish_command();
        }

        log::info!("Settlement worker stopped");
    }

    async fn retry_blocked(&mut self) {
        let blocked = std::mem::take(&mut *self.shared.blocked.lock());
        if blocked.is_empty() {
            return;
        }

        log::info!("Retrying {} blocked trade(s)", blocked.len());
        self.parked.clear();
        for entry in blocked {
            self.process(entry.trade).await;
        }
    }

    async fn process(&mut self, trade: Trade) {
        let key = trade.key();

        if let Some(order) = [trade.maker_order_id, trade.taker_order_id]
            .into_iter()
            .find(|id| self.parked.contains(id))
        {
            log::warn!(
                "Holding trade {} behind a blocked trade of order {}",
                key,
                order
            );
            self.hold(trade, format!("waiting on a blocked trade of order {order}"));
            return;
        }

        match self.settle_with_retry(&trade).await {
            Ok(true) => {
                self.shared.settled.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Settled trade {} ({} {} @ {})",
                    key,
                    trade.quantity,
                    trade.symbol,
                    trade.price
                );
                if let Err(err) = self.deps.events.publish(TradeSettled::from(&trade)).await {
                    log::warn!("Could not publish settlement of trade {}: {}", key, err);
                }
            }
            Ok(false) => {
                self.shared.skipped.fetch_add(1, Ordering::Relaxed);
                log::debug!("Trade {} was already settled", key);
            }
            Err(err) => self.block(trade, err),
        }
    }

    fn hold(&mut self, trade: Trade, reason: String) {
        self.parked.insert(trade.maker_order_id);
        self.parked.insert(trade.taker_order_id);
        self.shared.blocked.lock().push(BlockedTrade {
            trade,
            reason,
            blocked_at: self.deps.clock.now(),
        });
    }

    fn block(&mut self, trade: Trade, err: SettlementError) {
        let now = self.deps.clock.now();
        log::error!(
            "CRITICAL: settlement of trade {} on {} blocked: {}",
            trade.key(),
            trade.symbol,
            err
        );

        let mut issue = ReconciliationIssue::for_trade(&trade, err.to_string(), now);
        if let SettlementError::Ledger(
            LedgerError::InsufficientLockedFunds { key, .. }
            | LedgerError::Halted(key)
            | LedgerError::Overflow { key, .. },
        ) = &err
        {
            issue = issue.with_balance(key.clone());
        }
        self.deps.reconciliation.report(issue);
        self.hold(trade, err.to_string());
    }

    async fn settle_with_retry(&self, trade: &Trade) -> Result<bool, SettlementError> {
        let max_attempts = self.deps.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.settle_once(trade).await {
                Ok(applied) => return Ok(applied),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.deps.config.backoff(attempt);
                    log::warn!(
                        "Settlement of trade {} failed (attempt {}/{}), retrying in {:?}: {}",
                        trade.key(),
                        attempt,
                        max_attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One pass over every settlement step
    ///
    /// Each step is keyed by the trade, so a pass interrupted anywhere can
    /// be repeated. Returns `false` if the trade had already been settled.
    async fn settle_once(&self, trade: &Trade) -> Result<bool, SettlementError> {
        let key = trade.key();
        if self.deps.journal.is_settled(&key)? {
            return Ok(false);
        }

        let maker = self.load(trade.maker_order_id).await?;
        let taker = self.load(trade.taker_order_id).await?;
        let fill = fill_instruction(trade, &maker, &taker)?;

        self.deps.ledger.settle_fill(&key, &fill).await?;

        let now = self.deps.clock.now();
        self.deps
            .orders
            .apply_fill(maker.id, &key, trade.quantity, now)
            .await?;
        self.deps
            .orders
            .apply_fill(taker.id, &key, trade.quantity, now)
            .await?;

        self.deps.journal.mark_settled(&key)?;
        Ok(true)
    }

    async fn load(&self, id: OrderId) -> Result<Order, SettlementError> {
        self.deps
            .orders
            .get(id)
            .await?
            .ok_or(SettlementError::Store(StoreError::NotFound(id)))
    }
}

/// Ledger movements for `trade`, checked against both order records
fn fill_instruction(
    trade: &Trade,
    maker: &Order,
    taker: &Order,
) -> Result<FillInstruction, SettlementError> {
    if maker.symbol != trade.symbol || taker.symbol != trade.symbol {
        return Err(SettlementError::Divergence(format!(
            "trade {} on {} references orders on {} and {}",
            trade.key(),
            trade.symbol,
            maker.symbol,
            taker.symbol
        )));
    }
    if taker.side != trade.taker_side || maker.side != trade.taker_side.opposite() {
        return Err(SettlementError::Divergence(format!(
            "trade {} has taker side {} but maker is {} and taker is {}",
            trade.key(),
            trade.taker_side,
            maker.side,
            taker.side
        )));
    }

    let (buyer, seller) = match trade.taker_side {
        Side::Buy => (taker, maker),
        Side::Sell => (maker, taker),
    };
    let limit = buyer.price.ok_or_else(|| {
        SettlementError::Divergence(format!("buy order {} has no limit price", buyer.id))
    })?;
    let improvement = limit - trade.price;
    if improvement < Decimal::ZERO {
        return Err(SettlementError::Divergence(format!(
            "trade {} at {} is above the buyer's limit {}",
            trade.key(),
            trade.price,
            limit
        )));
    }

    let quote_amount = trade.notional().map_err(LedgerError::from)?;
    let buyer_refund = checked_notional(improvement, trade.quantity).map_err(LedgerError::from)?;

    Ok(FillInstruction {
        buyer: buyer.owner,
        seller: seller.owner,
        base_asset: trade.symbol.base().to_string(),
        quote_asset: trade.symbol.quote().to_string(),
        base_amount: trade.quantity,
        quote_amount,
        buyer_refund,
    })
}
