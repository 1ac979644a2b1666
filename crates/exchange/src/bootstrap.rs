//! Bootstrap - wiring, seeding and crash recovery
//!
//! Start-up runs in a fixed order:
//! 1. Build adapters from [`ExchangeConfig`] and wire the service
//! 2. Fund configured accounts the ledger has not seen yet, open the
//!    configured books
//! 3. Recover: settle the journal's unsettled tail, then rebuild every
//!    book from the open orders in the order store

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bourse_clock::SystemClock;
use bourse_core::{OrderId, Quantity, Symbol, TradeSettled};
use bourse_ledger::{InMemoryFundsLedger, InMemoryOrderStore};
use bourse_ports::{FundsLedger, OrderStore, TradeJournal};
use bourse_settlement::{ChannelEventSink, FileTradeJournal, InMemoryTradeJournal};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc::Receiver;

use crate::config::{ConfigError, ExchangeConfig};
use crate::error::Result;
use crate::service::{Exchange, ExchangeComponents};

/// What recovery found and rebuilt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Journaled trades queued for settlement again
    pub replayed: usize,
    /// Of those, trades still blocked once settlement went idle
    pub blocked: usize,
    /// Orders put back on a book
    pub restored_orders: usize,
    /// Active orders with nothing left to rest
    pub skipped_orders: usize,
}

/// A started exchange with its event stream
pub struct ExchangeBootstrap {
    pub exchange: Exchange,
    /// Trade-settled events, in settlement order
    pub events: Receiver<TradeSettled>,
    pub recovery: RecoveryReport,
}

impl ExchangeBootstrap {
    /// Start on in-memory ledger and order store adapters
    ///
    /// Volatile stores cannot be reconciled with a journal that outlives
    /// them, so a configured journal path is refused here.
    pub async fn from_config(config: ExchangeConfig) -> Result<Self> {
        if let Some(path) = &config.journal.path {
            return Err(ConfigError::Invalid(format!(
                "journal.path {} needs durable ledger and order store adapters (from_config_with)",
                path.display()
            ))
            .into());
        }
        Self::from_config_with(
            config,
            Arc::new(InMemoryFundsLedger::new()),
            Arc::new(InMemoryOrderStore::new()),
        )
        .await
    }

    /// Start on caller-supplied ledger and order store adapters
    ///
    /// Opening deposits are applied only to accounts the ledger has never
    /// seen, so restarting on the same stores does not fund them twice.
    pub async fn from_config_with(
        config: ExchangeConfig,
        ledger: Arc<dyn FundsLedger>,
        orders: Arc<dyn OrderStore>,
    ) -> Result<Self> {
        config.validate()?;
        log::info!("Starting {}", config.name);

        let journal: Arc<dyn TradeJournal> = match &config.journal.path {
            Some(path) => {
                let journal = FileTradeJournal::open(path, config.journal.sync_on_append)?;
                log::info!("Journaling trades to {}", journal.path().display());
                Arc::new(journal)
            }
            None => {
                log::warn!("No journal path configured, trades will not survive a restart");
                Arc::new(InMemoryTradeJournal::new())
            }
        };
        let (sink, events) = ChannelEventSink::new(config.events.capacity, config.events.overflow);

        let exchange = Exchange::with_components(ExchangeComponents {
            ledger,
            orders,
            journal,
            events: Arc::new(sink),
            clock: Arc::new(SystemClock::new()),
            settlement: config.settlement.clone(),
        });

        for account in &config.accounts {
            if !exchange.balances(account.user).await?.is_empty() {
                log::info!("Account {} already funded, skipping opening deposits", account.user);
                continue;
            }
            for deposit in &account.deposits {
                exchange
                    .deposit(account.user, &deposit.asset, deposit.amount)
                    .await?;
            }
        }
        for symbol in config.parsed_symbols()? {
            exchange.registry.get_or_create(&symbol);
        }

        let recovery = exchange.recover().await?;
        Ok(Self {
            exchange,
            events,
            recovery,
        })
    }
}

impl Exchange {
    /// Bring books and settlement back in line with durable state
    ///
    /// Meant to run once, before the first order is accepted. Unsettled
    /// journaled trades are settled first; whatever is still blocked
    /// afterwards is subtracted from its orders before they rest again.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport {
            replayed: self.settlement.replay()?,
            ..Default::default()
        };
        self.settlement.wait_idle().await;

        let unsettled = self.journal.unsettled()?;
        report.blocked = unsettled.len();

        let mut pending_fills: HashMap<OrderId, Quantity> = HashMap::new();
        let mut symbols: BTreeSet<Symbol> = self.registry.symbols().into_iter().collect();
        for trade in &unsettled {
            for id in [trade.maker_order_id, trade.taker_order_id] {
                let pending = pending_fills.entry(id).or_insert(Decimal::ZERO);
                *pending = pending.saturating_add(trade.quantity);
            }
            symbols.insert(trade.symbol.clone());
        }

        let active = self.orders.active_orders().await?;
        symbols.extend(active.iter().map(|order| order.symbol.clone()));

        for symbol in &symbols {
            let last = self.journal.last_sequence(symbol)?;
            if last > 0 {
                self.registry.seed_sequence(symbol, last);
            }
        }

        for mut order in active {
            let pending = pending_fills.get(&order.id).copied().unwrap_or(Decimal::ZERO);
            let remaining = order.remaining_quantity - pending;
            if remaining <= Decimal::ZERO {
                report.skipped_orders += 1;
                continue;
            }

            order.remaining_quantity = remaining;
            let id = order.id;
            let trades = self.registry.submit_order(order)?;
            if !trades.is_empty() {
                log::warn!(
                    "Order {} matched {} trade(s) while being restored",
                    id,
                    trades.len()
                );
            }
            report.restored_orders += 1;
        }

        if report.replayed > 0 || report.restored_orders > 0 || report.blocked > 0 {
            log::info!(
                "Recovery: {} trade(s) replayed, {} blocked, {} order(s) restored, {} skipped",
                report.replayed,
                report.blocked,
                report.restored_orders,
                report.skipped_orders
            );
        }
        Ok(report)
    }
}
