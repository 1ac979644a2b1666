//! Bourse Settlement
//!
//! Turns matched trades into durable effects, exactly once per trade:
//!
//! 1. **Journal**: the registry appends every trade to a [`TradeJournal`]
//!    while it still holds the book lock
//! 2. **Settle**: a single worker task loads both orders, applies the fill
//!    to the funds ledger, updates both order records and marks the trade
//!    settled
//! 3. **Notify**: a [`TradeSettled`](bourse_core::TradeSettled) event goes to
//!    the configured [`TradeEventSink`](bourse_ports::TradeEventSink)
//!
//! Every step is keyed by [`TradeKey`](bourse_core::TradeKey), so replaying
//! the unsettled tail of the journal after a restart never applies a trade
//! twice. Transient storage failures are retried with exponential backoff;
//! anything else blocks the trade (and every later trade of the same
//! orders) until it is reconciled by hand.
//!
//! [`TradeJournal`]: bourse_ports::TradeJournal

mod config;
mod coordinator;
mod error;
mod events;
mod journal;
mod reconciliation;

pub use config::SettlementConfig;
pub use coordinator::{BlockedTrade, SettlementCoordinator, SettlementDeps, SettlementStats};
pub use error::SettlementError;
pub use events::{ChannelEventSink, OverflowPolicy};
pub use journal::{FileTradeJournal, InMemoryTradeJournal};
pub use reconciliation::{ReconciliationIssue, ReconciliationRegistry};
