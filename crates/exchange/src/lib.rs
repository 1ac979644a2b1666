//! Bourse Exchange
//!
//! The service callers talk to. It sits in front of the matching core:
//!
//! - **Placement**: lock funds, record the order, then submit it to its book
//! - **Cancellation**: pull the order from its book, mark it cancelled,
//!   release what is still locked
//! - **Queries**: orders, balances and book depth
//! - **Bootstrap**: adapters and seed deposits from [`ExchangeConfig`], then
//!   crash recovery from the trade journal
//!
//! ## Architecture
//!
//! ```text
//!        place / cancel
//!              │
//!              ▼
//!      ┌───────────────┐   lock / unlock   ┌───────────────┐
//!      │   Exchange    │──────────────────▶│  FundsLedger  │
//!      └───────┬───────┘                   └───────▲───────┘
//!              │ submit / cancel                   │ settle_fill
//!              ▼                                   │
//!      ┌───────────────┐   journal + queue ┌───────┴───────┐
//!      │ BookRegistry  │──────────────────▶│  Settlement   │──▶ TradeSettled
//!      └───────────────┘                   └───────────────┘
//! ```

mod bootstrap;
pub mod config;
mod error;
mod service;

pub use bootstrap::{ExchangeBootstrap, RecoveryReport};
pub use config::{AccountConfig, ConfigError, DepositConfig, EventsConfig, ExchangeConfig, JournalConfig};
pub use error::{ExchangeError, Result};
pub use service::{Exchange, ExchangeComponents, PlaceOrder, Placement};
