//! Bourse Ledger
//!
//! In-memory adapters for the two durable stores the engine consumes:
//!
//! - [`InMemoryFundsLedger`]: per-(user, asset) balances with row-level
//!   locking and deadlock-free multi-row fills
//! - [`InMemoryOrderStore`]: order records with idempotent fill application
//!
//! Both are shared through `Arc` and are safe to use from many tasks.

mod funds;
mod orders;

pub use funds::InMemoryFundsLedger;
pub use orders::InMemoryOrderStore;
