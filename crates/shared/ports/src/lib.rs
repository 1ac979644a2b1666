//! Bourse Ports
//!
//! Port definitions (traits) for the Bourse matching and settlement engine.
//! These define the boundaries between domain logic and infrastructure.

mod clock;
mod error;
mod events;
mod journal;
mod ledger;
mod order_store;
mod settlement;

pub use clock::Clock;
pub use error::{
    BookError, BookResult, LedgerError, LedgerResult, StorageError, StorageErrorKind, StoreError,
    StoreResult,
};
pub use events::{PublishError, TradeEventSink};
pub use journal::TradeJournal;
pub use ledger::{FillInstruction, FundsLedger};
pub use order_store::OrderStore;
pub use settlement::SettlementQueue;
