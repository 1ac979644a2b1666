//! Bourse Matching
//!
//! Per-symbol order books with continuous price-time matching, and the
//! registry that routes submissions and cancellations to them.
//!
//! ```text
//! SubmitOrder ──► BookRegistry ──► OrderBook (exclusive lock)
//!                      │                 │ trades
//!                      │                 ▼
//!                      └──────────► SettlementQueue (journal + worker)
//! ```

mod order_book;
mod registry;

pub use order_book::OrderBook;
pub use registry::{BookHandle, BookRegistry};

// Re-export the errors from ports for convenience
pub use bourse_ports::{BookError, BookResult};
