//! Bourse Core Domain
//!
//! Pure domain types for the Bourse matching and settlement engine.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Balances
    Balance,
    BalanceError,
    BalanceKey,
    // Market data
    BookDepth,
    DepthLevel,
    // Core trading entities
    Order,
    OrderId,
    OrderKind,
    OrderStatus,
    Side,
    Trade,
    TradeKey,
    TradeSettled,
    checked_notional,
};
pub use values::{Asset, Price, Quantity, Symbol, Timestamp, UserId, ValidationError};
