use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

mod symbol;

pub use symbol::Symbol;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value - uses Decimal for precision
pub type Quantity = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Asset code, always uppercase (e.g. "BTC", "USD")
pub type Asset = String;

/// Unique identifier for an exchange user
pub type UserId = Uuid;

/// Malformed input rejected before it reaches a book or the ledger
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
