use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::values::ValidationError;

/// Order kinds accepted at the API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Execute at specified price or better, rest the remainder
    Limit,
    /// Execute against whatever liquidity exists
    Market,
}

impl OrderKind {
    /// Only limit orders may rest in a book
    pub fn can_rest(&self) -> bool {
        matches!(self, OrderKind::Limit)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Limit => write!(f, "limit"),
            OrderKind::Market => write!(f, "market"),
        }
    }
}

impl FromStr for OrderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "limit" => Ok(OrderKind::Limit),
            "market" => Ok(OrderKind::Market),
            other => Err(ValidationError::new(
                "kind",
                format!("'{other}' must be 'limit' or 'market'"),
            )),
        }
    }
}
