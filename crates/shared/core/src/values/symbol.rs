use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Trading pair identifier in canonical `BASE-QUOTE` form
///
/// Parsing trims and uppercases its input, so `" btc-usd"` and `"BTC-USD"`
/// name the same book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Parse and canonicalize a symbol
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let canonical = raw.trim().to_uppercase();
        let Some((base, quote)) = canonical.split_once('-') else {
            return Err(ValidationError::new(
                "symbol",
                format!("'{raw}' is not in BASE-QUOTE format"),
            ));
        };

        for part in [base, quote] {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ValidationError::new(
                    "symbol",
                    format!("'{raw}' is not in BASE-QUOTE format"),
                ));
            }
        }
        if base == quote {
            return Err(ValidationError::new(
                "symbol",
                format!("'{raw}' trades an asset against itself"),
            ));
        }

        Ok(Self {
            base: base.to_string(),
            quote: quote.to_string(),
        })
    }

    /// The asset being bought or sold
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The asset used to price the base
    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}
