//! Configuration loading for the exchange service
//!
//! A single JSON document describes:
//! - Books to open at start-up
//! - Accounts with initial deposits
//! - Settlement retry policy
//! - Trade journal location
//! - Trade event queue sizing and overflow policy

use std::path::{Path, PathBuf};

use bourse_core::{Symbol, UserId};
use bourse_settlement::{OverflowPolicy, SettlementConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_name")]
    pub name: String,

    /// Symbols (`BASE-QUOTE`) whose books are created up front
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Accounts funded at start-up
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    #[serde(default)]
    pub settlement: SettlementConfig,

    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

fn default_exchange_name() -> String {
    "Bourse".to_string()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: default_exchange_name(),
            symbols: Vec::new(),
            accounts: Vec::new(),
            settlement: SettlementConfig::default(),
            journal: JournalConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl ExchangeConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_account(mut self, account: AccountConfig) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn with_settlement(mut self, settlement: SettlementConfig) -> Self {
        self.settlement = settlement;
        self
    }

    pub fn with_journal(mut self, journal: JournalConfig) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_events(mut self, events: EventsConfig) -> Self {
        self.events = events;
        self
    }

    /// Canonical symbols, failing on the first malformed one
    pub fn parsed_symbols(&self) -> Result<Vec<Symbol>, ConfigError> {
        self.symbols
            .iter()
            .map(|raw| {
                Symbol::parse(raw).map_err(|e| ConfigError::InvalidSymbol(format!("{raw}: {e}")))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_symbols()?;

        for account in &self.accounts {
            for deposit in &account.deposits {
                if deposit.amount <= Decimal::ZERO {
                    return Err(ConfigError::InvalidAccount(format!(
                        "deposit of {} {} for {} must be positive",
                        deposit.amount, deposit.asset, account.user
                    )));
                }
                if deposit.asset.trim().is_empty() {
                    return Err(ConfigError::InvalidAccount(format!(
                        "deposit for {} has no asset",
                        account.user
                    )));
                }
            }
        }

        if self.settlement.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "settlement.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Invalid(
                "events.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// An account and its opening deposits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub user: UserId,
    #[serde(default)]
    pub deposits: Vec<DepositConfig>,
}

impl AccountConfig {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            deposits: Vec::new(),
        }
    }

    pub fn with_deposit(mut self, asset: impl Into<String>, amount: Decimal) -> Self {
        self.deposits.push(DepositConfig {
            asset: asset.into(),
            amount,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositConfig {
    pub asset: String,
    pub amount: Decimal,
}

/// Trade journal location
///
/// Without a path the journal lives in memory and nothing survives a
/// restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// fsync after every append
    #[serde(default = "default_sync_on_append")]
    pub sync_on_append: bool,
}

fn default_sync_on_append() -> bool {
    true
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: None,
            sync_on_append: default_sync_on_append(),
        }
    }
}

impl JournalConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_sync_on_append(mut self, sync: bool) -> Self {
        self.sync_on_append = sync;
        self
    }
}

/// Trade-settled event queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_event_capacity() -> usize {
    10_000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl EventsConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid account config: {0}")]
    InvalidAccount(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
