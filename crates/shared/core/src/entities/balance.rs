use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::values::{Asset, UserId};

/// Ledger row identity: one balance per (user, asset)
///
/// The derived ordering is the global lock order for multi-row updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub user: UserId,
    pub asset: Asset,
}

impl BalanceKey {
    pub fn new(user: UserId, asset: impl Into<Asset>) -> Self {
        Self {
            user,
            asset: asset.into().to_uppercase(),
        }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.asset)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("insufficient available: need {needed}, have {available}")]
    InsufficientAvailable { needed: Decimal, available: Decimal },

    #[error("insufficient locked: need {needed}, have {locked}")]
    InsufficientLocked { needed: Decimal, locked: Decimal },

    #[error("adding {amount} to {current} overflows")]
    Overflow { current: Decimal, amount: Decimal },
}

fn checked_sum(current: Decimal, amount: Decimal) -> Result<Decimal, BalanceError> {
    current
        .checked_add(amount)
        .ok_or(BalanceError::Overflow { current, amount })
}

/// Available and locked amounts of one asset for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user: UserId,
    pub asset: Asset,
    pub available: Decimal,
    pub locked: Decimal,
}

impl Balance {
    pub fn zero(key: &BalanceKey) -> Self {
        Self {
            user: key.user,
            asset: key.asset.clone(),
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey {
            user: self.user,
            asset: self.asset.clone(),
        }
    }

    /// Available plus locked, saturating at `Decimal::MAX`
    pub fn total(&self) -> Decimal {
        self.available.saturating_add(self.locked)
    }

    /// Move `amount` from available to locked
    pub fn lock(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if self.available < amount {
            return Err(BalanceError::InsufficientAvailable {
                needed: amount,
                available: self.available,
            });
        }
        let locked = checked_sum(self.locked, amount)?;
        self.available -= amount;
        self.locked = locked;
        Ok(())
    }

    /// Move `amount` from locked back to available
    pub fn unlock(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if self.locked < amount {
            return Err(BalanceError::InsufficientLocked {
                needed: amount,
                locked: self.locked,
            });
        }
        let available = checked_sum(self.available, amount)?;
        self.locked -= amount;
        self.available = available;
        Ok(())
    }

    /// Remove `amount` from locked; the value leaves this balance
    pub fn debit_locked(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if self.locked < amount {
            return Err(BalanceError::InsufficientLocked {
                needed: amount,
                locked: self.locked,
            });
        }
        self.locked -= amount;
        Ok(())
    }

    /// Remove `amount` from available; the value leaves this balance
    pub fn debit_available(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if self.available < amount {
            return Err(BalanceError::InsufficientAvailable {
                needed: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        self.available = checked_sum(self.available, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn funded(available: Decimal) -> Balance {
        let mut balance = Balance::zero(&BalanceKey::new(Uuid::new_v4(), "usd"));
        balance.credit(available).unwrap();
        balance
    }

    #[test]
    fn test_key_uppercases_asset() {
        let user = Uuid::new_v4();
        assert_eq!(BalanceKey::new(user, "usd"), BalanceKey::new(user, "USD"));
    }

    #[test]
    fn test_lock_and_unlock_conserve_total() {
        let mut balance = funded(dec!(100));
        balance.lock(dec!(40)).unwrap();
        assert_eq!(balance.available, dec!(60));
        assert_eq!(balance.locked, dec!(40));
        assert_eq!(balance.total(), dec!(100));

        balance.unlock(dec!(15)).unwrap();
        assert_eq!(balance.available, dec!(75));
        assert_eq!(balance.locked, dec!(25));
        assert_eq!(balance.total(), dec!(100));
    }

    #[test]
    fn test_failed_lock_leaves_balance_unchanged() {
        let mut balance = funded(dec!(10));
        let before = balance.clone();
        let err = balance.lock(dec!(10.01)).unwrap_err();
        assert!(matches!(err, BalanceError::InsufficientAvailable { .. }));
        assert_eq!(balance, before);
    }

    #[test]
    fn test_failed_unlock_leaves_balance_unchanged() {
        let mut balance = funded(dec!(10));
        balance.lock(dec!(5)).unwrap();
        let before = balance.clone();
        let err = balance.unlock(dec!(6)).unwrap_err();
        assert!(matches!(err, BalanceError::InsufficientLocked { .. }));
        assert_eq!(balance, before);
    }

    #[test]
    fn test_overflow_is_an_error_and_leaves_balance_unchanged() {
        let mut balance = funded(Decimal::MAX);
        let before = balance.clone();
        assert!(matches!(
            balance.credit(dec!(1)),
            Err(BalanceError::Overflow { .. })
        ));
        assert_eq!(balance, before);

        // Locked side full, available side still has room to move
        let mut balance = funded(Decimal::MAX);
        balance.lock(Decimal::MAX).unwrap();
        balance.credit(dec!(1)).unwrap();
        assert!(matches!(
            balance.lock(dec!(1)),
            Err(BalanceError::Overflow { .. })
        ));

        let mut balance = funded(dec!(1));
        balance.lock(dec!(1)).unwrap();
        balance.available = Decimal::MAX;
        let before = balance.clone();
        assert!(matches!(
            balance.unlock(dec!(1)),
            Err(BalanceError::Overflow { .. })
        ));
        assert_eq!(balance, before);
        assert_eq!(balance.total(), Decimal::MAX);
    }
}
