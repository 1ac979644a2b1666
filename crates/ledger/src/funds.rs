use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bourse_core::{Balance, BalanceError, BalanceKey, TradeKey, UserId, ValidationError};
use bourse_ports::{FillInstruction, FundsLedger, LedgerError, LedgerResult};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;

type Row = Arc<Mutex<Balance>>;

/// One movement applied to a staged balance during a fill
enum Leg {
    DebitLocked(Decimal),
    Unlock(Decimal),
    Credit(Decimal),
}

/// In-memory funds ledger
///
/// Each (user, asset) row sits behind its own mutex, which plays the role
/// of a pessimistic row lock. Multi-row fills lock every row they touch in
/// `BalanceKey` order, stage the changes on copies and only write them back
/// once every leg has succeeded.
pub struct InMemoryFundsLedger {
    rows: Arc<DashMap<BalanceKey, Row>>,
    /// Trade keys whose fill has been applied
    applied_fills: Arc<DashSet<TradeKey>>,
    /// Rows excluded from automated processing, with the reason
    halted: Arc<DashMap<BalanceKey, String>>,
}

impl InMemoryFundsLedger {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            applied_fills: Arc::new(DashSet::new()),
            halted: Arc::new(DashMap::new()),
        }
    }

    /// Halted rows with the reason each was halted
    pub fn halted(&self) -> Vec<(BalanceKey, String)> {
        let mut halted: Vec<_> = self
            .halted
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        halted.sort();
        halted
    }

    fn row(&self, key: &BalanceKey) -> Row {
        if let Some(row) = self.rows.get(key) {
            return row.value().clone();
        }

        self.rows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Balance::zero(key))))
            .value()
            .clone()
    }

    fn ensure_running(&self, key: &BalanceKey) -> LedgerResult<()> {
        if self.halted.contains_key(key) {
            return Err(LedgerError::Halted(key.clone()));
        }
        Ok(())
    }

    /// Run `op` on one row under its lock
    fn with_row<F>(&self, key: &BalanceKey, op: F) -> LedgerResult<Balance>
    where
        F: FnOnce(&mut Balance) -> Result<(), BalanceError>,
    {
        let row = self.row(key);
        let mut balance = row.lock();
        self.ensure_running(key)?;

        let mut staged = balance.clone();
        if let Err(err) = op(&mut staged) {
            let err = ledger_error(key, err);
            if err.is_fatal() {
                self.halt(key, &err.to_string());
            }
            return Err(err);
        }

        *balance = staged;
        Ok(balance.clone())
    }

    fn transfer(&self, trade: Option<&TradeKey>, fill: &FillInstruction) -> LedgerResult<bool> {
        ensure_positive(fill.base_amount, "base_amount")?;
        ensure_positive(fill.quote_amount, "quote_amount")?;
        if fill.buyer_refund < Decimal::ZERO {
            return Err(ValidationError::new("buyer_refund", "must not be negative").into());
        }

        let buyer_quote = balance_key(fill.buyer, &fill.quote_asset)?;
        let seller_quote = balance_key(fill.seller, &fill.quote_asset)?;
        let seller_base = balance_key(fill.seller, &fill.base_asset)?;
        let buyer_base = balance_key(fill.buyer, &fill.base_asset)?;

        // One row per distinct key, locked in key order
        let rows: BTreeMap<BalanceKey, Row> = [&buyer_quote, &seller_quote, &seller_base, &buyer_base]
            .into_iter()
            .map(|key| (key.clone(), self.row(key)))
            .collect();
        let mut guards: BTreeMap<&BalanceKey, MutexGuard<'_, Balance>> =
            rows.iter().map(|(key, row)| (key, row.lock())).collect();

        for key in guards.keys() {
            self.ensure_running(key)?;
        }
        if let Some(trade) = trade {
            if self.applied_fills.contains(trade) {
                log::debug!("Fill for trade {} already applied", trade);
                return Ok(false);
            }
        }

        let mut staged: BTreeMap<BalanceKey, Balance> = guards
            .iter()
            .map(|(key, balance)| ((*key).clone(), (**balance).clone()))
            .collect();

        let legs = [
            (&buyer_quote, Leg::DebitLocked(fill.quote_amount)),
            (&buyer_quote, Leg::Unlock(fill.buyer_refund)),
            (&seller_quote, Leg::Credit(fill.quote_amount)),
            (&seller_base, Leg::DebitLocked(fill.base_amount)),
            (&buyer_base, Leg::Credit(fill.base_amount)),
        ];
        for (key, leg) in legs {
            let Some(balance) = staged.get_mut(key) else {
                continue;
            };
            let outcome = match leg {
                Leg::DebitLocked(amount) => balance.debit_locked(amount),
                Leg::Unlock(amount) => balance.unlock(amount),
                Leg::Credit(amount) => balance.credit(amount),
            };
            if let Err(err) = outcome {
                let err = ledger_error(key, err);
                if err.is_fatal() {
                    self.halt(key, &err.to_string());
                }
                return Err(err);
            }
        }

        for (key, guard) in guards.iter_mut() {
            if let Some(balance) = staged.remove(*key) {
                **guard = balance;
            }
        }
        if let Some(trade) = trade {
            self.applied_fills.insert(*trade);
        }

        log::debug!(
            "Fill applied: {} {} {} -> {}, {} {} {} -> {}",
            fill.base_amount,
            fill.base_asset,
            fill.seller,
            fill.buyer,
            fill.quote_amount,
            fill.quote_asset,
            fill.buyer,
            fill.seller
        );
        Ok(true)
    }
}

impl Default for InMemoryFundsLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryFundsLedger {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            applied_fills: Arc::clone(&self.applied_fills),
            halted: Arc::clone(&self.halted),
        }
    }
}

fn ensure_positive(amount: Decimal, field: &'static str) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::new(field, format!("{amount} must be positive")));
    }
    Ok(())
}

fn balance_key(user: UserId, asset: &str) -> Result<BalanceKey, ValidationError> {
    let asset = asset.trim();
    if asset.is_empty() || !asset.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::new(
            "asset",
            format!("'{asset}' is not an asset code"),
        ));
    }
    Ok(BalanceKey::new(user, asset))
}

fn ledger_error(key: &BalanceKey, err: BalanceError) -> LedgerError {
    match err {
        BalanceError::InsufficientAvailable { needed, available } => {
            LedgerError::InsufficientFunds {
                key: key.clone(),
                needed,
                available,
            }
        }
        BalanceError::InsufficientLocked { needed, locked } => {
            LedgerError::InsufficientLockedFunds {
                key: key.clone(),
                needed,
                locked,
            }
        }
        BalanceError::Overflow { amount, .. } => LedgerError::Overflow {
            key: key.clone(),
            amount,
        },
    }
}

#[async_trait]
impl FundsLedger for InMemoryFundsLedger {
    async fn get_or_create_balance(&self, user: UserId, asset: &str) -> LedgerResult<Balance> {
        let key = balance_key(user, asset)?;
        let row = self.row(&key);
        let balance = row.lock().clone();
        Ok(balance)
    }

    async fn lock_funds(
        &self,
        user: UserId,
        asset: &str,
        amount: Decimal,
    ) -> LedgerResult<Balance> {
        ensure_positive(amount, "amount")?;
        let key = balance_key(user, asset)?;
        let balance = self.with_row(&key, |b| b.lock(amount))?;
        log::debug!("Locked {} {} for {}", amount, key.asset, user);
        Ok(balance)
    }

    async fn unlock_funds(
        &self,
        user: UserId,
        asset: &str,
        amount: Decimal,
    ) -> LedgerResult<Balance> {
        ensure_positive(amount, "amount")?;
        let key = balance_key(user, asset)?;
        let balance = self.with_row(&key, |b| b.unlock(amount))?;
        log::debug!("Unlocked {} {} for {}", amount, key.asset, user);
        Ok(balance)
    }

    async fn apply_fill(
        &self,
        buyer: UserId,
        seller: UserId,
        base_asset: &str,
        quote_asset: &str,
        base_amount: Decimal,
        quote_amount: Decimal,
    ) -> LedgerResult<()> {
        let fill = FillInstruction {
            buyer,
            seller,
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            base_amount,
            quote_amount,
            buyer_refund: Decimal::ZERO,
        };
        self.transfer(None, &fill).map(|_| ())
    }

    async fn settle_fill(&self, key: &TradeKey, fill: &FillInstruction) -> LedgerResult<bool> {
        self.transfer(Some(key), fill)
    }

    async fn deposit(&self, user: UserId, asset: &str, amount: Decimal) -> LedgerResult<Balance> {
        ensure_positive(amount, "amount")?;
        let key = balance_key(user, asset)?;
        let balance = self.with_row(&key, |b| b.credit(amount))?;
        log::info!("Deposited {} {} for {}", amount, key.asset, user);
        Ok(balance)
    }

    async fn withdraw(
        &self,
        user: UserId,
        asset: &str,
        amount: Decimal,
    ) -> LedgerResult<Balance> {
        ensure_positive(amount, "amount")?;
        let key = balance_key(user, asset)?;
        let balance = self.with_row(&key, |b| b.debit_available(amount))?;
        log::info!("Withdrew {} {} for {}", amount, key.asset, user);
        Ok(balance)
    }

    async fn balances(&self, user: UserId) -> LedgerResult<Vec<Balance>> {
        let rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|e| e.key().user == user)
            .map(|e| e.value().clone())
            .collect();

        let mut balances: Vec<Balance> = rows.iter().map(|row| row.lock().clone()).collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(balances)
    }

    fn halt(&self, key: &BalanceKey, reason: &str) {
        log::error!("CRITICAL: balance {} halted for reconciliation: {}", key, reason);
        self.halted.insert(key.clone(), reason.to_string());
    }

    fn resume(&self, key: &BalanceKey) -> bool {
        let was_halted = self.halted.remove(key).is_some();
        if was_halted {
            log::warn!("Balance {} resumed after reconciliation", key);
        }
        was_halted
    }

    fn is_halted(&self, key: &BalanceKey) -> bool {
        self.halted.contains_key(key)
    }
}
