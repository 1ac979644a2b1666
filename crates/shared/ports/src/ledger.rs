use async_trait::async_trait;
use bourse_core::{Asset, Balance, BalanceKey, TradeKey, UserId};
use rust_decimal::Decimal;

use crate::error::LedgerResult;

/// Balance movements for one settled trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillInstruction {
    pub buyer: UserId,
    pub seller: UserId,
    pub base_asset: Asset,
    pub quote_asset: Asset,
    /// Seller locked base -> buyer available base
    pub base_amount: Decimal,
    /// Buyer locked quote -> seller available quote
    pub quote_amount: Decimal,
    /// Buyer locked quote -> buyer available quote (price improvement)
    pub buyer_refund: Decimal,
}

/// Port for the persistent balance store
///
/// Every operation is atomic per (user, asset) row. `apply_fill` and
/// `settle_fill` are atomic across all rows they touch.
#[async_trait]
pub trait FundsLedger: Send + Sync {
    /// Idempotent; concurrent first callers observe the same row
    async fn get_or_create_balance(&self, user: UserId, asset: &str) -> LedgerResult<Balance>;

    /// Available -> locked, only if available covers `amount`
    async fn lock_funds(&self, user: UserId, asset: &str, amount: Decimal)
    -> LedgerResult<Balance>;

    /// Locked -> available; a shortfall halts the row
    async fn unlock_funds(
        &self,
        user: UserId,
        asset: &str,
        amount: Decimal,
    ) -> LedgerResult<Balance>;

    /// Two-sided transfer for one execution
    async fn apply_fill(
        &self,
        buyer: UserId,
        seller: UserId,
        base_asset: &str,
        quote_asset: &str,
        base_amount: Decimal,
        quote_amount: Decimal,
    ) -> LedgerResult<()>;

    /// `apply_fill` plus refund, applied at most once per trade key
    ///
    /// Returns `false` when the key was already applied.
    async fn settle_fill(&self, key: &TradeKey, fill: &FillInstruction) -> LedgerResult<bool>;

    /// External inflow
    async fn deposit(&self, user: UserId, asset: &str, amount: Decimal) -> LedgerResult<Balance>;

    /// External outflow, from available only
    async fn withdraw(&self, user: UserId, asset: &str, amount: Decimal)
    -> LedgerResult<Balance>;

    /// All balances held by `user`, ordered by asset
    async fn balances(&self, user: UserId) -> LedgerResult<Vec<Balance>>;

    /// Stop automated processing of a row
    fn halt(&self, key: &BalanceKey, reason: &str);

    /// Resume a halted row after manual repair; returns whether it was halted
    fn resume(&self, key: &BalanceKey) -> bool;

    fn is_halted(&self, key: &BalanceKey) -> bool;
}
