use bourse_core::{BalanceKey, OrderId, Timestamp, Trade, TradeKey};
use parking_lot::Mutex;
use serde::Serialize;

/// A condition that automation refused to resolve on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationIssue {
    pub raised_at: Timestamp,
    pub reason: String,
    pub trade: Option<TradeKey>,
    pub orders: Vec<OrderId>,
    pub balance: Option<BalanceKey>,
}

impl ReconciliationIssue {
    pub fn for_trade(trade: &Trade, reason: impl Into<String>, raised_at: Timestamp) -> Self {
        Self {
            raised_at,
            reason: reason.into(),
            trade: Some(trade.key()),
            orders: vec![trade.maker_order_id, trade.taker_order_id],
            balance: None,
        }
    }

    pub fn for_order(order: OrderId, reason: impl Into<String>, raised_at: Timestamp) -> Self {
        Self {
            raised_at,
            reason: reason.into(),
            trade: None,
            orders: vec![order],
            balance: None,
        }
    }

    pub fn with_balance(mut self, balance: BalanceKey) -> Self {
        self.balance = Some(balance);
        self
    }
}

/// Append-only list of issues awaiting manual reconciliation
#[derive(Default)]
pub struct ReconciliationRegistry {
    issues: Mutex<Vec<ReconciliationIssue>>,
}

impl ReconciliationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, issue: ReconciliationIssue) {
        log::error!(
            "CRITICAL: reconciliation required ({}), orders {:?}",
            issue.reason,
            issue.orders
        );
        self.issues.lock().push(issue);
    }

    pub fn issues(&self) -> Vec<ReconciliationIssue> {
        self.issues.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.issues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.lock().is_empty()
    }
}
