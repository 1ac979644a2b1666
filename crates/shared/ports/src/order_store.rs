use async_trait::async_trait;
use bourse_core::{Order, OrderId, Quantity, Timestamp, TradeKey, UserId};

use crate::error::StoreResult;

/// Port for durable order records
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Record a new order; duplicate ids are a conflict
    async fn insert(&self, order: Order) -> StoreResult<()>;

    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Apply a settled execution, at most once per trade key
    async fn apply_fill(
        &self,
        id: OrderId,
        key: &TradeKey,
        quantity: Quantity,
        at: Timestamp,
    ) -> StoreResult<Order>;

    /// Move to cancelled, removing `quantity` from the remainder
    async fn mark_cancelled(
        &self,
        id: OrderId,
        quantity: Quantity,
        at: Timestamp,
    ) -> StoreResult<Order>;

    /// Every order of `user`, oldest first
    async fn orders_for_user(&self, user: UserId) -> StoreResult<Vec<Order>>;

    /// Open and partially filled orders, in acceptance order
    async fn active_orders(&self) -> StoreResult<Vec<Order>>;
}
