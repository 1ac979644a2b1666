use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bourse_core::{Order, OrderId, Quantity, Timestamp, TradeKey, UserId};
use bourse_ports::{OrderStore, StoreError, StoreResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

struct StoredOrder {
    /// Acceptance order, used to rebuild books in arrival order
    accepted: u64,
    order: Order,
    applied_fills: HashSet<TradeKey>,
}

/// In-memory order store
///
/// Each record is updated under its DashMap shard lock, so concurrent
/// fills and cancellations of the same order are serialized.
pub struct InMemoryOrderStore {
    orders: Arc<DashMap<OrderId, StoredOrder>>,
    next_accepted: Arc<AtomicU64>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            next_accepted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn sorted(&self, filter: impl Fn(&Order) -> bool) -> Vec<Order> {
        let mut matching: Vec<(u64, Order)> = self
            .orders
            .iter()
            .filter(|e| filter(&e.value().order))
            .map(|e| (e.value().accepted, e.value().order.clone()))
            .collect();
        matching.sort_by_key(|(accepted, _)| *accepted);
        matching.into_iter().map(|(_, order)| order).collect()
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryOrderStore {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
            next_accepted: Arc::clone(&self.next_accepted),
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> StoreResult<()> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(order.id)),
            Entry::Vacant(slot) => {
                log::debug!("Recording order {} for {}", order.id, order.owner);
                slot.insert(StoredOrder {
                    accepted: self.next_accepted.fetch_add(1, Ordering::SeqCst),
                    order,
                    applied_fills: HashSet::new(),
                });
                Ok(())
            }
        }
    }

    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.orders.get(&id).map(|e| e.value().order.clone()))
    }

    async fn apply_fill(
        &self,
        id: OrderId,
        key: &TradeKey,
        quantity: Quantity,
        at: Timestamp,
    ) -> StoreResult<Order> {
        let mut stored = self.orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if stored.applied_fills.contains(key) {
            return Ok(stored.order.clone());
        }

        stored
            .order
            .fill(quantity, at)
            .map_err(|e| StoreError::InvalidTransition {
                id,
                reason: e.to_string(),
            })?;
        stored.applied_fills.insert(*key);
        log::debug!(
            "Order {} filled {} ({:?}, {} remaining)",
            id,
            quantity,
            stored.order.status,
            stored.order.remaining_quantity
        );
        Ok(stored.order.clone())
    }

    async fn mark_cancelled(
        &self,
        id: OrderId,
        quantity: Quantity,
        at: Timestamp,
    ) -> StoreResult<Order> {
        let mut stored = self.orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        stored
            .order
            .cancel(quantity, at)
            .map_err(|e| StoreError::InvalidTransition {
                id,
                reason: e.to_string(),
            })?;
        Ok(stored.order.clone())
    }

    async fn orders_for_user(&self, user: UserId) -> StoreResult<Vec<Order>> {
        Ok(self.sorted(|order| order.owner == user))
    }

    async fn active_orders(&self) -> StoreResult<Vec<Order>> {
        Ok(self.sorted(|order| order.status.is_active()))
    }
}
