//! In-memory authoritative inventory.

use super::guard;
use chrono::Utc;
use flashgate_core::providers::{CommitOutcome, InventoryStore, ProviderFuture};
use flashgate_core::{Item, ItemId, Order, OrderId, OrderStatus, StoreError, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<ItemId, Item>,
    orders: BTreeMap<OrderId, Order>,
    purchases: HashMap<(UserId, ItemId), OrderId>,
    next_order_id: i64,
}

/// In-memory [`InventoryStore`].
///
/// `commit_purchase` runs entirely under one mutex, which gives it the same
/// all-or-nothing behaviour as the relational transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<Mutex<State>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryInventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an item.
    pub fn insert_item(&self, item: Item) {
        if let Ok(mut state) = guard(&self.state) {
            state.items.insert(item.id, item);
        }
    }

    /// Authoritative stock of an item.
    #[must_use]
    pub fn remaining_stock(&self, item: ItemId) -> Option<i64> {
        guard(&self.state)
            .ok()?
            .items
            .get(&item)
            .map(|i| i.remaining_stock)
    }

    /// Every order committed so far.
    #[must_use]
    pub fn all_orders(&self) -> Vec<Order> {
        guard(&self.state)
            .map(|s| s.orders.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("inventory offline".into()));
        }
        Ok(())
    }
}

impl InventoryStore for InMemoryInventory {
    fn item(&self, item: ItemId) -> ProviderFuture<'_, Option<Item>> {
        Box::pin(async move {
            self.check()?;
            Ok(guard(&self.state)?.items.get(&item).cloned())
        })
    }

    fn items(&self) -> ProviderFuture<'_, Vec<Item>> {
        Box::pin(async move {
            self.check()?;
            Ok(guard(&self.state)?.items.values().cloned().collect())
        })
    }

    fn purchase_of(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<OrderId>> {
        Box::pin(async move {
            self.check()?;
            Ok(guard(&self.state)?.purchases.get(&(user, item)).copied())
        })
    }

    fn commit_purchase(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, CommitOutcome> {
        Box::pin(async move {
            self.check()?;
            let mut state = guard(&self.state)?;

            if let Some(existing) = state.purchases.get(&(user, item)) {
                return Ok(CommitOutcome::AlreadyPurchased(*existing));
            }

            let Some(row) = state.items.get_mut(&item) else {
                return Ok(CommitOutcome::ItemMissing);
            };
            if row.remaining_stock <= 0 {
                return Ok(CommitOutcome::SoldOut);
            }
            row.remaining_stock -= 1;
            let (item_name, price) = (row.name.clone(), row.price);

            state.next_order_id += 1;
            let order = Order {
                id: OrderId(state.next_order_id),
                user_id: user,
                item_id: item,
                item_name,
                price,
                quantity: 1,
                status: OrderStatus::Unpaid,
                created_at: Utc::now(),
                paid_at: None,
            };
            state.orders.insert(order.id, order.clone());
            state.purchases.insert((user, item), order.id);

            Ok(CommitOutcome::Committed(order))
        })
    }

    fn order(&self, order: OrderId) -> ProviderFuture<'_, Option<Order>> {
        Box::pin(async move {
            self.check()?;
            Ok(guard(&self.state)?.orders.get(&order).cloned())
        })
    }

    fn orders_for(&self, user: UserId) -> ProviderFuture<'_, Vec<Order>> {
        Box::pin(async move {
            self.check()?;
            let state = guard(&self.state)?;
            Ok(state
                .orders
                .values()
                .rev()
                .filter(|o| o.user_id == user)
                .cloned()
                .collect())
        })
    }
}
