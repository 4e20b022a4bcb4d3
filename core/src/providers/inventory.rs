//! Authoritative inventory and order storage.

use super::ProviderFuture;
use crate::types::{Item, ItemId, Order, OrderId, UserId};

/// Result of the transactional purchase commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Stock decremented, order and purchase row inserted.
    Committed(Order),
    /// The conditional decrement affected zero rows.
    SoldOut,
    /// A purchase row already exists for (user, item); nothing changed.
    AlreadyPurchased(OrderId),
    /// The item row does not exist.
    ItemMissing,
}

/// Relational store holding the item stock rows, orders and purchase rows.
///
/// # Implementation Notes
///
/// **CRITICAL**: `commit_purchase()` must group, all-or-nothing:
/// 1. `remaining_stock = remaining_stock - 1 WHERE id = ? AND remaining_stock > 0`
/// 2. the order insert
/// 3. the purchase row insert, unique on (user, item)
///
/// The unique purchase row is the durable completed-purchase marker. A
/// violation of it must roll back steps 1 and 2 and report
/// [`CommitOutcome::AlreadyPurchased`].
pub trait InventoryStore: Send + Sync {
    /// Load one item.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    fn item(&self, item: ItemId) -> ProviderFuture<'_, Option<Item>>;

    /// Load all items, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    fn items(&self) -> ProviderFuture<'_, Vec<Item>>;

    /// Order id of the durable purchase row for (user, item), if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    fn purchase_of(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<OrderId>>;

    /// Decrement stock and create the order in one transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails; the transaction is then rolled back.
    fn commit_purchase(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, CommitOutcome>;

    /// Load one order.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    fn order(&self, order: OrderId) -> ProviderFuture<'_, Option<Order>>;

    /// All orders of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    fn orders_for(&self, user: UserId) -> ProviderFuture<'_, Vec<Order>>;
}
