//! Three-tier admission filter: process-local sold-out flag, shared stock
//! counter, and the authoritative row (consulted only to seed the counter).
//!
//! Nothing here decides a sale. An admitted request still has to pass the
//! conditional update in the inventory store; the gate only turns away
//! requests that cannot possibly succeed before any lock or transaction is
//! attempted.

use crate::metrics::{AdmissionMetrics, CommitMetrics};
use dashmap::DashSet;
use flashgate_core::providers::{InventoryStore, MarkerStore, StockCounter};
use flashgate_core::{FlashSaleError, Item, ItemId, Result, UserId};
use std::sync::Arc;

/// A unit reserved on the shared counter.
///
/// The holder either commits it (the authoritative row is decremented) or
/// hands it back with [`StockGate::release`]. In queued mode the reservation
/// travels with the purchase message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    /// Reserved item.
    pub item_id: ItemId,
    /// Counter value after the reservation.
    pub remaining: i64,
}

/// Admission filter in front of the commit path.
pub struct StockGate {
    counter: Arc<dyn StockCounter>,
    markers: Arc<dyn MarkerStore>,
    inventory: Arc<dyn InventoryStore>,
    sold_out: DashSet<ItemId>,
}

impl StockGate {
    /// Create a gate.
    #[must_use]
    pub fn new(
        counter: Arc<dyn StockCounter>,
        markers: Arc<dyn MarkerStore>,
        inventory: Arc<dyn InventoryStore>,
    ) -> Self {
        Self {
            counter,
            markers,
            inventory,
            sold_out: DashSet::new(),
        }
    }

    /// Run the admission steps for (user, item), short-circuiting on the
    /// first rejection.
    ///
    /// # Errors
    ///
    /// - [`FlashSaleError::AlreadyPurchased`] if a purchase marker exists
    /// - [`FlashSaleError::NoStock`] if the local flag or the counter says empty
    /// - [`FlashSaleError::ItemNotFound`] if the counter must be seeded and the item does not exist
    /// - [`FlashSaleError::Infrastructure`] if a store fails
    pub async fn admit(&self, user: UserId, item: ItemId) -> Result<Reservation> {
        if let Some(order_id) = self.markers.purchase_marker(user, item).await? {
            AdmissionMetrics::record("already_purchased");
            return Err(FlashSaleError::AlreadyPurchased { order_id });
        }

        if self.sold_out.contains(&item) {
            AdmissionMetrics::record("sold_out_local");
            return Err(FlashSaleError::NoStock);
        }

        let remaining = match self.counter.decrement(item).await? {
            Some(remaining) => remaining,
            None => {
                self.seed(item).await?;
                self.counter.decrement(item).await?.ok_or_else(|| {
                    FlashSaleError::Infrastructure(format!(
                        "stock counter for item {item} vanished after seeding"
                    ))
                })?
            }
        };

        if remaining < 0 {
            self.sold_out.insert(item);
            self.counter.clamp_to_zero(item).await?;
            tracing::info!(item_id = %item, "Stock counter depleted");
            AdmissionMetrics::record("sold_out");
            return Err(FlashSaleError::NoStock);
        }

        AdmissionMetrics::record("admitted");
        Ok(Reservation {
            item_id: item,
            remaining,
        })
    }

    /// Hand a reservation back to the shared counter.
    ///
    /// Failure is logged with enough context for manual reconciliation; the
    /// counter is advisory, so it is never surfaced to the caller.
    pub async fn release(&self, user: UserId, item: ItemId, reason: &'static str) {
        match self.counter.increment(item).await {
            Ok(None) => {
                tracing::debug!(
                    user_id = %user,
                    item_id = %item,
                    reason,
                    "Counter not seeded; nothing to release"
                );
            }
            Ok(Some(value)) => {
                CommitMetrics::record_compensation();
                tracing::debug!(
                    user_id = %user,
                    item_id = %item,
                    reason,
                    counter = value,
                    "Reservation released"
                );
            }
            Err(err) => {
                tracing::error!(
                    user_id = %user,
                    item_id = %item,
                    reason,
                    error = %err,
                    "Failed to release reservation; stock counter needs reconciliation"
                );
            }
        }
    }

    /// Record that the authoritative row reported no stock for `item`.
    pub fn mark_sold_out(&self, item: ItemId) {
        self.sold_out.insert(item);
    }

    /// Whether this process believes `item` is sold out.
    #[must_use]
    pub fn is_marked_sold_out(&self, item: ItemId) -> bool {
        self.sold_out.contains(&item)
    }

    /// Seed counters for `items` and clear the local flag of items that
    /// still have stock.
    ///
    /// Returns how many counters this call seeded.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Infrastructure`] if the counter store fails.
    pub async fn warm_up(&self, items: &[Item]) -> Result<usize> {
        let mut seeded = 0;
        for item in items {
            if self
                .counter
                .seed_if_absent(item.id, item.remaining_stock)
                .await?
            {
                seeded += 1;
            }
            if item.remaining_stock > 0 {
                self.sold_out.remove(&item.id);
            } else {
                self.sold_out.insert(item.id);
            }
        }
        tracing::info!(items = items.len(), seeded, "Stock counters warmed up");
        Ok(seeded)
    }

    async fn seed(&self, item: ItemId) -> Result<()> {
        let row = self
            .inventory
            .item(item)
            .await?
            .ok_or(FlashSaleError::ItemNotFound)?;
        if self
            .counter
            .seed_if_absent(item, row.remaining_stock)
            .await?
        {
            tracing::info!(
                item_id = %item,
                stock = row.remaining_stock,
                "Stock counter seeded on first access"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use flashgate_core::OrderId;
    use flashgate_testing::fixtures::open_item;
    use flashgate_testing::mocks::{InMemoryInventory, InMemoryMarkerStore, InMemoryStockCounter};

    struct Harness {
        gate: StockGate,
        counter: InMemoryStockCounter,
        markers: InMemoryMarkerStore,
    }

    fn harness(stock: i64) -> Harness {
        let counter = InMemoryStockCounter::new();
        let markers = InMemoryMarkerStore::new();
        let inventory = InMemoryInventory::new();
        inventory.insert_item(open_item(ItemId(1), stock));
        let gate = StockGate::new(
            Arc::new(counter.clone()),
            Arc::new(markers.clone()),
            Arc::new(inventory),
        );
        Harness {
            gate,
            counter,
            markers,
        }
    }

    #[tokio::test]
    async fn seeds_on_first_access_then_decrements() {
        let h = harness(2);
        let first = h.gate.admit(UserId(1), ItemId(1)).await.unwrap();
        assert_eq!(first.remaining, 1);
        let second = h.gate.admit(UserId(2), ItemId(1)).await.unwrap();
        assert_eq!(second.remaining, 0);
    }

    #[tokio::test]
    async fn depletion_sets_flag_and_clamps_counter() {
        let h = harness(1);
        let _ = h.gate.admit(UserId(1), ItemId(1)).await.unwrap();

        assert_eq!(h.gate.admit(UserId(2), ItemId(1)).await, Err(FlashSaleError::NoStock));
        assert!(h.gate.is_marked_sold_out(ItemId(1)));
        assert_eq!(h.counter.current(ItemId(1)).await.unwrap(), Some(0));

        // Local flag short-circuits without touching the counter again.
        assert_eq!(h.gate.admit(UserId(3), ItemId(1)).await, Err(FlashSaleError::NoStock));
        assert_eq!(h.counter.current(ItemId(1)).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn purchase_marker_rejects_before_counter() {
        let h = harness(5);
        h.markers
            .set_purchase_marker(UserId(1), ItemId(1), OrderId(9))
            .await
            .unwrap();

        assert_eq!(
            h.gate.admit(UserId(1), ItemId(1)).await,
            Err(FlashSaleError::AlreadyPurchased { order_id: OrderId(9) })
        );
        assert_eq!(h.counter.current(ItemId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_returns_unit_to_counter() {
        let h = harness(1);
        let reservation = h.gate.admit(UserId(1), ItemId(1)).await.unwrap();
        h.gate.release(UserId(1), reservation.item_id, "test").await;
        assert_eq!(h.counter.current(ItemId(1)).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn unknown_item_is_rejected_not_crashed() {
        let h = harness(1);
        assert_eq!(
            h.gate.admit(UserId(1), ItemId(404)).await,
            Err(FlashSaleError::ItemNotFound)
        );
    }

    #[tokio::test]
    async fn warm_up_seeds_once_and_resets_flags() {
        let h = harness(3);
        h.gate.mark_sold_out(ItemId(1));
        let items = vec![open_item(ItemId(1), 3), open_item(ItemId(2), 0)];

        assert_eq!(h.gate.warm_up(&items).await.unwrap(), 2);
        assert_eq!(h.gate.warm_up(&items).await.unwrap(), 0);
        assert!(!h.gate.is_marked_sold_out(ItemId(1)));
        assert!(h.gate.is_marked_sold_out(ItemId(2)));
    }

    #[tokio::test]
    async fn counter_outage_is_infrastructure_failure() {
        let h = harness(1);
        h.counter.set_unavailable(true);
        let err = h.gate.admit(UserId(1), ItemId(1)).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
