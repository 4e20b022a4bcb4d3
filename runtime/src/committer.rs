//! Transactional order creation.
//!
//! The commit runs under the per-item lock when the lock store is reachable.
//! When it is not, the inventory store's conditional update is the only
//! guard, which is still enough to never oversell; the lock only reduces
//! contention on the stock row.
//!
//! The locked section runs on its own task. A caller that goes away mid-commit
//! (a dropped HTTP request, a cancelled worker) stops waiting for the result,
//! but the lock is still released and the reservation still settled.

use crate::lock::{LockError, LockManager};
use crate::metrics::CommitMetrics;
use crate::stock_gate::StockGate;
use flashgate_core::providers::{CommitOutcome, InventoryStore, MarkerStore};
use flashgate_core::{FlashSaleError, ItemId, Order, OrderId, Result, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Commits admitted purchases against the authoritative store.
///
/// On a definitive failure (sold out, already purchased, item missing) the
/// reservation taken by the stock gate is handed back here. On a retryable
/// failure ([`FlashSaleError::LockTimeout`] or an infrastructure error) the
/// reservation stays with the caller, who either retries or calls
/// [`abandon`](Self::abandon).
pub struct OrderCommitter {
    inventory: Arc<dyn InventoryStore>,
    markers: Arc<dyn MarkerStore>,
    locks: LockManager,
    stock_gate: Arc<StockGate>,
}

impl OrderCommitter {
    /// Create a committer.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        markers: Arc<dyn MarkerStore>,
        locks: LockManager,
        stock_gate: Arc<StockGate>,
    ) -> Self {
        Self {
            inventory,
            markers,
            locks,
            stock_gate,
        }
    }

    /// Admit `user` through the stock gate and commit the purchase.
    ///
    /// A retryable commit failure hands the reservation back before
    /// returning, so the caller holds nothing afterwards.
    ///
    /// # Errors
    ///
    /// Stock-gate rejections, or any error of [`commit`](Self::commit).
    pub async fn purchase(self: &Arc<Self>, user: UserId, item: ItemId) -> Result<Order> {
        let committer = Arc::clone(self);
        detached(async move {
            let _reservation = committer.stock_gate.admit(user, item).await?;
            match committer.commit_locked(user, item).await {
                Err(err) if err.is_retryable() => {
                    committer.abandon(user, item, "commit_retryable").await;
                    Err(err)
                }
                outcome => outcome,
            }
        })
        .await
    }

    /// Decrement authoritative stock and create the order for (user, item).
    ///
    /// # Errors
    ///
    /// - [`FlashSaleError::CommitFailure`] if the conditional decrement found no stock while the lock was held
    /// - [`FlashSaleError::NoStock`] for the same outcome without the lock
    /// - [`FlashSaleError::AlreadyPurchased`] if the durable purchase row exists
    /// - [`FlashSaleError::ItemNotFound`] if the item row is missing
    /// - [`FlashSaleError::LockTimeout`] if the lock stayed contended after one retry
    /// - [`FlashSaleError::Infrastructure`] if the inventory store fails (the transaction is rolled back)
    pub async fn commit(self: &Arc<Self>, user: UserId, item: ItemId) -> Result<Order> {
        let committer = Arc::clone(self);
        detached(async move { committer.commit_locked(user, item).await }).await
    }

    async fn commit_locked(&self, user: UserId, item: ItemId) -> Result<Order> {
        let key = LockManager::item_key(item);
        let guard = match self.locks.acquire(&key).await {
            Ok(guard) => Some(guard),
            Err(LockError::Contended(_)) => {
                tracing::debug!(user_id = %user, item_id = %item, "Item lock contended");
                return Err(FlashSaleError::LockTimeout);
            }
            Err(LockError::Unavailable(err)) => {
                tracing::warn!(
                    user_id = %user,
                    item_id = %item,
                    error = %err,
                    "Lock store unavailable, committing under the conditional update alone"
                );
                None
            }
        };
        let locked = guard.is_some();

        let started = Instant::now();
        let outcome = self.inventory.commit_purchase(user, item).await;
        let elapsed = started.elapsed();

        if let Some(guard) = guard {
            self.locks.release(guard).await;
        }

        match outcome {
            Ok(CommitOutcome::Committed(order)) => {
                CommitMetrics::record("committed", elapsed);
                tracing::info!(
                    user_id = %user,
                    item_id = %item,
                    order_id = %order.id,
                    locked,
                    "Order committed"
                );
                self.write_marker(user, item, order.id).await;
                Ok(order)
            }
            Ok(CommitOutcome::AlreadyPurchased(order_id)) => {
                CommitMetrics::record("already_purchased", elapsed);
                self.write_marker(user, item, order_id).await;
                self.abandon(user, item, "already_purchased").await;
                Err(FlashSaleError::AlreadyPurchased { order_id })
            }
            Ok(CommitOutcome::SoldOut) => {
                CommitMetrics::record("sold_out", elapsed);
                tracing::info!(
                    user_id = %user,
                    item_id = %item,
                    locked,
                    "Authoritative stock exhausted"
                );
                self.stock_gate.mark_sold_out(item);
                self.abandon(user, item, "sold_out").await;
                Err(if locked {
                    FlashSaleError::CommitFailure
                } else {
                    FlashSaleError::NoStock
                })
            }
            Ok(CommitOutcome::ItemMissing) => {
                CommitMetrics::record("item_missing", elapsed);
                self.abandon(user, item, "item_missing").await;
                Err(FlashSaleError::ItemNotFound)
            }
            Err(err) => {
                CommitMetrics::record("error", elapsed);
                tracing::error!(
                    user_id = %user,
                    item_id = %item,
                    error = %err,
                    "Commit transaction failed"
                );
                Err(err.into())
            }
        }
    }

    /// Give up on a reservation that will not be committed.
    pub async fn abandon(&self, user: UserId, item: ItemId, reason: &'static str) {
        self.stock_gate.release(user, item, reason).await;
    }

    /// Cache the durable purchase row. The row itself was written inside the
    /// transaction, so a failure here only costs a slower duplicate check.
    async fn write_marker(&self, user: UserId, item: ItemId, order: OrderId) {
        if let Err(err) = self.markers.set_purchase_marker(user, item, order).await {
            tracing::warn!(
                user_id = %user,
                item_id = %item,
                order_id = %order,
                error = %err,
                "Failed to cache purchase marker"
            );
        }
    }
}

/// Run `work` on its own task and wait for it.
async fn detached<F>(work: F) -> Result<Order>
where
    F: Future<Output = Result<Order>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|err| FlashSaleError::Infrastructure(format!("Commit task failed: {err}")))?
}
