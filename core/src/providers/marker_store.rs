//! Low-latency markers: completed purchases and dispatch outcomes.

use super::ProviderFuture;
use crate::types::{DispatchOutcome, ItemId, OrderId, UserId};
use std::time::Duration;

/// Key/expiry storage for per-(user, item) markers.
///
/// The completed-purchase marker here is a cache of the durable purchase row
/// written inside the commit transaction; readers fall back to the inventory
/// store when it is missing.
pub trait MarkerStore: Send + Sync {
    /// Order id recorded for (user, item), if any.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn purchase_marker(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<OrderId>>;

    /// Record the committed order for (user, item).
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn set_purchase_marker(
        &self,
        user: UserId,
        item: ItemId,
        order: OrderId,
    ) -> ProviderFuture<'_, ()>;

    /// Latest dispatch outcome for (user, item), if any and not expired.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn outcome(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<DispatchOutcome>>;

    /// Record a dispatch outcome that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn set_outcome(
        &self,
        user: UserId,
        item: ItemId,
        outcome: DispatchOutcome,
        ttl: Duration,
    ) -> ProviderFuture<'_, ()>;
}
