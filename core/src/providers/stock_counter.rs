//! Advisory shared stock counter.

use super::ProviderFuture;
use crate::types::ItemId;

/// Shared per-item counter used as an admission filter.
///
/// The counter may transiently diverge from the authoritative stock; only the
/// inventory store's conditional update decides whether a unit is really
/// sold.
pub trait StockCounter: Send + Sync {
    /// Seed the counter with `stock` if it has not been initialised.
    ///
    /// Returns `true` if this call performed the seeding.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn seed_if_absent(&self, item: ItemId, stock: i64) -> ProviderFuture<'_, bool>;

    /// Atomically decrement a seeded counter.
    ///
    /// Returns `None` without touching anything if the counter has not been
    /// seeded.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn decrement(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>>;

    /// Atomically increment a seeded counter (compensation).
    ///
    /// Returns `None` without creating the counter if it has not been
    /// seeded; the next seeding reads the authoritative value anyway.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn increment(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>>;

    /// Set the counter to zero if it is negative.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn clamp_to_zero(&self, item: ItemId) -> ProviderFuture<'_, ()>;

    /// Current value, `None` if not seeded.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn current(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>>;
}
