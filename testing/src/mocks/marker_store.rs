//! In-memory purchase and outcome markers.

use super::{Expiring, guard};
use flashgate_core::providers::{MarkerStore, ProviderFuture};
use flashgate_core::{DispatchOutcome, ItemId, OrderId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Key = (UserId, ItemId);

#[derive(Debug, Default)]
struct State {
    purchases: HashMap<Key, OrderId>,
    outcomes: HashMap<Key, Expiring<DispatchOutcome>>,
}

/// In-memory [`MarkerStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarkerStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryMarkerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every purchase marker, as after a cache flush.
    pub fn clear_purchase_markers(&self) {
        if let Ok(mut state) = guard(&self.state) {
            state.purchases.clear();
        }
    }
}

impl MarkerStore for InMemoryMarkerStore {
    fn purchase_marker(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<OrderId>> {
        Box::pin(async move { Ok(guard(&self.state)?.purchases.get(&(user, item)).copied()) })
    }

    fn set_purchase_marker(
        &self,
        user: UserId,
        item: ItemId,
        order: OrderId,
    ) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            guard(&self.state)?.purchases.insert((user, item), order);
            Ok(())
        })
    }

    fn outcome(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<DispatchOutcome>> {
        Box::pin(async move {
            let state = guard(&self.state)?;
            Ok(state
                .outcomes
                .get(&(user, item))
                .filter(|o| o.is_live())
                .map(|o| o.value))
        })
    }

    fn set_outcome(
        &self,
        user: UserId,
        item: ItemId,
        outcome: DispatchOutcome,
        ttl: Duration,
    ) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            guard(&self.state)?
                .outcomes
                .insert((user, item), Expiring::new(outcome, ttl));
            Ok(())
        })
    }
}
