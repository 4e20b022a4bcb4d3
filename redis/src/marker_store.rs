//! Purchase markers and dispatch outcome markers.
//!
//! Purchase markers do not expire: they mirror a durable purchase row.
//! Outcome markers are JSON and expire after the configured TTL.

use crate::{KEY_PREFIX, ttl_ms, unavailable};
use flashgate_core::providers::{MarkerStore, ProviderFuture};
use flashgate_core::{DispatchOutcome, ItemId, OrderId, StoreError, UserId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// `Redis`-backed [`MarkerStore`].
#[derive(Clone)]
pub struct RedisMarkerStore {
    conn_manager: ConnectionManager,
}

impl RedisMarkerStore {
    /// Create a marker store over `conn_manager`.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn purchase_key(user: UserId, item: ItemId) -> String {
        format!("{KEY_PREFIX}:purchased:{user}:{item}")
    }

    fn outcome_key(user: UserId, item: ItemId) -> String {
        format!("{KEY_PREFIX}:outcome:{user}:{item}")
    }
}

impl MarkerStore for RedisMarkerStore {
    fn purchase_marker(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<OrderId>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let order: Option<i64> = conn
                .get(Self::purchase_key(user, item))
                .await
                .map_err(unavailable("Failed to read purchase marker"))?;
            Ok(order.map(OrderId))
        })
    }

    fn set_purchase_marker(
        &self,
        user: UserId,
        item: ItemId,
        order: OrderId,
    ) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set(Self::purchase_key(user, item), order.0)
                .await
                .map_err(unavailable("Failed to write purchase marker"))?;
            Ok(())
        })
    }

    fn outcome(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<DispatchOutcome>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let key = Self::outcome_key(user, item);
            let raw: Option<String> = conn
                .get(&key)
                .await
                .map_err(unavailable("Failed to read dispatch outcome"))?;

            raw.map(|json| {
                serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                })
            })
            .transpose()
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
            let mut conn = self.conn_manager.clone();
            let json = serde_json::to_string(&outcome)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            let _: () = conn
                .pset_ex(Self::outcome_key(user, item), json, ttl_ms(ttl))
                .await
                .map_err(unavailable("Failed to write dispatch outcome"))?;

            tracing::debug!(user_id = %user, item_id = %item, ?outcome, "Recorded dispatch outcome");
            Ok(())
        })
    }
}
