//! Advisory stock counter.
//!
//! Decrement and increment never create the key: an unseeded counter reads
//! as `None` so the caller seeds it from the authoritative store rather than
//! counting down from zero.

use crate::{KEY_PREFIX, unavailable};
use flashgate_core::ItemId;
use flashgate_core::providers::{ProviderFuture, StockCounter};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::sync::LazyLock;

static DECREMENT_IF_SEEDED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return redis.call('DECR', KEYS[1])
        end
        return false
        ",
    )
});

static INCREMENT_IF_SEEDED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return redis.call('INCR', KEYS[1])
        end
        return false
        ",
    )
});

static CLAMP_TO_ZERO: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local value = tonumber(redis.call('GET', KEYS[1]))
        if value and value < 0 then
            redis.call('SET', KEYS[1], 0)
        end
        return 0
        ",
    )
});

/// `Redis`-backed [`StockCounter`].
#[derive(Clone)]
pub struct RedisStockCounter {
    conn_manager: ConnectionManager,
}

impl RedisStockCounter {
    /// Create a counter over `conn_manager`.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn stock_key(item: ItemId) -> String {
        format!("{KEY_PREFIX}:stock:{item}")
    }
}

impl StockCounter for RedisStockCounter {
    fn seed_if_absent(&self, item: ItemId, stock: i64) -> ProviderFuture<'_, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let seeded: bool = conn
                .set_nx(Self::stock_key(item), stock)
                .await
                .map_err(unavailable("Failed to seed stock counter"))?;

            if seeded {
                tracing::info!(item_id = %item, stock, "Seeded stock counter");
            }
            Ok(seeded)
        })
    }

    fn decrement(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            DECREMENT_IF_SEEDED
                .key(Self::stock_key(item))
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable("Failed to decrement stock counter"))
        })
    }

    fn increment(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            INCREMENT_IF_SEEDED
                .key(Self::stock_key(item))
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable("Failed to increment stock counter"))
        })
    }

    fn clamp_to_zero(&self, item: ItemId) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: i64 = CLAMP_TO_ZERO
                .key(Self::stock_key(item))
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable("Failed to clamp stock counter"))?;
            Ok(())
        })
    }

    fn current(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(Self::stock_key(item))
                .await
                .map_err(unavailable("Failed to read stock counter"))
        })
    }
}
