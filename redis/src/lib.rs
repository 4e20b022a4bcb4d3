//! Redis implementations of the Flashgate key/expiry providers.
//!
//! Every store wraps a [`ConnectionManager`], cloned per call. All
//! read-modify-write operations run as a single command or a Lua script so
//! they stay atomic under concurrent callers.
//!
//! # Key layout
//!
//! | Key | Value | Expiry |
//! |-----|-------|--------|
//! | `flashgate:rate:{endpoint}:{identity}` | request count | window |
//! | `flashgate:challenge:{user}:{item}` | expected answer | challenge TTL |
//! | `flashgate:verified:{user}:{item}` | `1` | path TTL |
//! | `flashgate:path:{user}:{item}` | path token | path TTL |
//! | `flashgate:stock:{item}` | advisory stock | none |
//! | `flashgate:lock:{key}` | owner token | lock TTL |
//! | `flashgate:purchased:{user}:{item}` | order id | none |
//! | `flashgate:outcome:{user}:{item}` | JSON dispatch outcome | outcome TTL |
//!
//! # Example
//!
//! ```no_run
//! use flashgate_redis::RedisStores;
//!
//! # async fn example() -> Result<(), flashgate_core::StoreError> {
//! let stores = RedisStores::connect("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

pub mod challenge_store;
pub mod lock_store;
pub mod marker_store;
pub mod rate_counter;
pub mod stock_counter;

pub use challenge_store::RedisChallengeStore;
pub use lock_store::RedisLockStore;
pub use marker_store::RedisMarkerStore;
pub use rate_counter::RedisRateCounter;
pub use stock_counter::RedisStockCounter;

use flashgate_core::StoreError;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::time::Duration;

/// Prefix shared by every key this crate writes.
pub const KEY_PREFIX: &str = "flashgate";

/// Open a managed connection to `redis_url`.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the URL is invalid or the server
/// cannot be reached.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let client = Client::open(redis_url)
        .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {e}")))?;

    ConnectionManager::new(client).await.map_err(|e| {
        StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
    })
}

/// Every Redis-backed provider, sharing one connection manager.
#[derive(Clone)]
pub struct RedisStores {
    /// Request throttling counters.
    pub rate_counter: RedisRateCounter,
    /// Challenge answers and purchase path tokens.
    pub challenges: RedisChallengeStore,
    /// Advisory stock counters.
    pub stock: RedisStockCounter,
    /// Per-item locks.
    pub locks: RedisLockStore,
    /// Purchase and dispatch outcome markers.
    pub markers: RedisMarkerStore,
}

impl RedisStores {
    /// Connect and build every store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if Redis cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let conn = connect(redis_url).await?;
        tracing::info!("Connected to Redis");
        Ok(Self::from_manager(&conn))
    }

    /// Build every store over an existing connection manager.
    #[must_use]
    pub fn from_manager(conn: &ConnectionManager) -> Self {
        Self {
            rate_counter: RedisRateCounter::new(conn.clone()),
            challenges: RedisChallengeStore::new(conn.clone()),
            stock: RedisStockCounter::new(conn.clone()),
            locks: RedisLockStore::new(conn.clone()),
            markers: RedisMarkerStore::new(conn.clone()),
        }
    }
}

/// Map a Redis failure to [`StoreError::Unavailable`] with context.
pub(crate) fn unavailable(context: &'static str) -> impl FnOnce(RedisError) -> StoreError {
    move |e| StoreError::Unavailable(format!("{context}: {e}"))
}

/// Expiry in milliseconds, never zero.
#[allow(clippy::cast_possible_truncation)] // Safe: TTLs are far below u64::MAX ms
pub(crate) fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(ttl_ms(Duration::ZERO), 1);
        assert_eq!(ttl_ms(Duration::from_secs(5)), 5_000);
    }

    #[test]
    fn redis_errors_become_unavailable() {
        let err = RedisError::from((redis::ErrorKind::IoError, "connection reset"));
        let mapped = unavailable("Failed to read")(err);
        assert!(matches!(mapped, StoreError::Unavailable(msg) if msg.starts_with("Failed to read")));
    }
}
