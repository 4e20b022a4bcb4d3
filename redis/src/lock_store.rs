//! Set-if-absent lock with an owner token.
//!
//! Acquisition is `SET key owner NX PX ttl`. Release deletes the key only if
//! it still holds the caller's token, so a holder whose lock expired cannot
//! release someone else's.

use crate::{KEY_PREFIX, ttl_ms, unavailable};
use flashgate_core::providers::{LockStore, ProviderFuture};
use redis::aio::ConnectionManager;
use redis::{ExistenceCheck, Script, SetExpiry, SetOptions};
use std::sync::LazyLock;
use std::time::Duration;

static RELEASE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        end
        return 0
        ",
    )
});

/// `Redis`-backed [`LockStore`].
#[derive(Clone)]
pub struct RedisLockStore {
    conn_manager: ConnectionManager,
}

impl RedisLockStore {
    /// Create a lock store over `conn_manager`.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn lock_key(key: &str) -> String {
        format!("{KEY_PREFIX}:lock:{key}")
    }
}

impl LockStore for RedisLockStore {
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        owner: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let options = SetOptions::default()
                .conditional_set(ExistenceCheck::NX)
                .with_expiration(SetExpiry::PX(ttl_ms(ttl)));

            let reply: Option<String> = redis::cmd("SET")
                .arg(Self::lock_key(key))
                .arg(owner)
                .arg(options)
                .query_async(&mut conn)
                .await
                .map_err(unavailable("Failed to acquire lock"))?;

            Ok(reply.is_some())
        })
    }

    fn release<'a>(&'a self, key: &'a str, owner: &'a str) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let deleted: i64 = RELEASE
                .key(Self::lock_key(key))
                .arg(owner)
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable("Failed to release lock"))?;
            Ok(deleted == 1)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn only_the_owner_releases() {
        let locks = RedisLockStore::new(crate::connect("redis://127.0.0.1:6379").await.unwrap());
        let key = format!("test:{}", uuid::Uuid::new_v4());
        let ttl = Duration::from_secs(5);

        assert!(locks.try_acquire(&key, "a", ttl).await.unwrap());
        assert!(!locks.try_acquire(&key, "b", ttl).await.unwrap());

        assert!(!locks.release(&key, "b").await.unwrap());
        assert!(locks.release(&key, "a").await.unwrap());
        assert!(locks.try_acquire(&key, "b", ttl).await.unwrap());

        locks.release(&key, "b").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn expired_lock_can_be_taken() {
        let locks = RedisLockStore::new(crate::connect("redis://127.0.0.1:6379").await.unwrap());
        let key = format!("test:{}", uuid::Uuid::new_v4());

        assert!(locks.try_acquire(&key, "a", Duration::from_millis(100)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(locks.try_acquire(&key, "b", Duration::from_secs(5)).await.unwrap());
        assert!(!locks.release(&key, "a").await.unwrap());

        locks.release(&key, "b").await.unwrap();
    }
}
