//! One-time challenge answers, verification markers and purchase path tokens.
//!
//! # Security
//!
//! - **Single-use answers**: consumed atomically via `GETDEL`
//! - **Single-use paths**: compare-and-delete in one script
//! - **User isolation**: every key is scoped to (user, item)

use crate::{KEY_PREFIX, ttl_ms, unavailable};
use flashgate_core::providers::{ChallengeStore, ProviderFuture};
use flashgate_core::{ItemId, UserId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::sync::LazyLock;
use std::time::Duration;

/// Returns the live token, or stores `ARGV[1]` and returns nil.
static STORE_PATH_IF_ABSENT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local existing = redis.call('GET', KEYS[1])
        if existing then
            return existing
        end
        redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
        return false
        ",
    )
});

/// Deletes the key only if it holds `ARGV[1]`.
static COMPARE_AND_DELETE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        end
        return 0
        ",
    )
});

/// `Redis`-backed [`ChallengeStore`].
#[derive(Clone)]
pub struct RedisChallengeStore {
    conn_manager: ConnectionManager,
}

impl RedisChallengeStore {
    /// Create a store over `conn_manager`.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn answer_key(user: UserId, item: ItemId) -> String {
        format!("{KEY_PREFIX}:challenge:{user}:{item}")
    }

    fn verified_key(user: UserId, item: ItemId) -> String {
        format!("{KEY_PREFIX}:verified:{user}:{item}")
    }

    fn path_key(user: UserId, item: ItemId) -> String {
        format!("{KEY_PREFIX}:path:{user}:{item}")
    }
}

impl ChallengeStore for RedisChallengeStore {
    fn store_answer<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        answer: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .pset_ex(Self::answer_key(user, item), answer, ttl_ms(ttl))
                .await
                .map_err(unavailable("Failed to store challenge"))?;
            Ok(())
        })
    }

    fn take_answer(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            // GETDEL: a second verification attempt finds nothing.
            conn.get_del(Self::answer_key(user, item))
                .await
                .map_err(unavailable("Failed to consume challenge"))
        })
    }

    fn mark_verified(&self, user: UserId, item: ItemId, ttl: Duration) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .pset_ex(Self::verified_key(user, item), 1, ttl_ms(ttl))
                .await
                .map_err(unavailable("Failed to mark challenge verified"))?;
            Ok(())
        })
    }

    fn take_verified(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let marker: Option<String> = conn
                .get_del(Self::verified_key(user, item))
                .await
                .map_err(unavailable("Failed to consume verification marker"))?;
            Ok(marker.is_some())
        })
    }

    fn store_path_if_absent<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        token: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            STORE_PATH_IF_ABSENT
                .key(Self::path_key(user, item))
                .arg(token)
                .arg(ttl_ms(ttl))
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable("Failed to store purchase path"))
        })
    }

    fn consume_path<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        token: &'a str,
    ) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let deleted: i64 = COMPARE_AND_DELETE
                .key(Self::path_key(user, item))
                .arg(token)
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable("Failed to consume purchase path"))?;
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

    async fn store() -> RedisChallengeStore {
        RedisChallengeStore::new(crate::connect("redis://127.0.0.1:6379").await.unwrap())
    }

    fn fresh_user() -> UserId {
        UserId(i64::from(uuid::Uuid::new_v4().as_fields().0))
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn answer_is_single_use() {
        let store = store().await;
        let user = fresh_user();

        store.store_answer(user, ItemId(1), "42", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.take_answer(user, ItemId(1)).await.unwrap(), Some("42".into()));
        assert_eq!(store.take_answer(user, ItemId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn live_path_is_returned_instead_of_replaced() {
        let store = store().await;
        let user = fresh_user();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.store_path_if_absent(user, ItemId(1), "first", ttl).await.unwrap(), None);
        assert_eq!(
            store.store_path_if_absent(user, ItemId(1), "second", ttl).await.unwrap(),
            Some("first".into())
        );

        assert!(!store.consume_path(user, ItemId(1), "second").await.unwrap());
        assert!(store.consume_path(user, ItemId(1), "first").await.unwrap());
        assert!(!store.consume_path(user, ItemId(1), "first").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn verification_marker_is_consumed() {
        let store = store().await;
        let user = fresh_user();

        store.mark_verified(user, ItemId(1), Duration::from_secs(60)).await.unwrap();

        assert!(store.take_verified(user, ItemId(1)).await.unwrap());
        assert!(!store.take_verified(user, ItemId(1)).await.unwrap());
    }
}
