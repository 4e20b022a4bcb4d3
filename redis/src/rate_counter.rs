//! Fixed-window request counter.
//!
//! `INCR` and the first `PEXPIRE` run in one script, so a window cannot be
//! left without an expiry and concurrent callers always observe distinct
//! counts.

use crate::{KEY_PREFIX, ttl_ms, unavailable};
use flashgate_core::providers::{ProviderFuture, RateCounter, RateWindow};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::sync::LazyLock;
use std::time::Duration;

/// Returns `{count, pttl}`.
static INCREMENT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local count = redis.call('INCR', KEYS[1])
        local ttl = redis.call('PTTL', KEYS[1])
        if ttl < 0 then
            redis.call('PEXPIRE', KEYS[1], ARGV[1])
            ttl = tonumber(ARGV[1])
        end
        return {count, ttl}
        ",
    )
});

/// `Redis`-backed [`RateCounter`].
#[derive(Clone)]
pub struct RedisRateCounter {
    conn_manager: ConnectionManager,
}

impl RedisRateCounter {
    /// Create a counter over `conn_manager`.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn rate_key(key: &str) -> String {
        format!("{KEY_PREFIX}:rate:{key}")
    }
}

impl RateCounter for RedisRateCounter {
    fn increment<'a>(&'a self, key: &'a str, window: Duration) -> ProviderFuture<'a, RateWindow> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let (count, ttl): (u64, i64) = INCREMENT
                .key(Self::rate_key(key))
                .arg(ttl_ms(window))
                .invoke_async(&mut conn)
                .await
                .map_err(unavailable("Failed to increment rate counter"))?;

            Ok(RateWindow {
                count,
                resets_in: Duration::from_millis(u64::try_from(ttl).unwrap_or(0)),
            })
        })
    }

    fn reset<'a>(&'a self, key: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .del(Self::rate_key(key))
                .await
                .map_err(unavailable("Failed to reset rate counter"))?;

            tracing::info!(key = %key, "Reset rate counter");
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    async fn counter() -> RedisRateCounter {
        RedisRateCounter::new(crate::connect("redis://127.0.0.1:6379").await.unwrap())
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn counts_within_one_window() {
        let counter = counter().await;
        let key = format!("test:count:{}", uuid::Uuid::new_v4());

        for expected in 1..=3 {
            let window = counter.increment(&key, Duration::from_secs(60)).await.unwrap();
            assert_eq!(window.count, expected);
            assert!(window.resets_in <= Duration::from_secs(60));
        }

        counter.reset(&key).await.unwrap();
        let window = counter.increment(&key, Duration::from_secs(60)).await.unwrap();
        assert_eq!(window.count, 1);

        counter.reset(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn window_rolls_over() {
        let counter = counter().await;
        let key = format!("test:roll:{}", uuid::Uuid::new_v4());

        counter.increment(&key, Duration::from_millis(200)).await.unwrap();
        counter.increment(&key, Duration::from_millis(200)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let window = counter.increment(&key, Duration::from_millis(200)).await.unwrap();
        assert_eq!(window.count, 1);

        counter.reset(&key).await.unwrap();
    }
}
