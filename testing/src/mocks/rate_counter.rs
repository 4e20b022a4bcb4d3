//! In-memory fixed-window counter.

use super::{Expiring, guard};
use flashgate_core::providers::{ProviderFuture, RateCounter, RateWindow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// In-memory [`RateCounter`].
///
/// Expired windows are replaced on the next increment of the same key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateCounter {
    windows: Arc<Mutex<HashMap<String, Expiring<u64>>>>,
}

impl InMemoryRateCounter {
    /// Create an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateCounter for InMemoryRateCounter {
    fn increment<'a>(&'a self, key: &'a str, window: Duration) -> ProviderFuture<'a, RateWindow> {
        Box::pin(async move {
            let mut windows = guard(&self.windows)?;
            let entry = windows
                .entry(key.to_string())
                .and_modify(|w| {
                    if !w.is_live() {
                        *w = Expiring::new(0, window);
                    }
                })
                .or_insert_with(|| Expiring::new(0, window));
            entry.value += 1;

            Ok(RateWindow {
                count: entry.value,
                resets_in: entry.expires_at.saturating_duration_since(Instant::now()),
            })
        })
    }

    fn reset<'a>(&'a self, key: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            guard(&self.windows)?.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_within_window_and_restarts_after_expiry() {
        let counter = InMemoryRateCounter::new();
        let window = Duration::from_millis(50);

        assert_eq!(counter.increment("k", window).await.unwrap().count, 1);
        assert_eq!(counter.increment("k", window).await.unwrap().count, 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.increment("k", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn reset_drops_window() {
        let counter = InMemoryRateCounter::new();
        counter.increment("k", Duration::from_secs(5)).await.unwrap();
        counter.reset("k").await.unwrap();
        assert_eq!(
            counter.increment("k", Duration::from_secs(5)).await.unwrap().count,
            1
        );
    }
}
