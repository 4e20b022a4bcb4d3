//! Per-item distributed lock.
//!
//! Acquisition is set-if-absent with an owner token and TTL. One immediate
//! attempt is followed by exactly one retry after a short pause, then the
//! caller gets [`LockError::Contended`]. Release is an atomic
//! compare-and-delete, so a holder whose lock expired can never delete the
//! lock of whoever acquired it next.

use crate::metrics::LockMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use flashgate_core::providers::LockStore;
use flashgate_core::{FlashSaleError, FlashSaleSettings, ItemId, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Why a lock could not be acquired.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Another owner held the lock on both attempts.
    #[error("Lock {0} is held by another owner")]
    Contended(String),

    /// The lock store could not be reached.
    #[error("Lock store unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

impl From<LockError> for FlashSaleError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Contended(_) => Self::LockTimeout,
            LockError::Unavailable(e) => e.into(),
        }
    }
}

/// Proof of lock ownership. Pass it back to [`LockManager::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a held lock must be released"]
pub struct LockGuard {
    key: String,
    owner: String,
}

impl LockGuard {
    /// Locked resource key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Acquires and releases locks against a [`LockStore`].
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl LockManager {
    /// Create a manager using the lock TTL and retry delay from `settings`.
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>, settings: &FlashSaleSettings) -> Self {
        Self {
            store,
            ttl: settings.lock_ttl,
            retry: RetryPolicy::once_after(settings.lock_retry_delay),
        }
    }

    /// Resource key guarding the stock row of `item`.
    #[must_use]
    pub fn item_key(item: ItemId) -> String {
        format!("item:{item}")
    }

    /// Acquire `key` with a fresh owner token.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contended`] after the single retry, or
    /// [`LockError::Unavailable`] immediately if the store fails.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let owner = Uuid::new_v4().to_string();
        let (store, token, ttl) = (&self.store, owner.as_str(), self.ttl);

        let result = retry_with_predicate(
            self.retry.clone(),
            || async move {
                if store.try_acquire(key, token, ttl).await? {
                    Ok(())
                } else {
                    Err(LockError::Contended(key.to_string()))
                }
            },
            |err| matches!(err, LockError::Contended(_)),
        )
        .await;

        match result {
            Ok(()) => {
                LockMetrics::record("acquired");
                Ok(LockGuard {
                    key: key.to_string(),
                    owner,
                })
            }
            Err(err) => {
                let outcome = match err {
                    LockError::Contended(_) => "contended",
                    LockError::Unavailable(_) => "unavailable",
                };
                LockMetrics::record(outcome);
                tracing::debug!(key, error = %err, "Lock not acquired");
                Err(err)
            }
        }
    }

    /// Release a held lock.
    ///
    /// Returns `true` if this owner still held the lock. `false` means it
    /// expired (and may now belong to someone else, whose lock is untouched).
    /// Store failures are logged and reported as `false`; the TTL bounds how
    /// long such a lock lingers.
    pub async fn release(&self, guard: LockGuard) -> bool {
        match self.store.release(&guard.key, &guard.owner).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(key = %guard.key, "Lock expired before release");
                false
            }
            Err(err) => {
                tracing::warn!(key = %guard.key, error = %err, "Lock release failed; waiting for TTL");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use flashgate_testing::mocks::InMemoryLockStore;

    fn manager(store: &InMemoryLockStore, ttl: Duration) -> LockManager {
        let settings = FlashSaleSettings {
            lock_ttl: ttl,
            lock_retry_delay: Duration::from_millis(5),
            ..FlashSaleSettings::default()
        };
        LockManager::new(Arc::new(store.clone()), &settings)
    }

    #[tokio::test]
    async fn second_acquirer_times_out_after_one_retry() {
        let store = InMemoryLockStore::new();
        let locks = manager(&store, Duration::from_secs(5));

        let held = locks.acquire("item:1").await.unwrap();
        let err = locks.acquire("item:1").await.unwrap_err();
        assert!(matches!(err, LockError::Contended(_)));
        assert_eq!(FlashSaleError::from(err), FlashSaleError::LockTimeout);

        assert!(locks.release(held).await);
        assert!(locks.acquire("item:1").await.is_ok());
    }

    #[tokio::test]
    async fn retry_picks_up_lock_released_during_pause() {
        let store = InMemoryLockStore::new();
        let locks = manager(&store, Duration::from_millis(3));

        let _stale = locks.acquire("item:1").await.unwrap();
        // The first holder's TTL runs out during the retry pause.
        assert!(locks.acquire("item:1").await.is_ok());
    }

    #[tokio::test]
    async fn expired_owner_cannot_release_new_owners_lock() {
        let store = InMemoryLockStore::new();
        let locks = manager(&store, Duration::from_millis(20));

        let first = locks.acquire("item:1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = locks.acquire("item:1").await.unwrap();
        let second_owner = second.owner().to_string();

        assert!(!locks.release(first).await);
        assert_eq!(store.holder("item:1"), Some(second_owner));
        assert!(locks.release(second).await);
        assert_eq!(store.holder("item:1"), None);
    }

    #[tokio::test]
    async fn unavailable_store_fails_fast() {
        let store = InMemoryLockStore::new();
        store.set_unavailable(true);
        let locks = manager(&store, Duration::from_secs(5));

        let err = locks.acquire("item:1").await.unwrap_err();
        assert!(matches!(err, LockError::Unavailable(_)));
    }
}
