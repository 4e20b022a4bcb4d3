//! In-memory owner-token lock store.

use super::{Expiring, guard};
use flashgate_core::StoreError;
use flashgate_core::providers::{LockStore, ProviderFuture};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory [`LockStore`] with an availability switch.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    locks: Arc<Mutex<HashMap<String, Expiring<String>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLockStore {
    /// Create an empty lock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current live holder of `key`.
    #[must_use]
    pub fn holder(&self, key: &str) -> Option<String> {
        let locks = guard(&self.locks).ok()?;
        locks
            .get(key)
            .filter(|l| l.is_live())
            .map(|l| l.value.clone())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("lock store offline".into()));
        }
        Ok(())
    }
}

impl LockStore for InMemoryLockStore {
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        owner: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            self.check()?;
            let mut locks = guard(&self.locks)?;
            if locks.get(key).is_some_and(Expiring::is_live) {
                return Ok(false);
            }
            locks.insert(key.to_string(), Expiring::new(owner.to_string(), ttl));
            Ok(true)
        })
    }

    fn release<'a>(&'a self, key: &'a str, owner: &'a str) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            self.check()?;
            let mut locks = guard(&self.locks)?;
            let held = locks
                .get(key)
                .is_some_and(|l| l.is_live() && l.value == owner);
            if held {
                locks.remove(key);
            }
            Ok(held)
        })
    }
}
