//! In-memory advisory stock counter.

use super::guard;
use flashgate_core::providers::{ProviderFuture, StockCounter};
use flashgate_core::{ItemId, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory [`StockCounter`] with an availability switch.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockCounter {
    counters: Arc<Mutex<HashMap<ItemId, i64>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStockCounter {
    /// Create an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite a counter.
    pub fn set(&self, item: ItemId, value: i64) {
        if let Ok(mut counters) = guard(&self.counters) {
            counters.insert(item, value);
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("stock counter offline".into()));
        }
        Ok(())
    }
}

impl StockCounter for InMemoryStockCounter {
    fn seed_if_absent(&self, item: ItemId, stock: i64) -> ProviderFuture<'_, bool> {
        Box::pin(async move {
            self.check()?;
            let mut counters = guard(&self.counters)?;
            if counters.contains_key(&item) {
                return Ok(false);
            }
            counters.insert(item, stock);
            Ok(true)
        })
    }

    fn decrement(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>> {
        Box::pin(async move {
            self.check()?;
            let mut counters = guard(&self.counters)?;
            Ok(counters.get_mut(&item).map(|value| {
                *value -= 1;
                *value
            }))
        })
    }

    fn increment(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>> {
        Box::pin(async move {
            self.check()?;
            let mut counters = guard(&self.counters)?;
            Ok(counters.get_mut(&item).map(|value| {
                *value += 1;
                *value
            }))
        })
    }

    fn clamp_to_zero(&self, item: ItemId) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            if let Some(value) = guard(&self.counters)?.get_mut(&item) {
                if *value < 0 {
                    *value = 0;
                }
            }
            Ok(())
        })
    }

    fn current(&self, item: ItemId) -> ProviderFuture<'_, Option<i64>> {
        Box::pin(async move {
            self.check()?;
            Ok(guard(&self.counters)?.get(&item).copied())
        })
    }
}
