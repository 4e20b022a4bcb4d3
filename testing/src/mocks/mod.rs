//! In-memory providers for tests.
//!
//! Every mock keeps its state behind an `Arc<Mutex<..>>`, so clones share
//! state. Entries with an expiry are checked against [`Instant::now`] on read.
//! Tests that exercise expiry use short TTLs and a real sleep.

mod challenge_store;
mod dispatch_queue;
mod inventory;
mod lock_store;
mod marker_store;
mod rate_counter;
mod stock_counter;

pub use challenge_store::InMemoryChallengeStore;
pub use dispatch_queue::{InMemoryDispatchQueue, RecordingDeadLetterSink};
pub use inventory::InMemoryInventory;
pub use lock_store::InMemoryLockStore;
pub use marker_store::InMemoryMarkerStore;
pub use rate_counter::InMemoryRateCounter;
pub use stock_counter::InMemoryStockCounter;

use chrono::{DateTime, Utc};
use flashgate_core::{Clock, StoreError};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use flashgate_testing::mocks::FixedClock;
/// use flashgate_core::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// let time1 = clock.now();
/// let time2 = clock.now();
/// assert_eq!(time1, time2); // Always the same!
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
///
/// # Panics
///
/// This function will panic if the hardcoded timestamp fails to parse,
/// which should never happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// Lock a mock's state, mapping poisoning to a store failure.
fn guard<T>(state: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    state
        .lock()
        .map_err(|_| StoreError::Unavailable("Mutex lock failed".into()))
}

/// A value with an optional expiry instant.
#[derive(Clone, Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: std::time::Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}
