//! Shared request counter with expiry.

use super::ProviderFuture;
use std::time::Duration;

/// State of a counting window after one increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests counted in the current window, including this one.
    pub count: u64,
    /// Time until the window rolls over.
    pub resets_in: Duration,
}

/// Fixed-window counter keyed by an opaque string.
///
/// # Implementation Notes
///
/// **CRITICAL**: `increment()` must be race-free under concurrent first hits.
/// The increment and the "set expiry only if this created the key" step must
/// execute atomically (Redis: `INCR` + `PEXPIRE NX` in a `MULTI` block or a
/// script; in-memory: a single mutex-protected update). Two callers must
/// never both observe themselves as the first hit of a fresh window.
pub trait RateCounter: Send + Sync {
    /// Count one request against `key`, opening a window of length `window`
    /// if none is open.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn increment<'a>(&'a self, key: &'a str, window: Duration) -> ProviderFuture<'a, RateWindow>;

    /// Drop the window for `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn reset<'a>(&'a self, key: &'a str) -> ProviderFuture<'a, ()>;
}
