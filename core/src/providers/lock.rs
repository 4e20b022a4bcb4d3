//! Distributed mutual exclusion.

use super::ProviderFuture;
use std::time::Duration;

/// Lock storage with owner tokens and expiry.
///
/// # Security Requirements
///
/// `release()` **MUST** be a single atomic compare-and-delete. A separate
/// `GET` followed by `DEL` lets a holder whose lock expired (and was
/// re-acquired by someone else) delete the new owner's lock.
pub trait LockStore: Send + Sync {
    /// Set `key` to `owner` with expiry `ttl` if `key` is absent.
    ///
    /// Returns `true` if the lock was acquired.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        owner: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, bool>;

    /// Delete `key` only if it is currently held by `owner`.
    ///
    /// Returns `true` if a lock was released; a mismatched or expired token
    /// is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn release<'a>(&'a self, key: &'a str, owner: &'a str) -> ProviderFuture<'a, bool>;
}
