//! Storage for one-time challenge answers and purchase path tokens.

use super::ProviderFuture;
use crate::types::{ItemId, UserId};
use std::time::Duration;

/// Challenge answers and purchase path tokens scoped to (user, item).
///
/// # Security Requirements
///
/// 1. **Single-use answers**: `take_answer()` and `take_verified()` atomically
///    read and delete
/// 2. **No re-issue while live**: `store_path_if_absent()` never replaces a live token
/// 3. **Atomic consumption**: `consume_path()` compares and deletes in one step
/// 4. **Absent is mismatch**: a missing or expired value is reported as
///    `None`/`false`, never as an error
pub trait ChallengeStore: Send + Sync {
    /// Store the expected answer for a freshly issued challenge, replacing
    /// any previous one.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn store_answer<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        answer: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, ()>;

    /// Atomically fetch and delete the expected answer.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn take_answer(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<String>>;

    /// Record that (user, item) passed the challenge, for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn mark_verified(&self, user: UserId, item: ItemId, ttl: Duration) -> ProviderFuture<'_, ()>;

    /// Atomically consume the verification record.
    ///
    /// Returns `true` if a live record existed.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn take_verified(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, bool>;

    /// Store `token` unless a live token already exists.
    ///
    /// Returns `None` if `token` was stored, or `Some(existing)` if a live
    /// token was already present (and is left untouched).
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn store_path_if_absent<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        token: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, Option<String>>;

    /// Delete the stored path token if and only if it equals `token`.
    ///
    /// Returns `true` on match. A missing or expired token returns `false`.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn consume_path<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        token: &'a str,
    ) -> ProviderFuture<'a, bool>;
}
