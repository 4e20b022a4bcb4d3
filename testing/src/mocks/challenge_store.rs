//! In-memory challenge answers and path tokens.

use super::{Expiring, guard};
use flashgate_core::providers::{ChallengeStore, ProviderFuture};
use flashgate_core::{ItemId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Key = (UserId, ItemId);

#[derive(Debug, Default)]
struct State {
    answers: HashMap<Key, Expiring<String>>,
    verified: HashMap<Key, Expiring<()>>,
    paths: HashMap<Key, Expiring<String>>,
}

/// In-memory [`ChallengeStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryChallengeStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryChallengeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek at a live answer without consuming it.
    #[must_use]
    pub fn peek_answer(&self, user: UserId, item: ItemId) -> Option<String> {
        let state = guard(&self.state).ok()?;
        state
            .answers
            .get(&(user, item))
            .filter(|a| a.is_live())
            .map(|a| a.value.clone())
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn store_answer<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        answer: &'a str,
        ttl: Duration,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            guard(&self.state)?
                .answers
                .insert((user, item), Expiring::new(answer.to_string(), ttl));
            Ok(())
        })
    }

    fn take_answer(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<String>> {
        Box::pin(async move {
            let removed = guard(&self.state)?.answers.remove(&(user, item));
            Ok(removed.filter(Expiring::is_live).map(|a| a.value))
        })
    }

    fn mark_verified(&self, user: UserId, item: ItemId, ttl: Duration) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            guard(&self.state)?
                .verified
                .insert((user, item), Expiring::new((), ttl));
            Ok(())
        })
    }

    fn take_verified(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, bool> {
        Box::pin(async move {
            let removed = guard(&self.state)?.verified.remove(&(user, item));
            Ok(removed.is_some_and(|v| v.is_live()))
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
            let mut state = guard(&self.state)?;
            match state.paths.get(&(user, item)) {
                Some(existing) if existing.is_live() => Ok(Some(existing.value.clone())),
                _ => {
                    state
                        .paths
                        .insert((user, item), Expiring::new(token.to_string(), ttl));
                    Ok(None)
                }
            }
        })
    }

    fn consume_path<'a>(
        &'a self,
        user: UserId,
        item: ItemId,
        token: &'a str,
    ) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            let mut state = guard(&self.state)?;
            let matches = state
                .paths
                .get(&(user, item))
                .is_some_and(|p| p.is_live() && p.value == token);
            if matches {
                state.paths.remove(&(user, item));
            }
            Ok(matches)
        })
    }
}
