//! Application state for Axum handlers.

use crate::extractors::{HeaderIdentity, IdentityResolver};
use flashgate_core::UserId;
use flashgate_core::providers::DeadLetterArchive;
use flashgate_runtime::FlashSale;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// How `POST /purchase` reaches the order committer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Commit inside the request and return the order.
    #[default]
    Synchronous,
    /// Enqueue for a dispatch worker and return `pending`.
    Queued,
}

impl DispatchMode {
    /// Parse `sync`/`synchronous` or `queued`/`async`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Some(Self::Synchronous),
            "queued" | "async" => Some(Self::Queued),
            _ => None,
        }
    }
}

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The purchase pipeline.
    pub sale: Arc<FlashSale>,
    /// Operator view of dead-lettered purchases.
    pub dead_letters: Arc<dyn DeadLetterArchive>,
    /// Resolves the caller's identity from request headers.
    pub identity: Arc<dyn IdentityResolver>,
    /// Purchase dispatch mode.
    pub mode: DispatchMode,
    /// Users allowed on the operator routes. Empty closes them to everyone.
    pub operators: Arc<HashSet<UserId>>,
}

impl AppState {
    /// State with header-based identity and synchronous purchases.
    #[must_use]
    pub fn new(sale: Arc<FlashSale>, dead_letters: Arc<dyn DeadLetterArchive>) -> Self {
        Self {
            sale,
            dead_letters,
            identity: Arc::new(HeaderIdentity),
            mode: DispatchMode::default(),
            operators: Arc::new(HashSet::new()),
        }
    }

    /// Use `mode` for `POST /purchase`.
    #[must_use]
    pub const fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Allow `operators` on the dead-letter routes.
    #[must_use]
    pub fn with_operators(mut self, operators: impl IntoIterator<Item = UserId>) -> Self {
        self.operators = Arc::new(operators.into_iter().collect());
        self
    }

    /// Whether `user` may use the operator routes.
    #[must_use]
    pub fn is_operator(&self, user: UserId) -> bool {
        self.operators.contains(&user)
    }

    /// Replace the identity resolver.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!(DispatchMode::parse("sync"), Some(DispatchMode::Synchronous));
        assert_eq!(DispatchMode::parse(" Queued "), Some(DispatchMode::Queued));
        assert_eq!(DispatchMode::parse("async"), Some(DispatchMode::Queued));
        assert_eq!(DispatchMode::parse("batch"), None);
    }
}
