//! Request-scoped context passed explicitly through the pipeline.

use crate::error::{FlashSaleError, Result};
use crate::types::UserId;
use uuid::Uuid;

/// Who is calling, and which request this is.
///
/// Built once at the edge (after identity resolution) and passed by
/// reference into every pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Resolved identity, `None` for anonymous callers.
    pub user: Option<UserId>,
    /// Correlation id for logs.
    pub correlation_id: Uuid,
}

impl RequestContext {
    /// Context for an authenticated caller.
    #[must_use]
    pub fn authenticated(user: UserId) -> Self {
        Self {
            user: Some(user),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Context for an anonymous caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            user: None,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Use an upstream correlation id.
    #[must_use]
    pub const fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// The caller's identity.
    ///
    /// # Errors
    ///
    /// Returns [`FlashSaleError::Unauthenticated`] for anonymous callers.
    pub const fn require_user(&self) -> Result<UserId> {
        match self.user {
            Some(user) => Ok(user),
            None => Err(FlashSaleError::Unauthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_context_is_rejected() {
        assert_eq!(
            RequestContext::anonymous().require_user(),
            Err(FlashSaleError::Unauthenticated)
        );
        assert_eq!(
            RequestContext::authenticated(UserId(7)).require_user(),
            Ok(UserId(7))
        );
    }
}
