//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`Caller`]: the request-scoped [`RequestContext`], built from the
//!   resolved identity and the correlation id
//! - [`Operator`]: a [`Caller`] whose identity is on the operator list
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     Caller(ctx): Caller,
//! ) -> WebResult<Json<Vec<Order>>> {
//!     Ok(Json(state.sale.orders(&ctx).await?))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use flashgate_core::{RequestContext, UserId};
use uuid::Uuid;

/// Header carrying the caller's user id, set by an authenticating proxy.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Turns request headers into a resolved identity.
///
/// `Ok(None)` means anonymous; the access policy of the endpoint decides
/// whether that is acceptable.
pub trait IdentityResolver: Send + Sync {
    /// Resolve the caller.
    ///
    /// # Errors
    ///
    /// Returns a 400 error if identity headers are present but malformed.
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<UserId>, AppError>;
}

/// Reads the user id from [`USER_ID_HEADER`].
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderIdentity;

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<UserId>, AppError> {
        let Some(value) = headers.get(USER_ID_HEADER) else {
            return Ok(None);
        };
        value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(|id| Some(UserId(id)))
            .ok_or_else(|| AppError::bad_request(format!("Malformed {USER_ID_HEADER} header")))
    }
}

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation middleware is
/// installed, otherwise from the `X-Correlation-ID` header, otherwise a new
/// UUID v4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    fn from_parts(parts: &Parts) -> Self {
        if let Some(id) = parts.extensions.get::<Self>() {
            return *id;
        }
        Self::from_headers(&parts.headers)
    }

    /// Read the header, or generate a fresh id.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);
        Self(id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// The request-scoped context handed to every pipeline call.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = state.identity.resolve(&parts.headers)?;
        let correlation_id = CorrelationId::from_parts(parts).0;

        Ok(Self(RequestContext {
            user,
            correlation_id,
        }))
    }
}

/// Require an operator.
///
/// Resolves the caller like [`Caller`], then checks the identity against
/// [`AppState::operators`]. Anonymous callers get 401, everyone else who is
/// not on the list gets 403.
#[derive(Debug, Clone, Copy)]
pub struct Operator {
    /// The operator's user id.
    pub user_id: UserId,
    /// The request-scoped context.
    pub ctx: RequestContext,
}

#[async_trait]
impl FromRequestParts<AppState> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Caller(ctx) = Caller::from_request_parts(parts, state).await?;
        let user_id = ctx.require_user()?;

        if !state.is_operator(user_id) {
            tracing::warn!(
                user_id = %user_id,
                correlation_id = %ctx.correlation_id,
                "Operator route refused"
            );
            return Err(AppError::forbidden("Operator access required"));
        }

        Ok(Self { user_id, ctx })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use flashgate_core::providers::DeadLetterArchive;
    use flashgate_core::{FlashSaleSettings, SystemClock};
    use flashgate_runtime::{FlashSale, Providers};
    use flashgate_testing::mocks::{
        InMemoryChallengeStore, InMemoryDispatchQueue, InMemoryInventory, InMemoryLockStore,
        InMemoryMarkerStore, InMemoryRateCounter, InMemoryStockCounter, RecordingDeadLetterSink,
    };
    use std::sync::Arc;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).expect("Valid request").into_parts().0
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let mut parts = parts(Request::builder().header(CORRELATION_ID_HEADER, uuid.to_string()));

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_extension() {
        let from_middleware = Uuid::new_v4();
        let mut parts =
            parts(Request::builder().header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string()));
        parts.extensions.insert(CorrelationId(from_middleware));

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, from_middleware);
    }

    #[test]
    fn test_header_identity() {
        let resolver = HeaderIdentity;

        let anonymous = parts(Request::builder());
        assert_eq!(resolver.resolve(&anonymous.headers).ok(), Some(None));

        let known = parts(Request::builder().header(USER_ID_HEADER, "42"));
        assert_eq!(resolver.resolve(&known.headers).ok(), Some(Some(UserId(42))));
    }

    #[test]
    fn test_header_identity_rejects_malformed_ids() {
        let resolver = HeaderIdentity;
        for bad in ["abc", "-3", "0", ""] {
            let req = parts(Request::builder().header(USER_ID_HEADER, bad));
            let err = resolver.resolve(&req.headers).expect_err("should reject");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{bad:?}");
        }
    }

    fn state() -> AppState {
        let providers = Providers {
            rate_counter: Arc::new(InMemoryRateCounter::new()),
            challenges: Arc::new(InMemoryChallengeStore::new()),
            stock: Arc::new(InMemoryStockCounter::new()),
            locks: Arc::new(InMemoryLockStore::new()),
            markers: Arc::new(InMemoryMarkerStore::new()),
            inventory: Arc::new(InMemoryInventory::new()),
            queue: Arc::new(InMemoryDispatchQueue::new()),
            dead_letters: Arc::new(RecordingDeadLetterSink::new()),
            clock: Arc::new(SystemClock),
        };
        let sale = Arc::new(FlashSale::new(providers, &FlashSaleSettings::default()));
        let archive: Arc<dyn DeadLetterArchive> = Arc::new(RecordingDeadLetterSink::new());
        AppState::new(sale, archive).with_operators([UserId(1)])
    }

    #[tokio::test]
    async fn test_operator_must_be_listed() {
        let state = state();

        let mut listed = parts(Request::builder().header(USER_ID_HEADER, "1"));
        let operator = Operator::from_request_parts(&mut listed, &state)
            .await
            .expect("listed operator");
        assert_eq!(operator.user_id, UserId(1));

        let mut buyer = parts(Request::builder().header(USER_ID_HEADER, "2"));
        let err = Operator::from_request_parts(&mut buyer, &state)
            .await
            .expect_err("buyer is not an operator");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let mut anonymous = parts(Request::builder());
        let err = Operator::from_request_parts(&mut anonymous, &state)
            .await
            .expect_err("anonymous is not an operator");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
