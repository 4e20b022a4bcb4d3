//! Error types for web handlers.
//!
//! Every [`FlashSaleError`] maps onto an HTTP status and a JSON body
//! `{code, message, error_code}` where `code` is the stable
//! [`kind`](FlashSaleError::kind) and `error_code` the stable numeric
//! [`code`](FlashSaleError::code). Clients branch on either, never on the
//! message. An `ALREADY_PURCHASED` body also carries the existing
//! `order_id`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use flashgate_core::{FlashSaleError, OrderId, StoreError};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Numeric code of a pipeline rejection
    error_code: Option<u32>,
    /// Order the caller already owns
    order_id: Option<OrderId>,
    /// Sent back as `Retry-After` when set
    retry_after: Option<Duration>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            error_code: None,
            order_id: None,
            retry_after: None,
        }
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            message.into(),
            "FORBIDDEN".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            message.into(),
            "CONFLICT".to_string(),
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable string code of this error.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Existing order reported with an `ALREADY_PURCHASED` rejection.
    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }
}

/// HTTP status for a pipeline rejection.
const fn status_for(err: &FlashSaleError) -> StatusCode {
    match err {
        FlashSaleError::Unauthenticated => StatusCode::UNAUTHORIZED,
        FlashSaleError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        FlashSaleError::InvalidChallenge | FlashSaleError::InvalidPath => StatusCode::FORBIDDEN,
        FlashSaleError::ItemNotFound | FlashSaleError::OrderNotFound => StatusCode::NOT_FOUND,
        FlashSaleError::SaleNotActive
        | FlashSaleError::NoStock
        | FlashSaleError::CommitFailure
        | FlashSaleError::AlreadyPurchased { .. } => StatusCode::CONFLICT,
        FlashSaleError::LockTimeout | FlashSaleError::Infrastructure(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl From<FlashSaleError> for AppError {
    fn from(err: FlashSaleError) -> Self {
        let status = status_for(&err);
        let message = match &err {
            FlashSaleError::Infrastructure(detail) => {
                tracing::error!(error = %detail, "Infrastructure failure");
                "Service temporarily unavailable, please retry".to_string()
            }
            other => other.to_string(),
        };
        let retry_after = match &err {
            FlashSaleError::RateLimited { retry_after } => Some(*retry_after),
            FlashSaleError::LockTimeout | FlashSaleError::Infrastructure(_) => {
                Some(Duration::from_secs(1))
            }
            _ => None,
        };
        let order_id = match &err {
            FlashSaleError::AlreadyPurchased { order_id } => Some(*order_id),
            _ => None,
        };

        Self {
            status,
            message,
            code: err.kind().to_string(),
            error_code: Some(err.code()),
            order_id,
            retry_after,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        FlashSaleError::from(err).into()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Numeric code of a pipeline rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<u32>,
    /// Order the caller already owns.
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<OrderId>,
}

/// Whole seconds, rounded up, never zero.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            error_code: self.error_code,
            order_id: self.order_id,
        };
        let mut response = (self.status, Json(body)).into_response();

        if let Some(wait) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(wait)));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Dead letter", "123");
        assert_eq!(err.to_string(), "[NOT_FOUND] Dead letter with id 123 not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rejections_are_distinguishable() {
        let sold_out = AppError::from(FlashSaleError::NoStock);
        let owned = AppError::from(FlashSaleError::AlreadyPurchased { order_id: OrderId(9) });
        let bot = AppError::from(FlashSaleError::InvalidPath);

        assert_eq!(sold_out.status, StatusCode::CONFLICT);
        assert_eq!(owned.status, StatusCode::CONFLICT);
        assert_ne!(sold_out.code, owned.code);
        assert_eq!(bot.status, StatusCode::FORBIDDEN);
        assert_eq!(bot.error_code, Some(500_231));
    }

    #[test]
    fn test_already_purchased_carries_order_id() {
        let owned = AppError::from(FlashSaleError::AlreadyPurchased { order_id: OrderId(9) });
        assert_eq!(owned.order_id(), Some(OrderId(9)));
        assert_eq!(AppError::from(FlashSaleError::NoStock).order_id(), None);
    }

    #[test]
    fn test_infrastructure_detail_is_not_exposed() {
        let err = AppError::from(StoreError::Unavailable("redis: connection refused".into()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code, "INFRASTRUCTURE");
        assert!(!err.message.contains("redis"));
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::from(FlashSaleError::RateLimited {
            retry_after: Duration::from_millis(1_200),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from(2_u64))
        );
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::from_millis(3_001)), 4);
    }
}
