//! Error types for the admission, inventory-control and order-commit pipeline.

use crate::types::OrderId;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, FlashSaleError>;

/// Every way a flash-sale request can be turned away.
///
/// Each variant maps to a stable numeric [`code`](Self::code) and string
/// [`kind`](Self::kind) so that a client can tell "sold out" from
/// "already bought" from "bot-suspected".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlashSaleError {
    // ═══════════════════════════════════════════════════════════
    // Identity and gating
    // ═══════════════════════════════════════════════════════════

    /// No resolved identity on the request.
    #[error("Authentication required")]
    Unauthenticated,

    /// Too many requests from this identity for this endpoint.
    #[error("Too many requests, please retry after {retry_after:?}")]
    RateLimited {
        /// Time until the current window rolls over.
        retry_after: Duration,
    },

    /// The challenge answer was wrong, expired, or already used.
    #[error("Invalid challenge answer")]
    InvalidChallenge,

    /// The purchase path token was missing, wrong, expired, or already used.
    #[error("Invalid purchase path")]
    InvalidPath,

    // ═══════════════════════════════════════════════════════════
    // Catalog
    // ═══════════════════════════════════════════════════════════

    /// The item does not exist.
    #[error("Item not found")]
    ItemNotFound,

    /// The item exists but its sale window is not open.
    #[error("Sale is not active for this item")]
    SaleNotActive,

    /// The order does not exist or is not owned by the caller.
    #[error("Order not found")]
    OrderNotFound,

    // ═══════════════════════════════════════════════════════════
    // Inventory
    // ═══════════════════════════════════════════════════════════

    /// No stock left (advisory counter or authoritative row).
    #[error("Sold out")]
    NoStock,

    /// The caller already owns an order for this item.
    #[error("Already purchased (order {order_id})")]
    AlreadyPurchased {
        /// The order the caller already owns.
        order_id: OrderId,
    },

    /// The per-item lock could not be acquired after one retry.
    #[error("Item is busy, please retry")]
    LockTimeout,

    /// The authoritative conditional decrement affected zero rows while the
    /// lock was held.
    #[error("Commit failed: no authoritative stock")]
    CommitFailure,

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════

    /// A backing store could not be reached or misbehaved.
    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),
}

impl FlashSaleError {
    /// Stable numeric code exposed to clients.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Unauthenticated => 500_210,
            Self::RateLimited { .. } => 500_220,
            Self::InvalidChallenge => 500_230,
            Self::InvalidPath => 500_231,
            Self::ItemNotFound => 500_300,
            Self::SaleNotActive => 500_301,
            Self::OrderNotFound => 500_310,
            Self::NoStock => 500_500,
            Self::AlreadyPurchased { .. } => 500_501,
            Self::LockTimeout => 500_502,
            Self::CommitFailure => 500_503,
            Self::Infrastructure(_) => 500_000,
        }
    }

    /// Stable machine-readable kind exposed to clients.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::InvalidChallenge => "INVALID_CHALLENGE",
            Self::InvalidPath => "INVALID_PATH",
            Self::ItemNotFound => "ITEM_NOT_FOUND",
            Self::SaleNotActive => "SALE_NOT_ACTIVE",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::NoStock => "NO_STOCK",
            Self::AlreadyPurchased { .. } => "ALREADY_PURCHASED",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::CommitFailure => "COMMIT_FAILURE",
            Self::Infrastructure(_) => "INFRASTRUCTURE",
        }
    }

    /// Returns `true` if the client may retry the same request.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flashgate_core::FlashSaleError;
    /// assert!(FlashSaleError::LockTimeout.is_retryable());
    /// assert!(!FlashSaleError::NoStock.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout | Self::Infrastructure(_))
    }

    /// Returns `true` if the request was turned away as suspected automation.
    #[must_use]
    pub const fn is_bot_suspected(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::InvalidChallenge | Self::InvalidPath
        )
    }

    /// Returns `true` for "there is nothing left to buy".
    ///
    /// `CommitFailure` is treated the same as `NoStock`.
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        matches!(self, Self::NoStock | Self::CommitFailure)
    }
}

/// Failure of a backing store (key/expiry store, relational store, broker).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored value had an unexpected shape.
    #[error("Corrupt value at {key}: {reason}")]
    Corrupt {
        /// Key or row that held the value.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl From<StoreError> for FlashSaleError {
    fn from(err: StoreError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}
