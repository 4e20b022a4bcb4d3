//! Domain types for the flash-sale engine.
//!
//! Identifiers are thin newtypes over the relational store's `BIGINT` keys so
//! that a `UserId` can never be passed where an `ItemId` is expected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a resolved buyer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a promoted item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a committed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, (self.0 % 100).abs())
    }
}

// ============================================================================
// Sale window
// ============================================================================

/// The scheduled window during which an item can be bought.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleWindow {
    /// Inclusive start of the sale.
    pub start: DateTime<Utc>,
    /// Exclusive end of the sale.
    pub end: DateTime<Utc>,
}

/// Where `now` falls relative to a [`SaleWindow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaleStatus {
    /// The sale has not opened yet.
    Upcoming {
        /// Whole seconds until the sale opens.
        starts_in_secs: i64,
    },
    /// The sale is open.
    Active {
        /// Whole seconds until the sale closes.
        ends_in_secs: i64,
    },
    /// The sale has closed.
    Ended,
}

impl SaleWindow {
    /// Create a window from explicit bounds.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Create a window that opens at `start` and lasts `length`.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start,
            end: start + length,
        }
    }

    /// Classify `now` against the window.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> SaleStatus {
        if now < self.start {
            SaleStatus::Upcoming {
                starts_in_secs: (self.start - now).num_seconds(),
            }
        } else if now < self.end {
            SaleStatus::Active {
                ends_in_secs: (self.end - now).num_seconds(),
            }
        } else {
            SaleStatus::Ended
        }
    }

    /// Returns `true` if purchases are accepted at `now`.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status_at(now), SaleStatus::Active { .. })
    }
}

// ============================================================================
// Catalog and orders
// ============================================================================

/// Authoritative stock record of a promoted item.
///
/// `remaining_stock` is only ever decremented by the guarded conditional
/// update in the inventory store and never goes below zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Flash-sale price.
    pub price: Money,
    /// Units left for sale.
    pub remaining_stock: i64,
    /// When the item can be bought.
    pub sale_window: SaleWindow,
}

/// Lifecycle of an order. Only `Unpaid` is produced by this engine; the
/// later states are driven by the payment flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, waiting for payment.
    Unpaid,
    /// Paid.
    Paid,
    /// Cancelled by the payment flow or an operator.
    Cancelled,
}

impl OrderStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(Self::Unpaid),
            "paid" => Some(Self::Paid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A purchase record. Exactly one exists per completed (user, item) purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Item bought.
    pub item_id: ItemId,
    /// Item name at time of purchase.
    pub item_name: String,
    /// Price paid per unit.
    pub price: Money,
    /// Always 1 for flash-sale orders.
    pub quantity: i32,
    /// Current status.
    pub status: OrderStatus,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Set by the payment flow.
    pub paid_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Asynchronous dispatch
// ============================================================================

/// Message placed on the dispatch queue once a request has been admitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// Unique id of this request, used for log correlation.
    pub request_id: Uuid,
    /// Buyer.
    pub user_id: UserId,
    /// Item requested.
    pub item_id: ItemId,
    /// Admission time.
    pub admitted_at: DateTime<Utc>,
}

impl PurchaseRequest {
    /// Create a request admitted at `admitted_at`.
    #[must_use]
    pub fn new(user_id: UserId, item_id: ItemId, admitted_at: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id,
            item_id,
            admitted_at,
        }
    }
}

/// Outcome marker written by dispatch workers and read by result polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Accepted and waiting in the queue.
    Pending,
    /// Committed.
    Success {
        /// The committed order.
        order_id: OrderId,
    },
    /// Definitively failed (sold out, dead-lettered, or timed out).
    Failed,
}

/// What a client sees when polling for an asynchronous purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseResult {
    /// Still queued.
    Pending,
    /// Committed.
    Success {
        /// The committed order.
        order_id: OrderId,
    },
    /// No order will be produced for this request.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> SaleWindow {
        let start = DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();
        SaleWindow::starting_at(start, Duration::hours(1))
    }

    #[test]
    fn sale_window_classifies_time() {
        let w = window();

        assert_eq!(
            w.status_at(w.start - Duration::seconds(30)),
            SaleStatus::Upcoming { starts_in_secs: 30 }
        );
        assert!(w.is_open_at(w.start));
        assert_eq!(
            w.status_at(w.start + Duration::minutes(59)),
            SaleStatus::Active { ends_in_secs: 60 }
        );
        assert_eq!(w.status_at(w.end), SaleStatus::Ended);
        assert!(!w.is_open_at(w.end));
    }

    #[test]
    fn order_status_round_trips_through_db_representation() {
        for status in [OrderStatus::Unpaid, OrderStatus::Paid, OrderStatus::Cancelled] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(12_345).to_string(), "123.45");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn dispatch_outcome_json_is_tagged() {
        let json = serde_json::to_string(&DispatchOutcome::Success { order_id: OrderId(7) })
            .unwrap_or_default();
        assert_eq!(json, r#"{"status":"success","order_id":7}"#);
    }
}
