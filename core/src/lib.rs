//! # Flashgate Core
//!
//! Domain types, error taxonomy and collaborator traits for the Flashgate
//! flash-sale engine.
//!
//! The engine admits, gates, reserves and commits purchases of a
//! limited-stock item while a very large number of buyers request it at
//! once. This crate contains no I/O: everything that touches a backing
//! store is expressed as a trait in [`providers`] and implemented by the
//! `flashgate-redis`, `flashgate-postgres` and `flashgate-redpanda` crates
//! (or by the in-memory doubles in `flashgate-testing`).
//!
//! ## Pipeline
//!
//! ```text
//! request ─► access guard ─► challenge gate ─► stock gate ─► lock ─► commit
//!                                                      └──► dispatch queue ─► worker ─► commit
//! ```
//!
//! - The **access guard** throttles per (endpoint, user) using [`config::AccessPolicy`]
//! - The **challenge gate** issues a one-time puzzle and a one-time purchase path token
//! - The **stock gate** filters requests against an advisory stock counter
//! - The **lock** serializes commits per item
//! - The **commit** is one transaction guarded by a conditional decrement
//!
//! The authoritative stock row is the only thing that decides a sale; every
//! earlier stage may wrongly admit a request but never wrongly sells.

pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod providers;
pub mod types;

pub use config::{AccessPolicy, Endpoint, FlashSaleSettings};
pub use context::RequestContext;
pub use environment::{Clock, SystemClock};
pub use error::{FlashSaleError, Result, StoreError};
pub use types::{
    DispatchOutcome, Item, ItemId, Money, Order, OrderId, OrderStatus, PurchaseRequest,
    PurchaseResult, SaleStatus, SaleWindow, UserId,
};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
