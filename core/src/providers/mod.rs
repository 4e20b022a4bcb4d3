//! Collaborator traits consumed by the pipeline.
//!
//! Each trait abstracts one backing concern so the pipeline can run against
//! Redis/`PostgreSQL`/Redpanda in production and in-memory doubles in tests:
//!
//! - [`RateCounter`] - shared counter with expiry for request throttling
//! - [`ChallengeStore`] - one-time challenge answers and purchase path tokens
//! - [`StockCounter`] - advisory shared stock counter
//! - [`LockStore`] - set-if-absent lock with owner token and atomic release
//! - [`MarkerStore`] - completed-purchase markers and dispatch outcome markers
//! - [`InventoryStore`] - authoritative stock, orders and the transactional commit
//! - [`DispatchQueue`] / [`DeadLetterSink`] - at-least-once purchase queue
//! - [`DeadLetterArchive`] - dead letters kept for operator triage
//!
//! Methods return boxed futures so the traits stay object-safe and the
//! pipeline can hold `Arc<dyn Trait>` handles.

pub mod challenge_store;
pub mod dead_letter_archive;
pub mod dispatch_queue;
pub mod inventory;
pub mod lock;
pub mod marker_store;
pub mod rate_counter;
pub mod stock_counter;

pub use challenge_store::ChallengeStore;
pub use dead_letter_archive::{DeadLetterArchive, DeadLetterEntry, DeadLetterStatus};
pub use dispatch_queue::{
    DeadLetter, DeadLetterSink, Delivery, DeliveryStream, DispatchQueue, encode,
};
pub use inventory::{CommitOutcome, InventoryStore};
pub use lock::LockStore;
pub use marker_store::MarkerStore;
pub use rate_counter::{RateCounter, RateWindow};
pub use stock_counter::StockCounter;

use crate::error::StoreError;
use std::future::Future;
use std::pin::Pin;

/// Future returned by every provider method.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;
