//! # Flashgate Testing
//!
//! Testing utilities for the Flashgate flash-sale engine.
//!
//! This crate provides:
//! - In-memory implementations of every provider trait in
//!   [`flashgate_core::providers`], with expiry and fault injection
//! - A fixed clock and item fixtures
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use flashgate_testing::{fixtures, mocks::InMemoryInventory};
//! use flashgate_core::ItemId;
//!
//! let inventory = InMemoryInventory::new();
//! inventory.insert_item(fixtures::open_item(ItemId(1), 10));
//! assert_eq!(inventory.remaining_stock(ItemId(1)), Some(10));
//! ```

pub mod fixtures;
pub mod mocks;
pub mod strategies;

pub use mocks::{FixedClock, test_clock};

/// Install a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; silent by default.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
