//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod catalog;
pub mod challenge;
pub mod dead_letters;
pub mod health;
pub mod orders;
pub mod purchase;

// Re-export common handler utilities
pub use health::health_check;
