//! # Flashgate Runtime
//!
//! The admission, inventory-control and order-commit pipeline.
//!
//! | Stage | Module |
//! |-------|--------|
//! | Per-endpoint throttling | [`rate_limit`] |
//! | Challenge and purchase path | [`challenge`] |
//! | Local flag / shared counter admission | [`stock_gate`] |
//! | Per-item distributed lock | [`lock`] |
//! | Transactional commit | [`committer`] |
//! | Queued mode and result polling | [`dispatcher`] |
//!
//! [`FlashSale`] wires them together behind one method per entry point.
//!
//! ## Example
//!
//! ```ignore
//! let sale = FlashSale::new(providers, &FlashSaleSettings::default());
//! sale.warm_up().await?;
//!
//! let ctx = RequestContext::authenticated(UserId(42));
//! let challenge = sale.issue_challenge(&ctx, ItemId(1)).await?;
//! sale.verify_challenge(&ctx, ItemId(1), &answer).await?;
//! let token = sale.issue_purchase_path(&ctx, ItemId(1)).await?;
//! let order = sale.purchase(&ctx, ItemId(1), &token).await?;
//! ```

pub mod challenge;
pub mod committer;
pub mod dispatcher;
pub mod lock;
pub mod metrics;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod stock_gate;

pub use challenge::{Challenge, ChallengeGate};
pub use committer::OrderCommitter;
pub use dispatcher::{DispatchDeps, Dispatcher};
pub use lock::{LockError, LockGuard, LockManager};
pub use rate_limit::AccessGuard;
pub use service::{FlashSale, ItemView, Providers};
pub use stock_gate::{Reservation, StockGate};
