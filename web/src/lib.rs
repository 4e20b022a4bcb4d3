//! Axum HTTP surface for the Flashgate flash-sale engine.
//!
//! Handlers are thin: they extract the [`Caller`] (resolved identity plus
//! correlation id), call one [`FlashSale`](flashgate_runtime::FlashSale)
//! method, and map the result. Every rejection becomes an [`AppError`] with
//! a stable code.
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | [`handlers::health::health_check`] |
//! | POST | `/challenge` | [`handlers::challenge::issue_challenge`] |
//! | POST | `/challenge/verify` | [`handlers::challenge::verify_challenge`] |
//! | POST | `/purchase-path` | [`handlers::challenge::issue_purchase_path`] |
//! | POST | `/purchase` | [`handlers::purchase::purchase`] |
//! | GET | `/purchase-result?item_id=` | [`handlers::purchase::purchase_result`] |
//! | GET | `/purchase/check/{item_id}` | [`handlers::purchase::check_purchase`] |
//! | GET | `/items`, `/items/{id}` | [`handlers::catalog`] |
//! | GET | `/orders`, `/orders/{id}` | [`handlers::orders`] |
//! | * | `/admin/dead-letters/...` | [`handlers::dead_letters`] |
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(sale, dead_letters).with_mode(DispatchMode::Queued);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, flashgate_web::router(state)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use handlers::{catalog, challenge, dead_letters, orders, purchase};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{
    Caller, CorrelationId, HeaderIdentity, IdentityResolver, Operator, USER_ID_HEADER,
};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use state::{AppState, DispatchMode};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the complete router over `state`.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/dead-letters", get(dead_letters::list_dead_letters))
        .route("/dead-letters/:id", get(dead_letters::get_dead_letter))
        .route(
            "/dead-letters/:id/resolve",
            post(dead_letters::resolve_dead_letter),
        )
        .route(
            "/dead-letters/:id/discard",
            post(dead_letters::discard_dead_letter),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        // Challenge flow
        .route("/challenge", post(challenge::issue_challenge))
        .route("/challenge/verify", post(challenge::verify_challenge))
        .route("/purchase-path", post(challenge::issue_purchase_path))
        // Purchase
        .route("/purchase", post(purchase::purchase))
        .route("/purchase-result", get(purchase::purchase_result))
        .route("/purchase/check/:item_id", get(purchase::check_purchase))
        // Catalog and orders
        .route("/items", get(catalog::list_items))
        .route("/items/:id", get(catalog::get_item))
        .route("/orders", get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .nest("/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
