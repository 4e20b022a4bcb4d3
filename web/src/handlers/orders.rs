//! The caller's orders: `GET /orders` (newest first) and `GET /orders/{id}`.

use crate::WebResult;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use flashgate_core::{Order, OrderId};

/// `GET /orders`
///
/// # Errors
///
/// `UNAUTHENTICATED` for anonymous callers.
pub async fn list_orders(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> WebResult<Json<Vec<Order>>> {
    Ok(Json(state.sale.orders(&ctx).await?))
}

/// `GET /orders/{id}`
///
/// # Errors
///
/// `ORDER_NOT_FOUND` if the order does not exist or belongs to someone else.
pub async fn get_order(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<i64>,
) -> WebResult<Json<Order>> {
    Ok(Json(state.sale.order(&ctx, OrderId(id)).await?))
}
