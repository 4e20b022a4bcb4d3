//! Purchase endpoints.
//!
//! `POST /purchase` commits inline in [`DispatchMode::Synchronous`] and
//! answers `201` with the order, or enqueues in [`DispatchMode::Queued`] and
//! answers `202` with `{"status":"pending"}`. Queued buyers then poll
//! `GET /purchase-result?item_id=`.

use crate::WebResult;
use crate::extractors::Caller;
use crate::state::{AppState, DispatchMode};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flashgate_core::{ItemId, Money, Order, OrderId, PurchaseResult};
use serde::{Deserialize, Serialize};

/// Body of `POST /purchase`.
#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    /// Item to buy.
    pub item_id: ItemId,
    /// Token from `POST /purchase-path`.
    pub token: String,
}

/// A committed purchase.
#[derive(Debug, Serialize)]
pub struct PlacedOrder {
    /// The new order.
    pub order_id: OrderId,
    /// Item bought.
    pub item_id: ItemId,
    /// Price charged.
    pub price: Money,
}

impl From<Order> for PlacedOrder {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            item_id: order.item_id,
            price: order.price,
        }
    }
}

/// Query of `GET /purchase-result`.
#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    /// Item that was requested.
    pub item_id: i64,
}

/// Response of `GET /purchase/check/{item_id}`.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    /// Item checked.
    pub item_id: ItemId,
    /// Whether the caller owns an order for it.
    pub purchased: bool,
    /// The order, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

/// `POST /purchase`
///
/// # Errors
///
/// Any pipeline rejection, mapped by [`AppError`](crate::AppError).
pub async fn purchase(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(body): Json<PurchaseBody>,
) -> WebResult<Response> {
    match state.mode {
        DispatchMode::Synchronous => {
            let order = state.sale.purchase(&ctx, body.item_id, &body.token).await?;
            tracing::info!(
                correlation_id = %ctx.correlation_id,
                order_id = %order.id,
                item_id = %order.item_id,
                "Order placed"
            );
            Ok((StatusCode::CREATED, Json(PlacedOrder::from(order))).into_response())
        }
        DispatchMode::Queued => {
            let result = state
                .sale
                .purchase_queued(&ctx, body.item_id, &body.token)
                .await?;
            Ok((StatusCode::ACCEPTED, Json(result)).into_response())
        }
    }
}

/// `GET /purchase-result?item_id=`
///
/// # Errors
///
/// `RATE_LIMITED` when polled faster than the minimum interval.
pub async fn purchase_result(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Query(query): Query<ResultQuery>,
) -> WebResult<Json<PurchaseResult>> {
    let result = state
        .sale
        .purchase_result(&ctx, ItemId(query.item_id))
        .await?;
    Ok(Json(result))
}

/// `GET /purchase/check/{item_id}`
///
/// # Errors
///
/// Access-policy rejections or infrastructure failure.
pub async fn check_purchase(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(item_id): Path<i64>,
) -> WebResult<Json<CheckResponse>> {
    let item_id = ItemId(item_id);
    let order_id = state.sale.check_purchase(&ctx, item_id).await?;
    Ok(Json(CheckResponse {
        item_id,
        purchased: order_id.is_some(),
        order_id,
    }))
}
