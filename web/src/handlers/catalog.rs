//! Catalog endpoints: `GET /items` and `GET /items/{id}`.

use crate::WebResult;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use flashgate_core::ItemId;
use flashgate_runtime::ItemView;

/// `GET /items`
///
/// # Errors
///
/// Access-policy rejections or infrastructure failure.
pub async fn list_items(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> WebResult<Json<Vec<ItemView>>> {
    Ok(Json(state.sale.items(&ctx).await?))
}

/// `GET /items/{id}`
///
/// # Errors
///
/// `ITEM_NOT_FOUND` for an unknown id.
pub async fn get_item(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<i64>,
) -> WebResult<Json<ItemView>> {
    Ok(Json(state.sale.item(&ctx, ItemId(id)).await?))
}
