//! Challenge and purchase-path endpoints.
//!
//! - `POST /challenge` `{item_id}` → the puzzle
//! - `POST /challenge/verify` `{item_id, answer}` → `{ok}`
//! - `POST /purchase-path` `{item_id}` → `{token}`

use crate::WebResult;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{Json, extract::State};
use flashgate_core::ItemId;
use flashgate_runtime::Challenge;
use serde::{Deserialize, Serialize};

/// Body naming the item a step is for.
#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    /// Item the buyer wants.
    pub item_id: ItemId,
}

/// Body of `POST /challenge/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Item the challenge was issued for.
    pub item_id: ItemId,
    /// The buyer's answer.
    pub answer: String,
}

/// Result of a passed verification.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// Always `true`; a wrong answer is an error response.
    pub ok: bool,
}

/// A freshly issued purchase path token.
#[derive(Debug, Serialize)]
pub struct PathResponse {
    /// Opaque one-time token for `POST /purchase`.
    pub token: String,
}

/// `POST /challenge`
///
/// # Errors
///
/// Access-policy rejections, unknown item, or infrastructure failure.
pub async fn issue_challenge(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(request): Json<ItemRequest>,
) -> WebResult<Json<Challenge>> {
    let challenge = state.sale.issue_challenge(&ctx, request.item_id).await?;
    Ok(Json(challenge))
}

/// `POST /challenge/verify`
///
/// # Errors
///
/// `INVALID_CHALLENGE` for a wrong, expired or reused answer.
pub async fn verify_challenge(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(request): Json<VerifyRequest>,
) -> WebResult<Json<VerifyResponse>> {
    state
        .sale
        .verify_challenge(&ctx, request.item_id, &request.answer)
        .await?;
    Ok(Json(VerifyResponse { ok: true }))
}

/// `POST /purchase-path`
///
/// # Errors
///
/// `INVALID_CHALLENGE` if no verified challenge exists, `SALE_NOT_ACTIVE`
/// outside the sale window.
pub async fn issue_purchase_path(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(request): Json<ItemRequest>,
) -> WebResult<Json<PathResponse>> {
    let token = state.sale.issue_purchase_path(&ctx, request.item_id).await?;
    Ok(Json(PathResponse { token }))
}
