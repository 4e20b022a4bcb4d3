//! Operator endpoints for dead-lettered purchases.
//!
//! - `GET /admin/dead-letters?status=pending&limit=50`
//! - `GET /admin/dead-letters/{id}`
//! - `POST /admin/dead-letters/{id}/resolve` `{notes?}`
//! - `POST /admin/dead-letters/{id}/discard` `{notes?}`
//!
//! Every route requires an [`Operator`]: a resolved caller on the configured
//! operator list. Only pending entries can be closed; the operator is
//! recorded as `closed_by`.

use crate::WebResult;
use crate::error::AppError;
use crate::extractors::Operator;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use flashgate_core::providers::{DeadLetterEntry, DeadLetterStatus};
use serde::Deserialize;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Query of the list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `pending` (default), `resolved` or `discarded`.
    pub status: Option<String>,
    /// Page size, capped at 500.
    pub limit: Option<usize>,
}

/// Body of the resolve and discard endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct CloseRequest {
    /// Free-form operator notes.
    pub notes: Option<String>,
}

/// `GET /admin/dead-letters`
///
/// # Errors
///
/// `BAD_REQUEST` for an unknown status.
pub async fn list_dead_letters(
    State(state): State<AppState>,
    _operator: Operator,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<Vec<DeadLetterEntry>>> {
    let status = match query.status.as_deref() {
        None => DeadLetterStatus::Pending,
        Some(raw) => DeadLetterStatus::parse(raw)
            .ok_or_else(|| AppError::bad_request(format!("Unknown status '{raw}'")))?,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    Ok(Json(state.dead_letters.list(status, limit).await?))
}

/// `GET /admin/dead-letters/{id}`
///
/// # Errors
///
/// `NOT_FOUND` for an unknown id.
pub async fn get_dead_letter(
    State(state): State<AppState>,
    _operator: Operator,
    Path(id): Path<i64>,
) -> WebResult<Json<DeadLetterEntry>> {
    state
        .dead_letters
        .entry(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Dead letter", id))
}

/// `POST /admin/dead-letters/{id}/resolve`
///
/// # Errors
///
/// `NOT_FOUND` for an unknown id, `CONFLICT` if already closed.
pub async fn resolve_dead_letter(
    state: State<AppState>,
    operator: Operator,
    id: Path<i64>,
    body: Option<Json<CloseRequest>>,
) -> WebResult<Json<DeadLetterEntry>> {
    close(state, operator, id, body, DeadLetterStatus::Resolved).await
}

/// `POST /admin/dead-letters/{id}/discard`
///
/// # Errors
///
/// `NOT_FOUND` for an unknown id, `CONFLICT` if already closed.
pub async fn discard_dead_letter(
    state: State<AppState>,
    operator: Operator,
    id: Path<i64>,
    body: Option<Json<CloseRequest>>,
) -> WebResult<Json<DeadLetterEntry>> {
    close(state, operator, id, body, DeadLetterStatus::Discarded).await
}

async fn close(
    State(state): State<AppState>,
    Operator { user_id, ctx }: Operator,
    Path(id): Path<i64>,
    body: Option<Json<CloseRequest>>,
    status: DeadLetterStatus,
) -> WebResult<Json<DeadLetterEntry>> {
    let operator = user_id.to_string();
    let notes = body.and_then(|Json(b)| b.notes);

    let closed = state
        .dead_letters
        .close(id, status, &operator, notes.as_deref())
        .await?;

    let entry = state
        .dead_letters
        .entry(id)
        .await?
        .ok_or_else(|| AppError::not_found("Dead letter", id))?;

    if !closed {
        return Err(AppError::conflict(format!(
            "Dead letter {id} is already {}",
            entry.status.as_str()
        )));
    }

    tracing::info!(
        dead_letter_id = id,
        status = status.as_str(),
        closed_by = %operator,
        correlation_id = %ctx.correlation_id,
        "Dead letter closed"
    );
    Ok(Json(entry))
}
