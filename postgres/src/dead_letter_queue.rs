//! Dead Letter Queue (DLQ) for purchase messages.
//!
//! Provides persistent storage of purchase messages that could not be
//! processed, so that no admitted request silently vanishes. Operators list
//! pending entries, reconcile them, and close them as resolved or discarded.

use crate::db_err;
use chrono::{DateTime, Utc};
use flashgate_core::providers::{
    DeadLetter, DeadLetterArchive, DeadLetterEntry, DeadLetterSink, DeadLetterStatus,
    ProviderFuture,
};
use flashgate_core::{PurchaseRequest, StoreError};
use sqlx::PgPool;
use sqlx::types::Json;

const ENTRY_COLUMNS: &str = "id, payload, request, reason, delivery_count, failed_at, status, closed_at, closed_by, notes";

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: i64,
    payload: Vec<u8>,
    request: Option<Json<PurchaseRequest>>,
    reason: String,
    delivery_count: i32,
    failed_at: DateTime<Utc>,
    status: String,
    closed_at: Option<DateTime<Utc>>,
    closed_by: Option<String>,
    notes: Option<String>,
}

impl TryFrom<EntryRow> for DeadLetterEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let status = DeadLetterStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
            key: format!("dead_letters:{}", row.id),
            reason: format!("Invalid DLQ status: {}", row.status),
        })?;

        Ok(Self {
            id: row.id,
            letter: DeadLetter {
                payload: row.payload,
                request: row.request.map(|Json(request)| request),
                reason: row.reason,
                delivery_count: u32::try_from(row.delivery_count).unwrap_or(0),
                failed_at: row.failed_at,
            },
            status,
            closed_at: row.closed_at,
            closed_by: row.closed_by,
            notes: row.notes,
        })
    }
}

/// `PostgreSQL`-based Dead Letter Queue for purchase messages.
///
/// # Example
///
/// ```no_run
/// use flashgate_postgres::DeadLetterQueue;
/// use flashgate_core::providers::{DeadLetterArchive, DeadLetterStatus};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// let pending = dlq.list(DeadLetterStatus::Pending, 100).await?;
/// println!("Pending failures: {}", pending.len());
///
/// dlq.close(pending[0].id, DeadLetterStatus::Resolved, "ops", Some("refunded")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a dead letter and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the insert fails.
    pub async fn add_entry(&self, letter: &DeadLetter) -> Result<i64, StoreError> {
        let delivery_count = i32::try_from(letter.delivery_count).unwrap_or(i32::MAX);
        let id: (i64,) = sqlx::query_as(
            r"
            INSERT INTO dead_letters (payload, request, reason, delivery_count, failed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(&letter.payload)
        .bind(letter.request.as_ref().map(Json))
        .bind(&letter.reason)
        .bind(delivery_count)
        .bind(letter.failed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to insert dead letter"))?;

        tracing::warn!(
            dlq_id = id.0,
            request_id = ?letter.request.as_ref().map(|r| r.request_id),
            reason = %letter.reason,
            delivery_count = letter.delivery_count,
            "Purchase message added to Dead Letter Queue"
        );

        Ok(id.0)
    }

    /// List entries by status, oldest first (FIFO processing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the query fails.
    pub async fn list_by_status(
        &self,
        status: DeadLetterStatus,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM dead_letters WHERE status = $1 ORDER BY failed_at ASC, id ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list dead letters"))?;

        rows.into_iter().map(DeadLetterEntry::try_from).collect()
    }

    /// Get a specific entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the query fails.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<DeadLetterEntry>, StoreError> {
        let row: Option<EntryRow> =
            sqlx::query_as(&format!("SELECT {ENTRY_COLUMNS} FROM dead_letters WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load dead letter"))?;

        row.map(DeadLetterEntry::try_from).transpose()
    }

    /// Close a pending entry.
    ///
    /// Returns `false` if no pending entry has this id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the update fails.
    pub async fn update_status(
        &self,
        id: i64,
        status: DeadLetterStatus,
        closed_by: &str,
        notes: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE dead_letters
            SET status = $1, closed_at = NOW(), closed_by = $2, notes = $3
            WHERE id = $4 AND status = 'pending'
            ",
        )
        .bind(status.as_str())
        .bind(closed_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to update dead letter"))?;

        let closed = result.rows_affected() == 1;
        if closed {
            tracing::info!(dlq_id = id, status = status.as_str(), closed_by, "DLQ entry closed");
        }
        Ok(closed)
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.add_entry(letter).await?;
            Ok(())
        })
    }
}

impl DeadLetterArchive for DeadLetterQueue {
    fn list(&self, status: DeadLetterStatus, limit: usize) -> ProviderFuture<'_, Vec<DeadLetterEntry>> {
        Box::pin(self.list_by_status(status, limit))
    }

    fn entry(&self, id: i64) -> ProviderFuture<'_, Option<DeadLetterEntry>> {
        Box::pin(self.get_by_id(id))
    }

    fn close<'a>(
        &'a self,
        id: i64,
        status: DeadLetterStatus,
        closed_by: &'a str,
        notes: Option<&'a str>,
    ) -> ProviderFuture<'a, bool> {
        Box::pin(self.update_status(id, status, closed_by, notes))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    fn row(status: &str) -> EntryRow {
        EntryRow {
            id: 3,
            payload: b"{}".to_vec(),
            request: None,
            reason: "undecodable payload".into(),
            delivery_count: 1,
            failed_at: Utc::now(),
            status: status.into(),
            closed_at: None,
            closed_by: None,
            notes: None,
        }
    }

    #[test]
    fn row_converts_to_entry() {
        let entry = DeadLetterEntry::try_from(row("pending")).unwrap();
        assert_eq!(entry.status, DeadLetterStatus::Pending);
        assert_eq!(entry.letter.delivery_count, 1);
    }

    #[test]
    fn invalid_status_is_corrupt() {
        assert!(matches!(
            DeadLetterEntry::try_from(row("processing")),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
