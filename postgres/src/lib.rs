//! `PostgreSQL` storage for Flashgate.
//!
//! - [`PostgresInventory`] - items, orders and the transactional purchase commit
//! - [`DeadLetterQueue`] - dead-lettered purchase messages for operator triage
//!
//! # Example
//!
//! ```no_run
//! use flashgate_postgres::{PostgresInventory, connect, migrate};
//!
//! # async fn example() -> Result<(), flashgate_core::StoreError> {
//! let pool = connect("postgres://localhost/flashgate", 20).await?;
//! migrate(&pool).await?;
//! let inventory = PostgresInventory::new(pool);
//! # Ok(())
//! # }
//! ```

pub mod dead_letter_queue;
pub mod inventory;

pub use dead_letter_queue::DeadLetterQueue;
pub use inventory::PostgresInventory;

use flashgate_core::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(db_err("Failed to connect to database"))
}

/// Apply the bundled schema migrations.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Map a database failure to [`StoreError::Unavailable`] with context.
pub(crate) fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| StoreError::Unavailable(format!("{context}: {e}"))
}
