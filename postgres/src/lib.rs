//! `PostgreSQL` store for GatePass.
//!
//! [`PostgresStore`] implements every store trait from `gatepass-core` over
//! one connection pool:
//!
//! - `PurchaseStore` on `purchases` (unique on `lower(tx_hash)`)
//! - `EventRecordStore` on `event_records`
//! - `EntryLog` on `entry_log` (partial unique index on
//!   `ticket_id WHERE scan_result = 'SUCCESS'`, append-only trigger)
//! - `CursorStore` on the singleton `indexer_cursor` row
//!
//! Uniqueness violations surface as `StoreError::Conflict` and
//! `EntryLogError::DuplicateSuccess` so callers can reclassify.
//!
//! # Example
//!
//! ```ignore
//! use gatepass_postgres::PostgresStore;
//!
//! let store = PostgresStore::connect("postgres://localhost/gatepass", 10).await?;
//! store.migrate().await?;
//! ```

mod cursor;
mod entry_log;
mod listings;
mod purchases;
mod rows;

use gatepass_core::store::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Whether `error` is a unique violation on `constraint`.
fn violates(error: &sqlx::Error, constraint: &str) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
