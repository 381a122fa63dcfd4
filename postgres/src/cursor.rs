//! `CursorStore` over the singleton `indexer_cursor` row.

use crate::rows::{from_db, to_db};
use crate::PostgresStore;
use chrono::{DateTime, Utc};
use gatepass_core::ledger::BoxFuture;
use gatepass_core::store::{CursorStore, StoreError};
use gatepass_core::IndexerCursor;

impl CursorStore for PostgresStore {
    fn load(&self) -> BoxFuture<'_, Result<Option<IndexerCursor>, StoreError>> {
        Box::pin(async move {
            let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
                "SELECT last_processed_block, updated_at FROM indexer_cursor WHERE id = 1",
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to load cursor: {e}")))?;

            row.map(|(block, updated_at)| {
                from_db(block, "last_processed_block")
                    .map(|block| IndexerCursor::new(block, updated_at))
                    .map_err(StoreError::Corrupt)
            })
            .transpose()
        })
    }

    fn save(&self, cursor: IndexerCursor) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let block = to_db(cursor.last_processed_block, "last_processed_block")
                .map_err(StoreError::Backend)?;

            // The stored block never moves backwards
            sqlx::query(
                "INSERT INTO indexer_cursor (id, last_processed_block, updated_at)
                 VALUES (1, $1, $2)
                 ON CONFLICT (id) DO UPDATE
                 SET last_processed_block = EXCLUDED.last_processed_block,
                     updated_at = EXCLUDED.updated_at
                 WHERE indexer_cursor.last_processed_block <= EXCLUDED.last_processed_block",
            )
            .bind(block)
            .bind(cursor.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to save cursor: {e}")))?;
            Ok(())
        })
    }
}
