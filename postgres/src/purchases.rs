//! `PurchaseStore` over the `purchases` table.

use crate::rows::{to_db, PurchaseRow, PURCHASE_COLUMNS};
use crate::{violates, PostgresStore};
use chrono::{DateTime, Utc};
use gatepass_core::ledger::BoxFuture;
use gatepass_core::store::{PurchaseStore, StoreError};
use gatepass_core::{Address, PurchaseId, PurchaseRecord, PurchaseStatus, TicketId, TxHash};
use tracing::debug;

fn records(rows: Vec<PurchaseRow>) -> Result<Vec<PurchaseRecord>, StoreError> {
    rows.into_iter()
        .map(|row| row.into_record().map_err(StoreError::Corrupt))
        .collect()
}

fn expect_one(rows_affected: u64, purchase_id: PurchaseId) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound(format!("purchase {purchase_id}")));
    }
    Ok(())
}

impl PurchaseStore for PostgresStore {
    fn insert(&self, record: PurchaseRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let ticket_id = to_db(record.ticket_id.value(), "ticket_id").map_err(StoreError::Backend)?;

            sqlx::query(&format!(
                "INSERT INTO purchases ({PURCHASE_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            ))
            .bind(record.purchase_id.as_uuid())
            .bind(ticket_id)
            .bind(record.tx_hash.as_str())
            .bind(record.buyer.as_str())
            .bind(record.buyer_email.as_deref())
            .bind(&record.event_name)
            .bind(record.price.map(|p| p.to_string()))
            .bind(record.status.as_str())
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if violates(&e, "purchases_tx_hash_key") {
                    debug!(tx_hash = %record.tx_hash, "Purchase already recorded");
                    StoreError::Conflict(format!("purchase for {} already exists", record.tx_hash))
                } else {
                    StoreError::Backend(format!("Failed to insert purchase: {e}"))
                }
            })?;
            Ok(())
        })
    }

    fn find_by_tx_hash(
        &self,
        tx_hash: &TxHash,
    ) -> BoxFuture<'_, Result<Option<PurchaseRecord>, StoreError>> {
        let tx_hash = tx_hash.clone();
        Box::pin(async move {
            let row: Option<PurchaseRow> = sqlx::query_as(&format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE lower(tx_hash) = lower($1)"
            ))
            .bind(tx_hash.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to find purchase: {e}")))?;

            row.map(|r| r.into_record().map_err(StoreError::Corrupt))
                .transpose()
        })
    }

    fn find_by_ticket_id(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseRecord>, StoreError>> {
        Box::pin(async move {
            let Ok(id) = to_db(ticket_id.value(), "ticket_id") else {
                return Ok(Vec::new());
            };
            let rows: Vec<PurchaseRow> = sqlx::query_as(&format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases
                 WHERE ticket_id = $1
                 ORDER BY created_at DESC, purchase_id"
            ))
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to find purchases: {e}")))?;

            records(rows)
        })
    }

    fn list_by_buyer(
        &self,
        buyer: &Address,
    ) -> BoxFuture<'_, Result<Vec<PurchaseRecord>, StoreError>> {
        let buyer = buyer.clone();
        Box::pin(async move {
            let rows: Vec<PurchaseRow> = sqlx::query_as(&format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases
                 WHERE buyer = $1
                 ORDER BY created_at DESC, purchase_id"
            ))
            .bind(buyer.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to list purchases: {e}")))?;

            records(rows)
        })
    }

    fn update_ticket_id(
        &self,
        purchase_id: PurchaseId,
        ticket_id: TicketId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let id = to_db(ticket_id.value(), "ticket_id").map_err(StoreError::Backend)?;
            let result = sqlx::query(
                "UPDATE purchases SET ticket_id = $2, updated_at = $3 WHERE purchase_id = $1",
            )
            .bind(purchase_id.as_uuid())
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to update ticket id: {e}")))?;

            expect_one(result.rows_affected(), purchase_id)
        })
    }

    fn update_status(
        &self,
        purchase_id: PurchaseId,
        from: PurchaseStatus,
        to: PurchaseStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE purchases SET status = $3, updated_at = $4
                 WHERE purchase_id = $1 AND status = $2",
            )
            .bind(purchase_id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to update status: {e}")))?;

            if result.rows_affected() > 0 {
                return Ok(true);
            }

            let exists: Option<(uuid::Uuid,)> =
                sqlx::query_as("SELECT purchase_id FROM purchases WHERE purchase_id = $1")
                    .bind(purchase_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::Backend(format!("Failed to update status: {e}")))?;

            match exists {
                Some(_) => {
                    debug!(%purchase_id, from = from.as_str(), "Status moved concurrently");
                    Ok(false)
                }
                None => Err(StoreError::NotFound(format!("purchase {purchase_id}"))),
            }
        })
    }
}
