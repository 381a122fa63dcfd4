//! `EventRecordStore` over the `event_records` table.

use crate::rows::{to_db, EventRow};
use crate::PostgresStore;
use gatepass_core::ledger::BoxFuture;
use gatepass_core::store::{EventRecordStore, StoreError};
use gatepass_core::{Address, BlockNumber, EventRecord, TicketId};

impl EventRecordStore for PostgresStore {
    fn upsert(&self, record: EventRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let ticket_id = to_db(record.ticket_id.value(), "ticket_id").map_err(StoreError::Backend)?;
            let confirmed_block = record
                .confirmed_block
                .map(|block| to_db(block, "confirmed_block"))
                .transpose()
                .map_err(StoreError::Backend)?;

            sqlx::query(
                "INSERT INTO event_records (ticket_id, name, organizer, price, confirmed_block)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (ticket_id) DO UPDATE
                 SET name = EXCLUDED.name,
                     organizer = EXCLUDED.organizer,
                     price = EXCLUDED.price,
                     confirmed_block = EXCLUDED.confirmed_block",
            )
            .bind(ticket_id)
            .bind(&record.name)
            .bind(record.organizer.as_ref().map(Address::as_str))
            .bind(record.price.map(|p| p.to_string()))
            .bind(confirmed_block)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to upsert listing: {e}")))?;
            Ok(())
        })
    }

    fn find(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<EventRecord>, StoreError>> {
        Box::pin(async move {
            let Ok(id) = to_db(ticket_id.value(), "ticket_id") else {
                return Ok(None);
            };
            let row: Option<EventRow> = sqlx::query_as(
                "SELECT ticket_id, name, organizer, price, confirmed_block
                 FROM event_records WHERE ticket_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to find listing: {e}")))?;

            row.map(|r| r.into_record().map_err(StoreError::Corrupt))
                .transpose()
        })
    }

    fn confirm(
        &self,
        ticket_id: TicketId,
        organizer: Address,
        price: Option<u128>,
        block: BlockNumber,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let id = to_db(ticket_id.value(), "ticket_id").map_err(StoreError::Backend)?;
            let block = to_db(block, "confirmed_block").map_err(StoreError::Backend)?;
            let result = sqlx::query(
                "UPDATE event_records
                 SET organizer = $2, price = $3, confirmed_block = $4
                 WHERE ticket_id = $1",
            )
            .bind(id)
            .bind(organizer.as_str())
            .bind(price.map(|p| p.to_string()))
            .bind(block)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to confirm listing: {e}")))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("listing {ticket_id}")));
            }
            Ok(())
        })
    }
}
