//! `EntryLog` over the append-only `entry_log` table.

use crate::rows::{to_db, EntryRow, ENTRY_COLUMNS};
use crate::{violates, PostgresStore};
use gatepass_core::ledger::BoxFuture;
use gatepass_core::store::{EntryLog, EntryLogError};
use gatepass_core::{Address, EntryLogRecord, ScanResult, TicketId};
use tracing::debug;

const ONE_SUCCESS: &str = "entry_log_one_success";

fn entries(rows: Vec<EntryRow>) -> Result<Vec<EntryLogRecord>, EntryLogError> {
    rows.into_iter()
        .map(|row| row.into_record().map_err(EntryLogError::Corrupt))
        .collect()
}

fn backend(context: &str, error: &sqlx::Error) -> EntryLogError {
    EntryLogError::Backend(format!("{context}: {error}"))
}

impl EntryLog for PostgresStore {
    fn append(&self, record: EntryLogRecord) -> BoxFuture<'_, Result<(), EntryLogError>> {
        Box::pin(async move {
            let ticket_id =
                to_db(record.ticket_id.value(), "ticket_id").map_err(EntryLogError::Backend)?;

            sqlx::query(&format!(
                "INSERT INTO entry_log ({ENTRY_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ))
            .bind(record.entry_id.as_uuid())
            .bind(ticket_id)
            .bind(record.scan_time)
            .bind(record.scan_result.as_str())
            .bind(record.gatekeeper.as_str())
            .bind(record.location.as_deref())
            .bind(record.holder.as_ref().map(Address::as_str))
            .bind(record.event_name.as_deref())
            .bind(record.reason.as_deref())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if violates(&e, ONE_SUCCESS) {
                    debug!(ticket_id = %record.ticket_id, "SUCCESS already recorded");
                    EntryLogError::DuplicateSuccess(record.ticket_id)
                } else {
                    backend("Failed to append entry", &e)
                }
            })?;
            Ok(())
        })
    }

    fn prior_success(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Option<EntryLogRecord>, EntryLogError>> {
        Box::pin(async move {
            let Ok(id) = to_db(ticket_id.value(), "ticket_id") else {
                return Ok(None);
            };
            let row: Option<EntryRow> = sqlx::query_as(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entry_log
                 WHERE ticket_id = $1 AND scan_result = $2"
            ))
            .bind(id)
            .bind(ScanResult::Success.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend("Failed to read prior success", &e))?;

            row.map(|r| r.into_record().map_err(EntryLogError::Corrupt))
                .transpose()
        })
    }

    fn entries_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Vec<EntryLogRecord>, EntryLogError>> {
        Box::pin(async move {
            let Ok(id) = to_db(ticket_id.value(), "ticket_id") else {
                return Ok(Vec::new());
            };
            let rows: Vec<EntryRow> = sqlx::query_as(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entry_log
                 WHERE ticket_id = $1
                 ORDER BY scan_time, seq"
            ))
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("Failed to read entries", &e))?;

            entries(rows)
        })
    }

    fn successes_for_event(
        &self,
        event_name: &str,
    ) -> BoxFuture<'_, Result<Vec<EntryLogRecord>, EntryLogError>> {
        let event_name = event_name.to_string();
        Box::pin(async move {
            let rows: Vec<EntryRow> = sqlx::query_as(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entry_log
                 WHERE event_name = $1 AND scan_result = $2
                 ORDER BY scan_time, seq"
            ))
            .bind(event_name)
            .bind(ScanResult::Success.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend("Failed to read guest list", &e))?;

            entries(rows)
        })
    }
}
