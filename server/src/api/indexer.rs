//! Indexer status and maintenance.
//!
//! - GET /api/indexer/status - Health snapshot
//! - POST /api/indexer/rescan - Re-process a block range
//! - POST /api/tickets/:id/refresh - Re-derive one ticket from the ledger

use crate::error::AppError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use gatepass_core::{BlockNumber, TicketId};
use gatepass_indexer::BatchReport;
use serde::{Deserialize, Serialize};

/// Indexer health snapshot.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Whether the polling loop is alive
    pub running: bool,
    /// Highest block fully processed, if any
    pub last_processed_block: Option<BlockNumber>,
    /// Ledger node the indexer reads from
    pub ledger_endpoint: String,
}

/// Inclusive block range to re-process.
#[derive(Debug, Deserialize)]
pub struct RescanBody {
    /// First block
    pub from: BlockNumber,
    /// Last block
    pub to: BlockNumber,
}

/// Outcome counts of a rescan.
#[derive(Debug, Serialize)]
pub struct RescanResponse {
    /// Events that changed the store
    pub applied: usize,
    /// Events the store already reflected
    pub skipped: usize,
    /// Ticket id corrections
    pub corrected: usize,
    /// Events with no matching purchase
    pub unmatched: usize,
    /// Logs that could not be decoded
    pub malformed: usize,
    /// Events whose handler failed
    pub failed: usize,
}

impl From<BatchReport> for RescanResponse {
    fn from(report: BatchReport) -> Self {
        Self {
            applied: report.applied,
            skipped: report.skipped,
            corrected: report.corrected,
            unmatched: report.unmatched,
            malformed: report.malformed,
            failed: report.failed,
        }
    }
}

/// Result of a single-ticket refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Ticket id
    pub ticket_id: TicketId,
    /// Purchase records whose status moved forward
    pub updated: usize,
}

/// Report indexer health.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.indexer.status().await;
    Json(StatusResponse {
        running: status.running,
        last_processed_block: status.last_processed_block,
        ledger_endpoint: status.ledger_endpoint,
    })
}

/// Re-process `[from, to]`. The cursor is left where it is.
///
/// # Errors
///
/// Returns 400 for an inverted range, 503 if the ledger is unreachable.
pub async fn rescan(
    State(state): State<AppState>,
    Json(body): Json<RescanBody>,
) -> Result<Json<RescanResponse>, AppError> {
    let report = state.indexer.rescan(body.from, body.to).await?;
    Ok(Json(report.into()))
}

/// Re-derive one ticket's purchase status from the ledger.
///
/// # Errors
///
/// Returns 503 if the ledger or the store is unavailable.
pub async fn refresh_ticket(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RefreshResponse>, AppError> {
    let ticket_id = TicketId::new(id);
    let updated = state.indexer.refresh_ticket(ticket_id).await?;
    Ok(Json(RefreshResponse { ticket_id, updated }))
}
