//! Entry log reads.
//!
//! - GET /api/tickets/:id/entries - Every scan attempt for a ticket
//! - GET /api/events/:name/guests - Admitted holders for an event

use crate::error::AppError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use gatepass_core::{EntryLogRecord, TicketId};
use serde::Serialize;

/// Scan history of one ticket.
#[derive(Debug, Serialize)]
pub struct TicketEntriesResponse {
    /// Ticket id
    pub ticket_id: TicketId,
    /// Attempts in scan order
    pub entries: Vec<EntryLogRecord>,
}

/// Admitted entries for one event.
#[derive(Debug, Serialize)]
pub struct GuestListResponse {
    /// Event name
    pub event_name: String,
    /// Number of holders admitted
    pub admitted: usize,
    /// `SUCCESS` entries in admission order
    pub entries: Vec<EntryLogRecord>,
}

/// List every scan attempt for a ticket.
///
/// # Errors
///
/// Returns 503 if the entry log cannot be read.
pub async fn ticket_entries(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TicketEntriesResponse>, AppError> {
    let ticket_id = TicketId::new(id);
    let entries = state.admission.entries_for_ticket(ticket_id).await?;
    Ok(Json(TicketEntriesResponse { ticket_id, entries }))
}

/// List admitted holders for an event.
///
/// # Errors
///
/// Returns 503 if the entry log cannot be read.
pub async fn guest_list(
    State(state): State<AppState>,
    Path(event_name): Path<String>,
) -> Result<Json<GuestListResponse>, AppError> {
    let entries = state.admission.guest_list(&event_name).await?;
    Ok(Json(GuestListResponse {
        event_name,
        admitted: entries.len(),
        entries,
    }))
}
