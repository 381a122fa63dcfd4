//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{entries, indexer, purchases, scan};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the complete Axum router.
///
/// Routes:
/// - `GET /health`, `GET /ready`
/// - `POST /api/scan`
/// - `GET /api/tickets/:id/entries`, `POST /api/tickets/:id/refresh`
/// - `GET /api/events/:name/guests`
/// - `GET /api/buyers/:address/purchases`
/// - `GET /api/indexer/status`, `POST /api/indexer/rescan`
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/scan", post(scan::scan))
        .route("/tickets/:id/entries", get(entries::ticket_entries))
        .route("/tickets/:id/refresh", post(indexer::refresh_ticket))
        .route("/events/:name/guests", get(entries::guest_list))
        .route("/buyers/:address/purchases", get(purchases::by_buyer))
        .route("/indexer/status", get(indexer::status))
        .route("/indexer/rescan", post(indexer::rescan));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .with_state(state)
}
