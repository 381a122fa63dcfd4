//! Purchase reads.
//!
//! - GET /api/buyers/:address/purchases - A buyer's purchase records

use crate::error::AppError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use gatepass_core::{Address, PurchaseRecord};
use serde::Serialize;

/// Purchases of one buyer, newest first.
#[derive(Debug, Serialize)]
pub struct BuyerPurchasesResponse {
    /// Buyer address (lowercase)
    pub buyer: Address,
    /// Purchase records
    pub purchases: Vec<PurchaseRecord>,
}

/// List a buyer's purchases.
///
/// # Errors
///
/// Returns 400 for a malformed address, 503 if the store is unavailable.
pub async fn by_buyer(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BuyerPurchasesResponse>, AppError> {
    let buyer = Address::parse(&address)
        .map_err(|e| AppError::bad_request(format!("Invalid buyer: {e}")))?;
    let purchases = state.purchases.list_by_buyer(&buyer).await?;
    Ok(Json(BuyerPurchasesResponse { buyer, purchases }))
}
