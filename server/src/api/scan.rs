//! Scan submission.
//!
//! - POST /api/scan - Decide one QR scan at the gate

use crate::error::AppError;
use crate::server::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use gatepass_admission::AdmissionResponse;
use gatepass_core::Address;
use serde::Deserialize;

/// Request body for a scan.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody {
    /// Raw QR payload as read by the scanner
    pub qr_payload: String,
    /// Scanning gatekeeper's address
    pub gatekeeper: String,
    /// Gate or door label
    #[serde(default)]
    pub location: Option<String>,
}

/// Decide a scan.
///
/// Every readable request gets a decision. Retryable decisions (store
/// trouble) are returned with 503 so scanners can retry; all others with 200.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/scan \
///   -H 'content-type: application/json' \
///   -d '{"qrPayload":"{\"ticketId\":42,...}","gatekeeper":"0x…","location":"Gate 3"}'
/// ```
///
/// # Errors
///
/// Returns 400 if the gatekeeper address is malformed.
pub async fn scan(
    State(state): State<AppState>,
    Json(body): Json<ScanBody>,
) -> Result<(StatusCode, Json<AdmissionResponse>), AppError> {
    let gatekeeper = Address::parse(&body.gatekeeper)
        .map_err(|e| AppError::bad_request(format!("Invalid gatekeeper: {e}")))?;

    let response = state
        .admission
        .admit_qr(&body.qr_payload, gatekeeper, body.location)
        .await;

    let status = if response.retryable {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}
