//! Error type for HTTP handlers.
//!
//! Bridges store and indexer errors to JSON error responses through Axum's
//! `IntoResponse`. Admission decisions never pass through here; a rejected
//! scan is a successful response carrying an `INVALID` decision.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatepass_core::store::{EntryLogError, StoreError};
use gatepass_indexer::IndexerError;
use serde::Serialize;
use std::fmt;

/// Application error returned by handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message, "CONFLICT")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message,
            "SERVICE_UNAVAILABLE",
        )
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(what) => Self::new(StatusCode::NOT_FOUND, what, "NOT_FOUND"),
            StoreError::Conflict(what) => Self::conflict(what),
            StoreError::Corrupt(what) => Self::internal(what),
            StoreError::Backend(what) => Self::unavailable(what),
        }
    }
}

impl From<EntryLogError> for AppError {
    fn from(error: EntryLogError) -> Self {
        match error {
            EntryLogError::Corrupt(what) => Self::internal(what),
            other => Self::unavailable(other.to_string()),
        }
    }
}

impl From<IndexerError> for AppError {
    fn from(error: IndexerError) -> Self {
        match error {
            IndexerError::InvalidRange { .. } => Self::bad_request(error.to_string()),
            IndexerError::AlreadyRunning => Self::conflict(error.to_string()),
            IndexerError::Store(inner) => inner.into(),
            IndexerError::Ledger(_) => Self::unavailable(error.to_string()),
            IndexerError::Task(_) => Self::internal(error.to_string()),
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatepass_core::TicketId;

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(
            AppError::from(StoreError::Backend("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(StoreError::NotFound("purchase".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(EntryLogError::DuplicateSuccess(TicketId::new(1))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn inverted_rescan_range_is_a_client_error() {
        let error = AppError::from(IndexerError::InvalidRange { from: 9, to: 3 });
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.to_string(), "[BAD_REQUEST] Invalid block range: 9 > 3");
    }
}
