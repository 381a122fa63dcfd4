//! Scan requests and QR credential parsing.

use chrono::{DateTime, Utc};
use gatepass_core::{Address, TicketId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A credential that could not be turned into a [`ScanRequest`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unreadable credential: {reason}")]
pub struct CredentialError {
    /// Ticket id, when it could be read before the failure
    pub ticket_id: Option<TicketId>,
    /// What was wrong
    pub reason: String,
}

/// One scan attempt at a gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Ticket on the credential
    pub ticket_id: TicketId,
    /// Holder wallet on the credential
    pub holder: Address,
    /// Event on the credential
    pub event_name: String,
    /// Credential issue time, unix seconds; absent on legacy credentials
    pub credential_timestamp: Option<i64>,
    /// HMAC over ticket, holder and timestamp
    pub freshness_token: Option<String>,
    /// Scanning gatekeeper
    pub gatekeeper: Address,
    /// Gate or door
    pub location: Option<String>,
}

impl ScanRequest {
    /// Request without timestamp, token or location.
    #[must_use]
    pub fn new(
        ticket_id: TicketId,
        holder: Address,
        event_name: impl Into<String>,
        gatekeeper: Address,
    ) -> Self {
        Self {
            ticket_id,
            holder,
            event_name: event_name.into(),
            credential_timestamp: None,
            freshness_token: None,
            gatekeeper,
            location: None,
        }
    }

    /// Attach the credential issue time (unix seconds)
    #[must_use]
    pub const fn with_timestamp(mut self, unix_secs: i64) -> Self {
        self.credential_timestamp = Some(unix_secs);
        self
    }

    /// Attach a freshness token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.freshness_token = Some(token.into());
        self
    }

    /// Attach the gate location
    #[must_use]
    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Credential issue time, if present and representable.
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.credential_timestamp
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    /// Parse the JSON encoded in a ticket QR code.
    ///
    /// Expected shape:
    ///
    /// ```json
    /// {"ticketId": 42, "owner": "0x…", "eventName": "Concert",
    ///  "timestamp": 1735689600, "token": "…"}
    /// ```
    ///
    /// `ticketId` may be a number or a decimal string; `timestamp` and
    /// `token` are optional.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the payload is not JSON or a required
    /// field is missing or malformed. The error keeps the ticket id when it
    /// was readable so the attempt can still be logged.
    pub fn from_qr_payload(
        payload: &str,
        gatekeeper: Address,
        location: Option<String>,
    ) -> Result<Self, CredentialError> {
        let value: Value = serde_json::from_str(payload).map_err(|e| CredentialError {
            ticket_id: None,
            reason: format!("payload is not JSON: {e}"),
        })?;

        let ticket_id = value.get("ticketId").and_then(ticket_id_from);
        let fail = move |reason: &str| CredentialError {
            ticket_id,
            reason: reason.to_string(),
        };

        let ticket_id = ticket_id.ok_or_else(|| fail("missing or invalid ticketId"))?;
        let holder = value
            .get("owner")
            .and_then(Value::as_str)
            .ok_or_else(|| fail("missing owner"))?;
        let holder = Address::parse(holder).map_err(|e| fail(&format!("invalid owner: {e}")))?;
        let event_name = value
            .get("eventName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| fail("missing eventName"))?;
        let credential_timestamp = match value.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(timestamp_from(raw).ok_or_else(|| fail("invalid timestamp"))?),
        };
        let freshness_token = value
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Ok(Self {
            ticket_id,
            holder,
            event_name: event_name.to_string(),
            credential_timestamp,
            freshness_token,
            gatekeeper,
            location,
        })
    }
}

fn ticket_id_from(value: &Value) -> Option<TicketId> {
    match value {
        Value::Number(n) => n.as_u64().map(TicketId::new),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
