//! Admission decisions and responses.

use chrono::{DateTime, Utc};
use gatepass_core::{EntryLogRecord, ScanResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict for one scan attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Let the holder in
    Admit,
    /// Benign re-scan shortly after admission
    Duplicate,
    /// Ticket was already used
    AlreadyUsed,
    /// Credential too old
    Expired,
    /// Credential, holder or gatekeeper not acceptable
    Invalid,
}

impl Decision {
    /// Entry log result recorded for this decision
    #[must_use]
    pub const fn scan_result(&self) -> ScanResult {
        match self {
            Self::Admit => ScanResult::Success,
            Self::Duplicate => ScanResult::Duplicate,
            Self::AlreadyUsed => ScanResult::AlreadyUsed,
            Self::Expired => ScanResult::Expired,
            Self::Invalid => ScanResult::Invalid,
        }
    }

    /// Label for logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admit => "ADMIT",
            Self::Duplicate => "DUPLICATE",
            Self::AlreadyUsed => "ALREADY_USED",
            Self::Expired => "EXPIRED",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gatekeeper's device is told.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// The verdict
    pub decision: Decision,
    /// Human-readable explanation
    pub reason: String,
    /// Whether the same scan may succeed if retried (store trouble)
    pub retryable: bool,
    /// Server time of this attempt
    pub scan_time: DateTime<Utc>,
    /// The earlier `SUCCESS` entry behind a duplicate or already-used verdict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_record: Option<EntryLogRecord>,
}

impl AdmissionResponse {
    pub(crate) fn new(decision: Decision, reason: impl Into<String>, scan_time: DateTime<Utc>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            retryable: false,
            scan_time,
            conflicting_record: None,
        }
    }

    /// INVALID because the decision could not be completed; the scan may be
    /// retried.
    pub(crate) fn unavailable(reason: impl Into<String>, scan_time: DateTime<Utc>) -> Self {
        Self {
            retryable: true,
            ..Self::new(Decision::Invalid, reason, scan_time)
        }
    }

    pub(crate) fn with_conflict(mut self, record: EntryLogRecord) -> Self {
        self.conflicting_record = Some(record);
        self
    }

    /// Whether the holder may enter
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        self.decision == Decision::Admit
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn decisions_map_to_log_results() {
        assert_eq!(Decision::Admit.scan_result(), ScanResult::Success);
        assert_eq!(Decision::AlreadyUsed.scan_result(), ScanResult::AlreadyUsed);
        assert_eq!(Decision::Expired.scan_result(), ScanResult::Expired);
    }

    #[test]
    fn response_serializes_camel_case() {
        let now = Utc::now();
        let response = AdmissionResponse::unavailable("Entry log unreachable", now);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["decision"], "INVALID");
        assert_eq!(json["retryable"], true);
        assert!(json.get("conflictingRecord").is_none());
    }
}
