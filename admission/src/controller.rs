//! The admission controller.

use crate::decision::{AdmissionResponse, Decision};
use crate::gatekeepers::GatekeeperDirectory;
use crate::metrics;
use crate::policy::{AdmissionPolicy, Freshness};
use crate::request::ScanRequest;
use chrono::{DateTime, Utc};
use gatepass_core::environment::Clock;
use gatepass_core::store::{EntryLog, EntryLogError, PurchaseStore};
use gatepass_core::{Address, EntryId, EntryLogRecord, ScanResult, TicketId};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Decides whether a scanned ticket may enter and records every attempt.
///
/// Decisions are a function of the entry log for the ticket, the purchase
/// record, the credential and server time. The ledger is never consulted.
///
/// Checks run in order and the first failure decides:
///
/// 1. gatekeeper authorized for the event, else `INVALID`
/// 2. freshness token authentic, else `INVALID`
/// 3. credential not stale (`EXPIRED`) and not from the future (`INVALID`)
/// 4. holder owns an admissible purchase of the ticket, else `INVALID`
/// 5. prior `SUCCESS`: none is `ADMIT`; within the duplicate window is
///    `DUPLICATE`; otherwise `ALREADY_USED`
///
/// Steps 1 to 3 never read the entry log.
///
/// # Concurrency
///
/// The `SUCCESS` append is guarded by the store's one-success-per-ticket
/// constraint. A scan that loses the race re-reads the winner and is
/// reclassified as `DUPLICATE` or `ALREADY_USED`.
///
/// # Example
///
/// ```ignore
/// let controller = AdmissionController::new(store, gatekeepers, clock, AdmissionPolicy::default());
/// let response = controller.admit(request).await;
/// if response.is_admitted() {
///     open_gate();
/// }
/// ```
pub struct AdmissionController {
    entry_log: Arc<dyn EntryLog>,
    purchases: Arc<dyn PurchaseStore>,
    gatekeepers: Arc<dyn GatekeeperDirectory>,
    clock: Arc<dyn Clock>,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    /// Create a controller over `store`.
    #[must_use]
    pub fn new<S>(
        store: Arc<S>,
        gatekeepers: Arc<dyn GatekeeperDirectory>,
        clock: Arc<dyn Clock>,
        policy: AdmissionPolicy,
    ) -> Self
    where
        S: EntryLog + PurchaseStore + 'static,
    {
        let entry_log: Arc<dyn EntryLog> = store.clone();
        let purchases: Arc<dyn PurchaseStore> = store;
        Self {
            entry_log,
            purchases,
            gatekeepers,
            clock,
            policy,
        }
    }

    /// The active policy
    #[must_use]
    pub const fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Decide one scan attempt.
    ///
    /// Never fails: store trouble and timeouts come back as a retryable
    /// `INVALID`.
    #[instrument(
        skip(self, request),
        fields(ticket_id = %request.ticket_id, gatekeeper = %request.gatekeeper)
    )]
    pub async fn admit(&self, request: ScanRequest) -> AdmissionResponse {
        let response =
            match tokio::time::timeout(self.policy.decision_timeout, self.decide(&request)).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(timeout = ?self.policy.decision_timeout, "Admission decision timed out");
                    AdmissionResponse::unavailable("Decision timed out, retry scan", self.clock.now())
                }
            };

        metrics::record_decision(response.decision);
        if response.retryable {
            metrics::record_retryable();
        }
        info!(
            decision = %response.decision,
            reason = %response.reason,
            retryable = response.retryable,
            "Scan decided"
        );
        response
    }

    /// Parse a QR payload and decide it.
    ///
    /// Unreadable payloads are `INVALID` without any lookup; the attempt is
    /// logged when the ticket id was readable.
    pub async fn admit_qr(
        &self,
        payload: &str,
        gatekeeper: Address,
        location: Option<String>,
    ) -> AdmissionResponse {
        let error = match ScanRequest::from_qr_payload(payload, gatekeeper.clone(), location.clone()) {
            Ok(request) => return self.admit(request).await,
            Err(error) => error,
        };

        warn!(gatekeeper = %gatekeeper, error = %error, "Unreadable credential scanned");
        let now = self.clock.now();
        let reason = error.to_string();
        let response = match error.ticket_id {
            Some(ticket_id) => {
                let record = EntryLogRecord {
                    entry_id: EntryId::new(),
                    ticket_id,
                    scan_time: now,
                    scan_result: ScanResult::Invalid,
                    gatekeeper,
                    location,
                    holder: None,
                    event_name: None,
                    reason: Some(reason.clone()),
                };
                self.log_rejection(record, AdmissionResponse::new(Decision::Invalid, reason, now))
                    .await
            }
            None => AdmissionResponse::new(Decision::Invalid, reason, now),
        };
        metrics::record_decision(response.decision);
        response
    }

    /// Every attempt for a ticket, in scan order.
    ///
    /// # Errors
    ///
    /// Returns [`EntryLogError`] if the entry log cannot be read.
    pub async fn entries_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<EntryLogRecord>, EntryLogError> {
        self.entry_log.entries_for_ticket(ticket_id).await
    }

    /// Admitted entries for an event, in admission order.
    ///
    /// # Errors
    ///
    /// Returns [`EntryLogError`] if the entry log cannot be read.
    pub async fn guest_list(&self, event_name: &str) -> Result<Vec<EntryLogRecord>, EntryLogError> {
        self.entry_log.successes_for_event(event_name).await
    }

    async fn decide(&self, request: &ScanRequest) -> AdmissionResponse {
        let now = self.clock.now();

        if let Some((decision, reason)) = self.check_credential(request, now) {
            return self.reject(request, now, decision, reason, None).await;
        }
        match self.check_ownership(request).await {
            Ownership::Admissible => {}
            Ownership::Rejected(reason) => {
                return self.reject(request, now, Decision::Invalid, reason, None).await;
            }
            Ownership::Unknown(reason) => return AdmissionResponse::unavailable(reason, now),
        }

        let prior = match self.entry_log.prior_success(request.ticket_id).await {
            Ok(prior) => prior,
            Err(error) => return unavailable(&error, now),
        };
        if let Some(prior) = prior {
            return self.reject_rescan(request, now, prior).await;
        }

        let success = entry(request, now, ScanResult::Success, None);
        let entry_id = success.entry_id;
        match self.entry_log.append(success).await {
            Ok(()) => {
                debug!(entry_id = %entry_id, "Entry granted");
                AdmissionResponse::new(Decision::Admit, "Entry granted", now)
            }
            Err(EntryLogError::DuplicateSuccess(_)) => {
                debug!("Lost admission race, reclassifying");
                match self.entry_log.prior_success(request.ticket_id).await {
                    Ok(Some(winner)) => self.reject_rescan(request, now, winner).await,
                    Ok(None) => AdmissionResponse::unavailable(
                        "Concurrent admission not visible yet, retry scan",
                        now,
                    ),
                    Err(error) => unavailable(&error, now),
                }
            }
            Err(error) => unavailable(&error, now),
        }
    }

    /// Gatekeeper, token and timestamp checks; no store access.
    fn check_credential(
        &self,
        request: &ScanRequest,
        now: DateTime<Utc>,
    ) -> Option<(Decision, String)> {
        if !self
            .gatekeepers
            .is_authorized(&request.gatekeeper, &request.event_name)
        {
            return Some((
                Decision::Invalid,
                format!("Gatekeeper not authorized for {}", request.event_name),
            ));
        }

        if let Some(key) = &self.policy.token_key {
            match (&request.freshness_token, request.credential_timestamp) {
                (Some(token), Some(timestamp)) => {
                    if !key.verify(request.ticket_id, &request.holder, timestamp, token) {
                        return Some((Decision::Invalid, "Freshness token mismatch".to_string()));
                    }
                }
                (Some(_), None) => {
                    return Some((
                        Decision::Invalid,
                        "Freshness token without timestamp".to_string(),
                    ));
                }
                (None, _) if self.policy.require_token => {
                    return Some((Decision::Invalid, "Freshness token required".to_string()));
                }
                (None, _) => {}
            }
        }

        if let Some(timestamp) = request.credential_timestamp {
            let Some(issued) = request.issued_at() else {
                return Some((
                    Decision::Invalid,
                    format!("Credential timestamp out of range: {timestamp}"),
                ));
            };
            match self.policy.freshness(now, issued) {
                Freshness::Fresh => {}
                Freshness::Stale { age } => {
                    return Some((
                        Decision::Expired,
                        format!(
                            "Credential is {}s old (limit {}s)",
                            age.num_seconds(),
                            self.policy.freshness_window.as_secs()
                        ),
                    ));
                }
                Freshness::Ahead { ahead } => {
                    return Some((
                        Decision::Invalid,
                        format!("Credential timestamp {}s in the future", ahead.num_seconds()),
                    ));
                }
            }
        }

        None
    }

    async fn check_ownership(&self, request: &ScanRequest) -> Ownership {
        let records = match self.purchases.find_by_ticket_id(request.ticket_id).await {
            Ok(records) => records,
            Err(error) => {
                warn!(error = %error, "Purchase lookup failed");
                return Ownership::Unknown(format!("Purchase store unavailable, retry scan: {error}"));
            }
        };

        if records.is_empty() {
            return Ownership::Rejected(format!("Unknown ticket {}", request.ticket_id));
        }
        let Some(record) = records.iter().find(|r| r.buyer == request.holder) else {
            return Ownership::Rejected("Holder does not own this ticket".to_string());
        };
        if record.event_name != request.event_name {
            return Ownership::Rejected(format!("Ticket is for {}", record.event_name));
        }
        if !record.status.is_admissible() {
            return Ownership::Rejected(format!("Ticket is {}", record.status));
        }
        Ownership::Admissible
    }

    async fn reject_rescan(
        &self,
        request: &ScanRequest,
        now: DateTime<Utc>,
        prior: EntryLogRecord,
    ) -> AdmissionResponse {
        // The winning scan may have been stamped after `now` was read; the
        // rejection is logged no earlier than the entry it conflicts with.
        let now = now.max(self.clock.now()).max(prior.scan_time);
        let decision = self.policy.classify_rescan(now, prior.scan_time);
        let reason = match decision {
            Decision::Duplicate => format!(
                "Scanned {}s ago",
                (now - prior.scan_time).num_seconds().max(0)
            ),
            _ => format!("Ticket already used at {}", prior.scan_time.to_rfc3339()),
        };
        self.reject(request, now, decision, reason, Some(prior)).await
    }

    async fn reject(
        &self,
        request: &ScanRequest,
        now: DateTime<Utc>,
        decision: Decision,
        reason: String,
        conflict: Option<EntryLogRecord>,
    ) -> AdmissionResponse {
        let record = entry(request, now, decision.scan_result(), Some(reason.clone()));
        let mut response = AdmissionResponse::new(decision, reason, now);
        if let Some(conflict) = conflict {
            response = response.with_conflict(conflict);
        }
        self.log_rejection(record, response).await
    }

    /// Append a rejection row; the decision only stands once it is recorded.
    async fn log_rejection(
        &self,
        record: EntryLogRecord,
        response: AdmissionResponse,
    ) -> AdmissionResponse {
        match self.entry_log.append(record).await {
            Ok(()) => response,
            Err(error) => unavailable(&error, response.scan_time),
        }
    }
}

enum Ownership {
    Admissible,
    Rejected(String),
    Unknown(String),
}

fn unavailable(error: &EntryLogError, now: DateTime<Utc>) -> AdmissionResponse {
    warn!(error = %error, "Entry log unavailable");
    AdmissionResponse::unavailable(format!("Entry log unavailable, retry scan: {error}"), now)
}

fn entry(
    request: &ScanRequest,
    now: DateTime<Utc>,
    result: ScanResult,
    reason: Option<String>,
) -> EntryLogRecord {
    EntryLogRecord {
        entry_id: EntryId::new(),
        ticket_id: request.ticket_id,
        scan_time: now,
        scan_result: result,
        gatekeeper: request.gatekeeper.clone(),
        location: request.location.clone(),
        holder: Some(request.holder.clone()),
        event_name: Some(request.event_name.clone()),
        reason,
    }
}
