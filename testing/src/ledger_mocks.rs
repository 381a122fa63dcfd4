//! In-memory ledger for indexer tests.
//!
//! Events are stored decoded and re-encoded through [`gatepass_core::abi`] on
//! every query, so the indexer under test goes through the same decoding path
//! as in production. Faults can be scripted:
//! - [`InMemoryLedger::set_available`]: every call fails as unreachable
//! - [`InMemoryLedger::fail_logs_for`]: log queries for one kind fail
//! - [`InMemoryLedger::push_raw_log`]: inject a malformed log
//! - [`InMemoryLedger::set_delay`]: slow every call (timeout tests)

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only

use gatepass_core::abi;
use gatepass_core::ledger::{BoxFuture, Ledger, LedgerError, RawLog};
use gatepass_core::{BlockNumber, BlockRange, EventKind, LedgerTicket, LifecycleEvent, TicketId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Default)]
struct LedgerState {
    events: Vec<LifecycleEvent>,
    raw_logs: Vec<(EventKind, RawLog)>,
    tickets: HashMap<TicketId, LedgerTicket>,
    failing_kind: Option<EventKind>,
    delay: Option<Duration>,
    queries: Vec<(EventKind, BlockRange)>,
}

/// Scripted ledger for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use gatepass_testing::{InMemoryLedger, fixtures};
/// use gatepass_core::ledger::Ledger;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = InMemoryLedger::new();
/// ledger.push_event(fixtures::purchased(9, fixtures::tx(0xabc), 1, 120, 0));
/// assert_eq!(ledger.head_block().await?, 120);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
    head: Arc<AtomicU64>,
    available: Arc<AtomicBool>,
}

impl InMemoryLedger {
    /// Create an empty ledger at block 0
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            head: Arc::new(AtomicU64::new(0)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Record an event; raises the head to the event's block if needed.
    pub fn push_event(&self, event: LifecycleEvent) {
        self.head.fetch_max(event.block_number, Ordering::SeqCst);
        self.state.write().unwrap().events.push(event);
    }

    /// Inject an arbitrary (possibly malformed) log returned for `kind`.
    pub fn push_raw_log(&self, kind: EventKind, log: RawLog) {
        self.head.fetch_max(log.block_number, Ordering::SeqCst);
        self.state.write().unwrap().raw_logs.push((kind, log));
    }

    /// Set the chain head
    pub fn set_head(&self, block: BlockNumber) {
        self.head.store(block, Ordering::SeqCst);
    }

    /// Register a ticket for point queries
    pub fn set_ticket(&self, ticket: LedgerTicket) {
        self.state
            .write()
            .unwrap()
            .tickets
            .insert(ticket.ticket_id, ticket);
    }

    /// Simulate the endpoint going down (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make log queries for `kind` fail (or stop failing with `None`)
    pub fn fail_logs_for(&self, kind: Option<EventKind>) {
        self.state.write().unwrap().failing_kind = kind;
    }

    /// Delay every call by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    /// Every `(kind, range)` log query served so far
    #[must_use]
    pub fn queries(&self) -> Vec<(EventKind, BlockRange)> {
        self.state.read().unwrap().queries.clone()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("connection refused".to_string()))
        }
    }

    async fn maybe_delay(&self) {
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for InMemoryLedger {
    fn endpoint(&self) -> &str {
        "memory://ledger"
    }

    fn head_block(&self) -> BoxFuture<'_, Result<BlockNumber, LedgerError>> {
        Box::pin(async move {
            self.maybe_delay().await;
            self.check_available()?;
            Ok(self.head.load(Ordering::SeqCst))
        })
    }

    fn logs(
        &self,
        kind: EventKind,
        range: BlockRange,
    ) -> BoxFuture<'_, Result<Vec<RawLog>, LedgerError>> {
        Box::pin(async move {
            self.maybe_delay().await;
            self.check_available()?;

            let mut state = self.state.write().unwrap();
            if state.failing_kind == Some(kind) {
                return Err(LedgerError::Unavailable(format!(
                    "log query for {kind} failed"
                )));
            }
            state.queries.push((kind, range));

            let mut logs: Vec<RawLog> = state
                .events
                .iter()
                .filter(|e| e.kind == kind && range.contains(e.block_number))
                .map(abi::encode_log)
                .chain(
                    state
                        .raw_logs
                        .iter()
                        .filter(|(k, log)| *k == kind && range.contains(log.block_number))
                        .map(|(_, log)| log.clone()),
                )
                .collect();
            logs.sort_by_key(|log| (log.block_number, log.log_index));
            Ok(logs)
        })
    }

    fn ticket(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Option<LedgerTicket>, LedgerError>> {
        Box::pin(async move {
            self.maybe_delay().await;
            self.check_available()?;
            Ok(self.state.read().unwrap().tickets.get(&ticket_id).cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn serves_logs_in_range_only() {
        let ledger = InMemoryLedger::new();
        ledger.push_event(fixtures::purchased(1, fixtures::tx(1), 1, 10, 0));
        ledger.push_event(fixtures::purchased(2, fixtures::tx(2), 1, 20, 0));

        let range = BlockRange::new(1, 15).unwrap();
        let logs = ledger.logs(EventKind::Purchased, range).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 10);
        assert_eq!(ledger.head_block().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let ledger = InMemoryLedger::new();
        ledger.set_available(false);
        assert!(matches!(
            ledger.head_block().await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
