//! In-memory store for indexer and admission tests.
//!
//! Implements every store trait from `gatepass_core::store` behind a single
//! mutex, which makes check-then-append atomic and so reproduces the storage
//! uniqueness guards (one purchase per transaction hash, one `SUCCESS` entry
//! per ticket) that the Postgres store enforces with indexes.
//!
//! Fault injection:
//! - [`InMemoryStore::set_entry_log_down`]: every entry-log call fails
//! - [`InMemoryStore::fail_purchase_writes_for`]: purchase writes for one ticket fail
//! - [`InMemoryStore::delay_status_writes_to`]: status writes to one status are slowed
//! - [`InMemoryStore::hold_next_ticket_lookup`]: park one purchase lookup until released

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only

use chrono::{DateTime, Utc};
use gatepass_core::ledger::BoxFuture;
use gatepass_core::store::{
    CursorStore, EntryLog, EntryLogError, EventRecordStore, PurchaseStore, StoreError,
};
use gatepass_core::{
    Address, BlockNumber, EntryLogRecord, EventRecord, IndexerCursor, PurchaseId,
    PurchaseRecord, PurchaseStatus, ScanResult, TicketId, TxHash,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct StoreState {
    purchases: HashMap<PurchaseId, PurchaseRecord>,
    listings: HashMap<TicketId, EventRecord>,
    entries: Vec<EntryLogRecord>,
    cursor: Option<IndexerCursor>,
    failing_ticket: Option<TicketId>,
    status_delay: Option<(PurchaseStatus, Duration)>,
    held_lookup: Option<LookupHold>,
}

/// Handle on a parked `find_by_ticket_id` call.
#[derive(Clone, Debug, Default)]
pub struct LookupHold {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl LookupHold {
    /// Wait until the held lookup has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held lookup continue
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory store for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use gatepass_testing::{InMemoryStore, fixtures, test_clock};
/// use gatepass_core::store::PurchaseStore;
/// use gatepass_core::environment::Clock;
/// use gatepass_core::{PurchaseRecord, TicketId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryStore::new();
/// let record = PurchaseRecord::new(
///     TicketId::new(6),
///     fixtures::tx(0xabc),
///     fixtures::address(1),
///     "Concert",
///     test_clock().now(),
/// );
/// store.insert(record).await?;
/// assert!(store.find_by_tx_hash(&fixtures::tx(0xabc)).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    entry_reads: Arc<AtomicUsize>,
    entry_log_down: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            entry_reads: Arc::new(AtomicUsize::new(0)),
            entry_log_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Snapshot of all purchase records, oldest first
    #[must_use]
    pub fn purchases(&self) -> Vec<PurchaseRecord> {
        let mut all: Vec<_> = self.state.lock().unwrap().purchases.values().cloned().collect();
        all.sort_by_key(|p| (p.created_at, *p.purchase_id.as_uuid()));
        all
    }

    /// Snapshot of the entry log in append order
    #[must_use]
    pub fn entries(&self) -> Vec<EntryLogRecord> {
        self.state.lock().unwrap().entries.clone()
    }

    /// Snapshot of a listing
    #[must_use]
    pub fn listing(&self, ticket_id: TicketId) -> Option<EventRecord> {
        self.state.lock().unwrap().listings.get(&ticket_id).cloned()
    }

    /// Currently persisted cursor
    #[must_use]
    pub fn cursor(&self) -> Option<IndexerCursor> {
        self.state.lock().unwrap().cursor
    }

    /// Number of entry-log read queries served so far
    #[must_use]
    pub fn entry_reads(&self) -> usize {
        self.entry_reads.load(Ordering::SeqCst)
    }

    /// Make every entry-log call fail with a backend error
    pub fn set_entry_log_down(&self, down: bool) {
        self.entry_log_down.store(down, Ordering::SeqCst);
    }

    /// Make purchase inserts and updates touching `ticket_id` fail with a
    /// backend error (`None` clears it)
    pub fn fail_purchase_writes_for(&self, ticket_id: Option<TicketId>) {
        self.state.lock().unwrap().failing_ticket = ticket_id;
    }

    /// Sleep for `delay` before every status write whose target is `status`
    pub fn delay_status_writes_to(&self, status: PurchaseStatus, delay: Duration) {
        self.state.lock().unwrap().status_delay = Some((status, delay));
    }

    /// Park the next `find_by_ticket_id` call until [`LookupHold::release`]
    #[must_use]
    pub fn hold_next_ticket_lookup(&self) -> LookupHold {
        let hold = LookupHold::default();
        self.state.lock().unwrap().held_lookup = Some(hold.clone());
        hold
    }

    fn entry_log_available(&self) -> Result<(), EntryLogError> {
        if self.entry_log_down.load(Ordering::SeqCst) {
            Err(EntryLogError::Backend("entry log unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl StoreState {
    fn purchase_writable(&self, ticket_id: TicketId) -> Result<(), StoreError> {
        if self.failing_ticket == Some(ticket_id) {
            Err(StoreError::Backend("purchase store unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(mut records: Vec<PurchaseRecord>) -> Vec<PurchaseRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}

impl PurchaseStore for InMemoryStore {
    fn insert(&self, record: PurchaseRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.purchase_writable(record.ticket_id)?;
            if state.purchases.values().any(|p| p.tx_hash == record.tx_hash) {
                return Err(StoreError::Conflict(format!(
                    "purchase for {} already exists",
                    record.tx_hash
                )));
            }
            state.purchases.insert(record.purchase_id, record);
            Ok(())
        })
    }

    fn find_by_tx_hash(
        &self,
        tx_hash: &TxHash,
    ) -> BoxFuture<'_, Result<Option<PurchaseRecord>, StoreError>> {
        let tx_hash = tx_hash.clone();
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .purchases
                .values()
                .find(|p| p.tx_hash == tx_hash)
                .cloned())
        })
    }

    fn find_by_ticket_id(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseRecord>, StoreError>> {
        Box::pin(async move {
            let held = self.state.lock().unwrap().held_lookup.take();
            if let Some(hold) = held {
                hold.entered.notify_one();
                hold.release.notified().await;
            }

            let matches = self
                .state
                .lock()
                .unwrap()
                .purchases
                .values()
                .filter(|p| p.ticket_id == ticket_id)
                .cloned()
                .collect();
            Ok(newest_first(matches))
        })
    }

    fn list_by_buyer(
        &self,
        buyer: &Address,
    ) -> BoxFuture<'_, Result<Vec<PurchaseRecord>, StoreError>> {
        let buyer = buyer.clone();
        Box::pin(async move {
            let matches = self
                .state
                .lock()
                .unwrap()
                .purchases
                .values()
                .filter(|p| p.buyer == buyer)
                .cloned()
                .collect();
            Ok(newest_first(matches))
        })
    }

    fn update_ticket_id(
        &self,
        purchase_id: PurchaseId,
        ticket_id: TicketId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let current = state
                .purchases
                .get(&purchase_id)
                .map(|p| p.ticket_id)
                .ok_or_else(|| StoreError::NotFound(format!("purchase {purchase_id}")))?;
            state.purchase_writable(current)?;
            state.purchase_writable(ticket_id)?;
            let Some(record) = state.purchases.get_mut(&purchase_id) else {
                return Err(StoreError::NotFound(format!("purchase {purchase_id}")));
            };
            record.ticket_id = ticket_id;
            record.updated_at = at;
            Ok(())
        })
    }

    fn update_status(
        &self,
        purchase_id: PurchaseId,
        from: PurchaseStatus,
        to: PurchaseStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let delay = self.state.lock().unwrap().status_delay;
            if let Some((_, delay)) = delay.filter(|(status, _)| *status == to) {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock().unwrap();
            let ticket_id = state
                .purchases
                .get(&purchase_id)
                .map(|p| p.ticket_id)
                .ok_or_else(|| StoreError::NotFound(format!("purchase {purchase_id}")))?;
            state.purchase_writable(ticket_id)?;
            let Some(record) = state.purchases.get_mut(&purchase_id) else {
                return Err(StoreError::NotFound(format!("purchase {purchase_id}")));
            };
            if record.status != from {
                return Ok(false);
            }
            record.status = to;
            record.updated_at = at;
            Ok(true)
        })
    }
}

impl EventRecordStore for InMemoryStore {
    fn upsert(&self, record: EventRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .listings
                .insert(record.ticket_id, record);
            Ok(())
        })
    }

    fn find(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<EventRecord>, StoreError>> {
        Box::pin(async move { Ok(self.listing(ticket_id)) })
    }

    fn confirm(
        &self,
        ticket_id: TicketId,
        organizer: Address,
        price: Option<u128>,
        block: BlockNumber,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let listing = state
                .listings
                .get_mut(&ticket_id)
                .ok_or_else(|| StoreError::NotFound(format!("listing {ticket_id}")))?;
            listing.organizer = Some(organizer);
            listing.price = price;
            listing.confirmed_block = Some(block);
            Ok(())
        })
    }
}

impl EntryLog for InMemoryStore {
    fn append(&self, record: EntryLogRecord) -> BoxFuture<'_, Result<(), EntryLogError>> {
        Box::pin(async move {
            self.entry_log_available()?;
            let mut state = self.state.lock().unwrap();
            if record.scan_result == ScanResult::Success
                && state
                    .entries
                    .iter()
                    .any(|e| e.ticket_id == record.ticket_id && e.is_success())
            {
                return Err(EntryLogError::DuplicateSuccess(record.ticket_id));
            }
            state.entries.push(record);
            Ok(())
        })
    }

    fn prior_success(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Option<EntryLogRecord>, EntryLogError>> {
        Box::pin(async move {
            self.entry_log_available()?;
            self.entry_reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .state
                .lock()
                .unwrap()
                .entries
                .iter()
                .filter(|e| e.ticket_id == ticket_id && e.is_success())
                .max_by_key(|e| e.scan_time)
                .cloned())
        })
    }

    fn entries_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Vec<EntryLogRecord>, EntryLogError>> {
        Box::pin(async move {
            self.entry_log_available()?;
            self.entry_reads.fetch_add(1, Ordering::SeqCst);
            let mut entries: Vec<_> = self
                .state
                .lock()
                .unwrap()
                .entries
                .iter()
                .filter(|e| e.ticket_id == ticket_id)
                .cloned()
                .collect();
            entries.sort_by_key(|e| e.scan_time);
            Ok(entries)
        })
    }

    fn successes_for_event(
        &self,
        event_name: &str,
    ) -> BoxFuture<'_, Result<Vec<EntryLogRecord>, EntryLogError>> {
        let event_name = event_name.to_string();
        Box::pin(async move {
            self.entry_log_available()?;
            self.entry_reads.fetch_add(1, Ordering::SeqCst);
            let mut entries: Vec<_> = self
                .state
                .lock()
                .unwrap()
                .entries
                .iter()
                .filter(|e| e.is_success() && e.event_name.as_deref() == Some(event_name.as_str()))
                .cloned()
                .collect();
            entries.sort_by_key(|e| e.scan_time);
            Ok(entries)
        })
    }
}

impl CursorStore for InMemoryStore {
    fn load(&self) -> BoxFuture<'_, Result<Option<IndexerCursor>, StoreError>> {
        Box::pin(async move { Ok(self.cursor()) })
    }

    fn save(&self, cursor: IndexerCursor) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let keep = state
                .cursor
                .is_some_and(|c| c.last_processed_block > cursor.last_processed_block);
            if !keep {
                state.cursor = Some(cursor);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixtures, test_clock};
    use gatepass_core::EntryId;
    use gatepass_core::environment::Clock;

    fn entry(ticket: u64, result: ScanResult, at: DateTime<Utc>) -> EntryLogRecord {
        EntryLogRecord {
            entry_id: EntryId::new(),
            ticket_id: TicketId::new(ticket),
            scan_time: at,
            scan_result: result,
            gatekeeper: fixtures::address(0xee),
            location: None,
            holder: None,
            event_name: Some("Concert".to_string()),
            reason: None,
        }
    }

    #[tokio::test]
    async fn rejects_second_purchase_for_same_tx_hash() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        let first = PurchaseRecord::new(TicketId::new(1), fixtures::tx(1), fixtures::address(1), "A", now);
        let second = PurchaseRecord::new(TicketId::new(2), fixtures::tx(1), fixtures::address(2), "A", now);
        store.insert(first).await.unwrap();
        assert!(matches!(store.insert(second).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.purchases().len(), 1);
    }

    #[tokio::test]
    async fn status_update_requires_the_expected_status() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        let record = PurchaseRecord::new(TicketId::new(1), fixtures::tx(1), fixtures::address(1), "A", now);
        store.insert(record.clone()).await.unwrap();

        let moved = store
            .update_status(record.purchase_id, PurchaseStatus::Purchased, PurchaseStatus::Refunded, now)
            .await
            .unwrap();
        let stale = store
            .update_status(record.purchase_id, PurchaseStatus::Purchased, PurchaseStatus::Downloaded, now)
            .await
            .unwrap();

        assert!(moved);
        assert!(!stale);
        assert_eq!(store.purchases()[0].status, PurchaseStatus::Refunded);
    }

    #[tokio::test]
    async fn purchase_writes_fail_for_the_chosen_ticket() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        store.fail_purchase_writes_for(Some(TicketId::new(2)));

        let ok = PurchaseRecord::new(TicketId::new(1), fixtures::tx(1), fixtures::address(1), "A", now);
        let blocked = PurchaseRecord::new(TicketId::new(2), fixtures::tx(2), fixtures::address(1), "A", now);
        store.insert(ok).await.unwrap();
        assert!(matches!(store.insert(blocked).await, Err(StoreError::Backend(_))));

        store.fail_purchase_writes_for(None);
        assert_eq!(store.purchases().len(), 1);
    }

    #[tokio::test]
    async fn guards_single_success_per_ticket() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        store.append(entry(42, ScanResult::Success, now)).await.unwrap();
        store.append(entry(42, ScanResult::Duplicate, now)).await.unwrap();
        assert_eq!(
            store.append(entry(42, ScanResult::Success, now)).await,
            Err(EntryLogError::DuplicateSuccess(TicketId::new(42)))
        );
        store.append(entry(43, ScanResult::Success, now)).await.unwrap();
        assert_eq!(store.entries().len(), 3);
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        store.save(IndexerCursor::new(200, now)).await.unwrap();
        store.save(IndexerCursor::new(150, now)).await.unwrap();
        assert_eq!(store.cursor().unwrap().last_processed_block, 200);
    }
}
