//! Off-chain store traits.
//!
//! The store is a materialized view of ledger state plus store-only metadata.
//! It is split by record family so each consumer depends only on what it
//! touches:
//!
//! - [`PurchaseStore`]: purchase records, written by the purchase-submission
//!   path and corrected by the indexer
//! - [`EventRecordStore`]: listing metadata, confirmed by the indexer
//! - [`EntryLog`]: append-only scan audit trail, written by the admission
//!   controller
//! - [`CursorStore`]: the indexer's persisted progress
//!
//! # Implementations
//!
//! - `PostgresStore` (in `gatepass-postgres`): production
//! - `InMemoryStore` (in `gatepass-testing`): fast, deterministic testing
//!
//! # Conflicts
//!
//! Uniqueness violations are expected concurrency signals, not failures:
//! [`StoreError::Conflict`] for a second purchase with the same transaction
//! hash, [`EntryLogError::DuplicateSuccess`] for a second `SUCCESS` row on one
//! ticket. Callers re-read and reclassify.

use crate::ledger::BoxFuture;
use crate::types::{
    Address, BlockNumber, EntryLogRecord, EventRecord, IndexerCursor, PurchaseId,
    PurchaseRecord, PurchaseStatus, TicketId, TxHash,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from purchase, event-record and cursor storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record to update does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored data could not be mapped back into domain types.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Backend failure (connection, query).
    #[error("Storage error: {0}")]
    Backend(String),
}

/// Errors from the entry log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryLogError {
    /// A `SUCCESS` row already exists for this ticket.
    #[error("Ticket {0} already has a SUCCESS entry")]
    DuplicateSuccess(TicketId),

    /// Stored data could not be mapped back into domain types.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// Backend failure (connection, query).
    #[error("Entry log error: {0}")]
    Backend(String),
}

/// Purchase record storage.
pub trait PurchaseStore: Send + Sync {
    /// Insert a new purchase record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a record with the same transaction
    /// hash exists.
    fn insert(&self, record: PurchaseRecord) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Look up the record for a transaction hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn find_by_tx_hash(
        &self,
        tx_hash: &TxHash,
    ) -> BoxFuture<'_, Result<Option<PurchaseRecord>, StoreError>>;

    /// All records currently carrying `ticket_id`, newest first.
    ///
    /// More than one record can carry a ticket id while an optimistic write is
    /// still unreconciled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn find_by_ticket_id(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Vec<PurchaseRecord>, StoreError>>;

    /// All records bought by `buyer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn list_by_buyer(
        &self,
        buyer: &Address,
    ) -> BoxFuture<'_, Result<Vec<PurchaseRecord>, StoreError>>;

    /// Overwrite the ticket id of a record (self-healing correction).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    fn update_ticket_id(
        &self,
        purchase_id: PurchaseId,
        ticket_id: TicketId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Move a record from status `from` to status `to`.
    ///
    /// Compare-and-set: returns `false` without writing when the stored
    /// status is no longer `from`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    fn update_status(
        &self,
        purchase_id: PurchaseId,
        from: PurchaseStatus,
        to: PurchaseStatus,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, StoreError>>;
}

/// Listing metadata storage.
pub trait EventRecordStore: Send + Sync {
    /// Insert or replace a listing (listing CRUD lives outside GatePass).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn upsert(&self, record: EventRecord) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Listing for a ticket id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn find(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<EventRecord>, StoreError>>;

    /// Mark a listing as confirmed by the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the listing does not exist.
    fn confirm(
        &self,
        ticket_id: TicketId,
        organizer: Address,
        price: Option<u128>,
        block: BlockNumber,
    ) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Append-only audit trail of scan attempts.
pub trait EntryLog: Send + Sync {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns [`EntryLogError::DuplicateSuccess`] when appending a `SUCCESS`
    /// row for a ticket that already has one.
    fn append(&self, record: EntryLogRecord) -> BoxFuture<'_, Result<(), EntryLogError>>;

    /// The `SUCCESS` row for a ticket, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EntryLogError`] on backend failure.
    fn prior_success(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Option<EntryLogRecord>, EntryLogError>>;

    /// Every attempt for a ticket, ordered by scan time.
    ///
    /// # Errors
    ///
    /// Returns [`EntryLogError`] on backend failure.
    fn entries_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Vec<EntryLogRecord>, EntryLogError>>;

    /// `SUCCESS` rows for an event, ordered by scan time (the guest list).
    ///
    /// # Errors
    ///
    /// Returns [`EntryLogError`] on backend failure.
    fn successes_for_event(
        &self,
        event_name: &str,
    ) -> BoxFuture<'_, Result<Vec<EntryLogRecord>, EntryLogError>>;
}

/// Persisted indexer progress.
///
/// Implementations never move the stored block backwards.
pub trait CursorStore: Send + Sync {
    /// Load the cursor, `None` on first start.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn load(&self) -> BoxFuture<'_, Result<Option<IndexerCursor>, StoreError>>;

    /// Persist the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn save(&self, cursor: IndexerCursor) -> BoxFuture<'_, Result<(), StoreError>>;
}
