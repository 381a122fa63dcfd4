//! Matching ledger events to off-chain purchase records.
//!
//! Purchase records are written optimistically before the ledger confirms a
//! purchase, so the record's ticket id may be a guess. Correlation therefore
//! tries an ordered list of lookups and the first hit wins:
//!
//! | Event      | Strategies               |
//! |------------|--------------------------|
//! | Purchased  | `TxHash`, then `TicketId` |
//! | Downloaded | `TicketId`               |
//! | Refunded   | `TicketId`               |
//!
//! Downloads and refunds are emitted in their own transactions, so their hash
//! never matches the purchase record.

use gatepass_core::store::{PurchaseStore, StoreError};
use gatepass_core::{EventKind, LifecycleEvent, PurchaseRecord};

/// One way of finding the purchase record an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationStrategy {
    /// Same transaction hash as the event
    TxHash,
    /// Same ticket id as the event (newest record wins)
    TicketId,
}

/// A purchase record together with the strategy that found it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correlation {
    /// Matched record as stored
    pub record: PurchaseRecord,
    /// Strategy that matched
    pub strategy: CorrelationStrategy,
}

impl CorrelationStrategy {
    /// Ordered strategies for an event kind; empty for kinds that do not
    /// touch purchase records.
    #[must_use]
    pub const fn for_kind(kind: EventKind) -> &'static [Self] {
        match kind {
            EventKind::Purchased => &[Self::TxHash, Self::TicketId],
            EventKind::Downloaded | EventKind::Refunded => &[Self::TicketId],
            EventKind::Created => &[],
        }
    }

    async fn lookup(
        self,
        store: &dyn PurchaseStore,
        event: &LifecycleEvent,
    ) -> Result<Option<PurchaseRecord>, StoreError> {
        match self {
            Self::TxHash => store.find_by_tx_hash(&event.tx_hash).await,
            Self::TicketId => Ok(store
                .find_by_ticket_id(event.ticket_id)
                .await?
                .into_iter()
                .next()),
        }
    }
}

/// Run the event kind's strategies in order; `None` when nothing matches.
///
/// # Errors
///
/// Returns [`StoreError`] if a lookup fails.
pub async fn correlate(
    store: &dyn PurchaseStore,
    event: &LifecycleEvent,
) -> Result<Option<Correlation>, StoreError> {
    for &strategy in CorrelationStrategy::for_kind(event.kind) {
        if let Some(record) = strategy.lookup(store, event).await? {
            return Ok(Some(Correlation { record, strategy }));
        }
    }
    Ok(None)
}
