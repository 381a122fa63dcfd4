//! Per-kind event handlers.
//!
//! Every handler is idempotent: it looks the target up by natural key and
//! only writes when the store disagrees with the ledger. Replaying a range
//! therefore leaves the store unchanged.

use crate::correlation::{correlate, CorrelationStrategy};
use crate::metrics;
use gatepass_core::environment::Clock;
use gatepass_core::store::{EventRecordStore, PurchaseStore, StoreError};
use gatepass_core::{EventKind, LifecycleEvent, PurchaseRecord, PurchaseStatus};
use tracing::{debug, warn};

/// What applying one event did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The store changed
    Applied,
    /// The store already reflected the event
    Skipped,
    /// A purchase record's ticket id was overwritten with the ledger value
    Corrected,
    /// No off-chain record matched; nothing was written
    Unmatched,
}

impl Outcome {
    /// Label for logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Corrected => "corrected",
            Self::Unmatched => "unmatched",
        }
    }
}

pub(crate) struct Handlers<'a> {
    pub purchases: &'a dyn PurchaseStore,
    pub listings: &'a dyn EventRecordStore,
    pub clock: &'a dyn Clock,
}

impl Handlers<'_> {
    pub async fn apply(&self, event: &LifecycleEvent) -> Result<Outcome, StoreError> {
        match event.kind {
            EventKind::Created => self.on_created(event).await,
            EventKind::Purchased => self.on_purchased(event).await,
            EventKind::Downloaded => self.advance(event, PurchaseStatus::Downloaded).await,
            EventKind::Refunded => self.advance(event, PurchaseStatus::Refunded).await,
        }
    }

    async fn on_created(&self, event: &LifecycleEvent) -> Result<Outcome, StoreError> {
        match self.listings.find(event.ticket_id).await? {
            None => {
                warn!(
                    ticket_id = %event.ticket_id,
                    organizer = %event.party,
                    block = event.block_number,
                    "Ticket created on ledger without a listing record"
                );
                Ok(Outcome::Unmatched)
            }
            Some(listing) if listing.is_confirmed() => Ok(Outcome::Skipped),
            Some(_) => {
                self.listings
                    .confirm(event.ticket_id, event.party.clone(), event.amount, event.block_number)
                    .await?;
                debug!(ticket_id = %event.ticket_id, block = event.block_number, "Listing confirmed");
                Ok(Outcome::Applied)
            }
        }
    }

    async fn on_purchased(&self, event: &LifecycleEvent) -> Result<Outcome, StoreError> {
        let Some(found) = correlate(self.purchases, event).await? else {
            return Ok(unmatched(event));
        };
        let record = found.record;

        let corrected = found.strategy == CorrelationStrategy::TxHash
            && record.ticket_id != event.ticket_id;
        if corrected {
            warn!(
                purchase_id = %record.purchase_id,
                tx_hash = %event.tx_hash,
                stored_ticket_id = %record.ticket_id,
                ledger_ticket_id = %event.ticket_id,
                "Correcting purchase record ticket id from ledger"
            );
            self.purchases
                .update_ticket_id(record.purchase_id, event.ticket_id, self.clock.now())
                .await?;
            metrics::record_correction();
        }

        // Purchased is the lowest status, so there is nothing to raise here.
        Ok(if corrected { Outcome::Corrected } else { Outcome::Skipped })
    }

    async fn advance(
        &self,
        event: &LifecycleEvent,
        target: PurchaseStatus,
    ) -> Result<Outcome, StoreError> {
        let Some(found) = correlate(self.purchases, event).await? else {
            return Ok(unmatched(event));
        };
        self.transition(&found.record, target).await
    }

    /// Move `record` forward to `target`; older or equal statuses are left
    /// alone.
    ///
    /// The write only lands if the stored status still equals the one read.
    /// When another writer got there first the record is re-read and the
    /// check repeated; statuses only rise, so this ends.
    pub async fn transition(
        &self,
        record: &PurchaseRecord,
        target: PurchaseStatus,
    ) -> Result<Outcome, StoreError> {
        let mut current = record.clone();
        loop {
            if !current.status.can_advance_to(target) {
                return Ok(Outcome::Skipped);
            }
            let moved = self
                .purchases
                .update_status(current.purchase_id, current.status, target, self.clock.now())
                .await?;
            if moved {
                debug!(
                    purchase_id = %current.purchase_id,
                    ticket_id = %current.ticket_id,
                    from = %current.status,
                    to = %target,
                    "Purchase status advanced"
                );
                return Ok(Outcome::Applied);
            }
            match self.purchases.find_by_tx_hash(&current.tx_hash).await? {
                Some(latest) => current = latest,
                None => return Ok(Outcome::Skipped),
            }
        }
    }
}

fn unmatched(event: &LifecycleEvent) -> Outcome {
    warn!(
        kind = %event.kind,
        ticket_id = %event.ticket_id,
        tx_hash = %event.tx_hash,
        block = event.block_number,
        "No purchase record matches ledger event"
    );
    Outcome::Unmatched
}
