//! Row shapes and column conversions.

use chrono::{DateTime, Utc};
use gatepass_core::{
    Address, BlockNumber, EntryId, EntryLogRecord, EventRecord, PurchaseId, PurchaseRecord,
    TicketId, TxHash,
};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub(crate) struct PurchaseRow {
    purchase_id: Uuid,
    ticket_id: i64,
    tx_hash: String,
    buyer: String,
    buyer_email: Option<String>,
    event_name: String,
    price: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PurchaseRow {
    pub(crate) fn into_record(self) -> Result<PurchaseRecord, String> {
        Ok(PurchaseRecord {
            purchase_id: PurchaseId::from_uuid(self.purchase_id),
            ticket_id: TicketId::new(from_db(self.ticket_id, "ticket_id")?),
            tx_hash: TxHash::parse(&self.tx_hash).map_err(|e| e.to_string())?,
            buyer: Address::parse(&self.buyer).map_err(|e| e.to_string())?,
            buyer_email: self.buyer_email,
            event_name: self.event_name,
            price: self.price.as_deref().map(parse_price).transpose()?,
            status: self.status.parse().map_err(|e| format!("{e}"))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    ticket_id: i64,
    name: String,
    organizer: Option<String>,
    price: Option<String>,
    confirmed_block: Option<i64>,
}

impl EventRow {
    pub(crate) fn into_record(self) -> Result<EventRecord, String> {
        Ok(EventRecord {
            ticket_id: TicketId::new(from_db(self.ticket_id, "ticket_id")?),
            name: self.name,
            organizer: self
                .organizer
                .as_deref()
                .map(Address::parse)
                .transpose()
                .map_err(|e| e.to_string())?,
            price: self.price.as_deref().map(parse_price).transpose()?,
            confirmed_block: self
                .confirmed_block
                .map(|block| from_db(block, "confirmed_block"))
                .transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    entry_id: Uuid,
    ticket_id: i64,
    scan_time: DateTime<Utc>,
    scan_result: String,
    gatekeeper: String,
    location: Option<String>,
    holder: Option<String>,
    event_name: Option<String>,
    reason: Option<String>,
}

impl EntryRow {
    pub(crate) fn into_record(self) -> Result<EntryLogRecord, String> {
        Ok(EntryLogRecord {
            entry_id: EntryId::from_uuid(self.entry_id),
            ticket_id: TicketId::new(from_db(self.ticket_id, "ticket_id")?),
            scan_time: self.scan_time,
            scan_result: self.scan_result.parse().map_err(|e| format!("{e}"))?,
            gatekeeper: Address::parse(&self.gatekeeper).map_err(|e| e.to_string())?,
            location: self.location,
            holder: self
                .holder
                .as_deref()
                .map(Address::parse)
                .transpose()
                .map_err(|e| e.to_string())?,
            event_name: self.event_name,
            reason: self.reason,
        })
    }
}

pub(crate) const PURCHASE_COLUMNS: &str = "purchase_id, ticket_id, tx_hash, buyer, buyer_email, \
     event_name, price, status, created_at, updated_at";

pub(crate) const ENTRY_COLUMNS: &str =
    "entry_id, ticket_id, scan_time, scan_result, gatekeeper, location, holder, event_name, reason";

/// u64 ledger value as a BIGINT column.
pub(crate) fn to_db(value: u64, what: &str) -> Result<i64, String> {
    i64::try_from(value).map_err(|_| format!("{what} {value} exceeds BIGINT"))
}

/// BIGINT column back to a u64 ledger value.
pub(crate) fn from_db(value: i64, what: &str) -> Result<BlockNumber, String> {
    u64::try_from(value).map_err(|_| format!("negative {what}: {value}"))
}

fn parse_price(raw: &str) -> Result<u128, String> {
    raw.parse().map_err(|_| format!("invalid price: {raw}"))
}
