//! Domain types for GatePass.
//!
//! Value objects (identifiers, hashes, addresses), ledger lifecycle events, and
//! the three off-chain record families: purchase records, event records and
//! entry log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when parsing identifiers from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Value was empty after trimming.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// Value contained non-hex characters.
    #[error("{kind} is not hex encoded: {value}")]
    NotHex {
        /// What was being parsed
        kind: &'static str,
        /// The offending input
        value: String,
    },

    /// Value had the wrong number of hex digits.
    #[error("{kind} must have {expected} hex digits, got {actual}")]
    BadLength {
        /// What was being parsed
        kind: &'static str,
        /// Expected digit count
        expected: usize,
        /// Actual digit count
        actual: usize,
    },

    /// Value was not a valid number.
    #[error("Invalid number for {kind}: {value}")]
    NotANumber {
        /// What was being parsed
        kind: &'static str,
        /// The offending input
        value: String,
    },

    /// Unknown enum label.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// What was being parsed
        kind: &'static str,
        /// The offending input
        value: String,
    },
}

fn strip_hex_prefix(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

fn normalize_hex(raw: &str, kind: &'static str) -> Result<String, ParseError> {
    let trimmed = raw.trim();
    let digits = strip_hex_prefix(trimmed);
    if digits.is_empty() {
        return Err(ParseError::Empty(kind));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ParseError::NotHex {
            kind,
            value: trimmed.to_string(),
        });
    }
    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

// ============================================================================
// Identifiers
// ============================================================================

/// Ledger-assigned ticket number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(u64);

impl TicketId {
    /// Create a `TicketId` from its ledger number
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the ledger number
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseError::NotANumber {
                kind: "ticket id",
                value: s.to_string(),
            })
    }
}

/// Transaction hash, the canonical correlation key for purchases.
///
/// Always stored lowercase with a `0x` prefix so that hashes submitted by
/// clients and hashes reported by the ledger compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    /// Parse and case-normalize a transaction hash.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the value is empty or not hex.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        normalize_hex(raw, "transaction hash").map(Self)
    }

    /// Get the normalized hash string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TxHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TxHash {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TxHash> for String {
    fn from(value: TxHash) -> Self {
        value.0
    }
}

/// 20-byte account address (buyers, holders, organizers, gatekeepers).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Number of hex digits in an address
    pub const HEX_LEN: usize = 40;

    /// Parse and case-normalize an address.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the value is not 40 hex digits.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let normalized = normalize_hex(raw, "address")?;
        let digits = normalized.len() - 2;
        if digits != Self::HEX_LEN {
            return Err(ParseError::BadLength {
                kind: "address",
                expected: Self::HEX_LEN,
                actual: digits,
            });
        }
        Ok(Self(normalized))
    }

    /// Get the normalized address string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// Unique identifier for a purchase record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseId(Uuid);

impl PurchaseId {
    /// Creates a new random `PurchaseId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `PurchaseId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PurchaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an entry log row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random `EntryId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EntryId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Block positions
// ============================================================================

/// Ledger block height.
pub type BlockNumber = u64;

/// Inclusive range of blocks `[from, to]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    /// First block (inclusive)
    pub from: BlockNumber,
    /// Last block (inclusive)
    pub to: BlockNumber,
}

impl BlockRange {
    /// Create a range, or `None` when `from > to` (nothing to enumerate).
    #[must_use]
    pub const fn new(from: BlockNumber, to: BlockNumber) -> Option<Self> {
        if from > to { None } else { Some(Self { from, to }) }
    }

    /// Number of blocks covered.
    #[must_use]
    pub const fn len(&self) -> u64 {
        (self.to - self.from).saturating_add(1)
    }

    /// Ranges are never empty once constructed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Whether `block` falls inside the range.
    #[must_use]
    pub const fn contains(&self, block: BlockNumber) -> bool {
        block >= self.from && block <= self.to
    }

    /// Split into consecutive sub-ranges of at most `batch_size` blocks.
    ///
    /// A `batch_size` of zero is treated as one.
    ///
    /// # Example
    ///
    /// ```
    /// use gatepass_core::BlockRange;
    ///
    /// let range = BlockRange::new(101, 2600).unwrap_or(BlockRange { from: 0, to: 0 });
    /// let batches = range.batches(1000);
    /// assert_eq!(batches.len(), 3);
    /// assert_eq!(batches[2], BlockRange { from: 2101, to: 2600 });
    /// ```
    #[must_use]
    pub fn batches(&self, batch_size: u64) -> Vec<Self> {
        let size = batch_size.max(1);
        let mut out = Vec::new();
        let mut start = self.from;
        loop {
            let end = start.saturating_add(size - 1).min(self.to);
            out.push(Self { from: start, to: end });
            if end >= self.to {
                break;
            }
            start = end + 1;
        }
        out
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Position of a log in the ledger; orders events across a range.
///
/// Derived `Ord` compares `block_number` first, then `log_index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    /// Block containing the log
    pub block_number: BlockNumber,
    /// Index of the log within the block
    pub log_index: u64,
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// The indexer's persisted progress marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerCursor {
    /// Last block whose enumeration completed
    pub last_processed_block: BlockNumber,
    /// When the cursor was last advanced
    pub updated_at: DateTime<Utc>,
}

impl IndexerCursor {
    /// Create a cursor at `block`.
    #[must_use]
    pub const fn new(last_processed_block: BlockNumber, updated_at: DateTime<Utc>) -> Self {
        Self {
            last_processed_block,
            updated_at,
        }
    }
}

// ============================================================================
// Lifecycle events
// ============================================================================

/// Kinds of ticket lifecycle events emitted by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Organizer listed a ticket
    Created,
    /// Buyer purchased the ticket
    Purchased,
    /// Holder downloaded (activated) the ticket credential
    Downloaded,
    /// Purchase was refunded
    Refunded,
}

impl EventKind {
    /// Every kind the indexer fetches, in a stable order.
    pub const ALL: [Self; 4] = [
        Self::Created,
        Self::Purchased,
        Self::Downloaded,
        Self::Refunded,
    ];

    /// Short label for logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Purchased => "purchased",
            Self::Downloaded => "downloaded",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded, immutable ledger fact about a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// What happened
    pub kind: EventKind,
    /// Ledger-confirmed ticket number
    pub ticket_id: TicketId,
    /// Counterparty (organizer, buyer or holder depending on `kind`)
    pub party: Address,
    /// Price or refunded amount, when the event carries one
    pub amount: Option<u128>,
    /// Block containing the event
    pub block_number: BlockNumber,
    /// Log index within the block
    pub log_index: u64,
    /// Transaction that emitted the event
    pub tx_hash: TxHash,
    /// Block timestamp, when the ledger reports it
    pub timestamp: Option<DateTime<Utc>>,
}

impl LifecycleEvent {
    /// Ordering key within the ledger
    #[must_use]
    pub const fn position(&self) -> LogPosition {
        LogPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Ticket state as reported by the ledger's point query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerTicketState {
    /// Listed, not yet sold
    Available,
    /// Sold to a buyer
    Purchased,
    /// Credential downloaded by the holder
    Downloaded,
    /// Purchase refunded
    Refunded,
}

impl LedgerTicketState {
    /// Decode the contract's `uint8` state.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownVariant`] for unknown codes.
    pub fn from_code(code: u8) -> Result<Self, ParseError> {
        match code {
            0 => Ok(Self::Available),
            1 => Ok(Self::Purchased),
            2 => Ok(Self::Downloaded),
            3 => Ok(Self::Refunded),
            other => Err(ParseError::UnknownVariant {
                kind: "ticket state",
                value: other.to_string(),
            }),
        }
    }

    /// Contract code for this state
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Purchased => 1,
            Self::Downloaded => 2,
            Self::Refunded => 3,
        }
    }

    /// Purchase status implied by this ledger state, if the ticket is sold.
    #[must_use]
    pub const fn purchase_status(&self) -> Option<PurchaseStatus> {
        match self {
            Self::Available => None,
            Self::Purchased => Some(PurchaseStatus::Purchased),
            Self::Downloaded => Some(PurchaseStatus::Downloaded),
            Self::Refunded => Some(PurchaseStatus::Refunded),
        }
    }
}

/// Full lifecycle struct for one ticket, from the ledger point query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTicket {
    /// Ticket number
    pub ticket_id: TicketId,
    /// Current owner on the ledger
    pub owner: Address,
    /// Listing price
    pub price: u128,
    /// Lifecycle state
    pub state: LedgerTicketState,
}

// ============================================================================
// Purchase records
// ============================================================================

/// Status of an off-chain purchase record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Bought, credential not yet downloaded
    Purchased,
    /// Credential downloaded by the holder
    Downloaded,
    /// Refunded; no longer admissible
    Refunded,
    /// Event passed or listing withdrawn; no longer admissible
    Expired,
}

impl PurchaseStatus {
    /// Storage label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchased => "purchased",
            Self::Downloaded => "downloaded",
            Self::Refunded => "refunded",
            Self::Expired => "expired",
        }
    }

    /// Whether a record may move from `self` to `next`.
    ///
    /// Transitions only move forward so that replaying an older event never
    /// regresses a record. Staying in the same status is not a transition.
    #[must_use]
    pub const fn can_advance_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Purchased, Self::Downloaded | Self::Refunded | Self::Expired)
                | (Self::Downloaded, Self::Refunded | Self::Expired)
        )
    }

    /// Whether a ticket in this status may be admitted at the gate.
    #[must_use]
    pub const fn is_admissible(&self) -> bool {
        matches!(self, Self::Purchased | Self::Downloaded)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchased" => Ok(Self::Purchased),
            "downloaded" => Ok(Self::Downloaded),
            "refunded" => Ok(Self::Refunded),
            "expired" => Ok(Self::Expired),
            other => Err(ParseError::UnknownVariant {
                kind: "purchase status",
                value: other.to_string(),
            }),
        }
    }
}

/// Off-chain record of a ticket purchase.
///
/// Exactly one record exists per `tx_hash`. The `ticket_id` may be wrong
/// until the indexer reconciles it against the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Record identifier
    pub purchase_id: PurchaseId,
    /// Ticket number (authoritative only after reconciliation)
    pub ticket_id: TicketId,
    /// Purchase transaction hash (canonical correlation key)
    pub tx_hash: TxHash,
    /// Buyer wallet
    pub buyer: Address,
    /// Buyer contact, store-only metadata not available from the ledger
    pub buyer_email: Option<String>,
    /// Event the ticket admits to
    pub event_name: String,
    /// Price snapshot at purchase time
    pub price: Option<u128>,
    /// Lifecycle status
    pub status: PurchaseStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRecord {
    /// Create a freshly-submitted purchase in `Purchased` status.
    #[must_use]
    pub fn new(
        ticket_id: TicketId,
        tx_hash: TxHash,
        buyer: Address,
        event_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            purchase_id: PurchaseId::new(),
            ticket_id,
            tx_hash,
            buyer,
            buyer_email: None,
            event_name: event_name.into(),
            price: None,
            status: PurchaseStatus::Purchased,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach buyer contact metadata
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.buyer_email = Some(email.into());
        self
    }

    /// Attach a price snapshot
    #[must_use]
    pub const fn with_price(mut self, price: u128) -> Self {
        self.price = Some(price);
        self
    }
}

// ============================================================================
// Event records
// ============================================================================

/// Off-chain listing metadata for a ticket, confirmed by the `Created` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Ticket number the listing was minted as
    pub ticket_id: TicketId,
    /// Human-readable event name
    pub name: String,
    /// Organizer wallet, once confirmed
    pub organizer: Option<Address>,
    /// Listing price, once confirmed
    pub price: Option<u128>,
    /// Block at which the ledger confirmed the listing
    pub confirmed_block: Option<BlockNumber>,
}

impl EventRecord {
    /// Create an unconfirmed listing
    #[must_use]
    pub fn new(ticket_id: TicketId, name: impl Into<String>) -> Self {
        Self {
            ticket_id,
            name: name.into(),
            organizer: None,
            price: None,
            confirmed_block: None,
        }
    }

    /// Whether the ledger has confirmed this listing
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.confirmed_block.is_some()
    }
}

// ============================================================================
// Entry log
// ============================================================================

/// Outcome recorded for one scan attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanResult {
    /// Admitted; at most one per ticket
    Success,
    /// Benign re-scan shortly after a success
    Duplicate,
    /// Re-entry attempt after the duplicate window
    AlreadyUsed,
    /// Credential older than the freshness window
    Expired,
    /// Credential rejected for any other reason
    Invalid,
}

impl ScanResult {
    /// Storage label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Duplicate => "DUPLICATE",
            Self::AlreadyUsed => "ALREADY_USED",
            Self::Expired => "EXPIRED",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanResult {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "DUPLICATE" => Ok(Self::Duplicate),
            "ALREADY_USED" => Ok(Self::AlreadyUsed),
            "EXPIRED" => Ok(Self::Expired),
            "INVALID" => Ok(Self::Invalid),
            other => Err(ParseError::UnknownVariant {
                kind: "scan result",
                value: other.to_string(),
            }),
        }
    }
}

/// One immutable row of the entry log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLogRecord {
    /// Row identifier
    pub entry_id: EntryId,
    /// Scanned ticket
    pub ticket_id: TicketId,
    /// Server-assigned scan time
    pub scan_time: DateTime<Utc>,
    /// Outcome
    pub scan_result: ScanResult,
    /// Gatekeeper who performed the scan
    pub gatekeeper: Address,
    /// Gate or door identifier
    pub location: Option<String>,
    /// Holder presented on the credential, if it parsed
    pub holder: Option<Address>,
    /// Event named on the credential
    pub event_name: Option<String>,
    /// Human-readable reason for non-success outcomes
    pub reason: Option<String>,
}

impl EntryLogRecord {
    /// Whether this row marks the ticket as used
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.scan_result == ScanResult::Success
    }
}
