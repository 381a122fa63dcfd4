//! Codec between ledger logs and [`LifecycleEvent`]s.
//!
//! The ticket contract emits one event per lifecycle transition. Ticket id and
//! counterparty are indexed (topics 1 and 2); amounts travel in the data
//! section as 32-byte big-endian words:
//!
//! | Kind | Signature |
//! |------|-----------|
//! | Created | `TicketCreated(uint256,address,uint256)` |
//! | Purchased | `TicketPurchased(uint256,address,uint256)` |
//! | Downloaded | `TicketDownloaded(uint256,address)` |
//! | Refunded | `TicketRefunded(uint256,address,uint256)` |
//!
//! The point query is `getTicket(uint256) returns (address, uint256, uint8)`.
//!
//! Values wider than the Rust types they decode into (ticket ids above
//! `u64::MAX`, amounts above `u128::MAX`) are rejected as malformed rather
//! than truncated.

use crate::ledger::RawLog;
use crate::types::{
    Address, EventKind, LedgerTicket, LedgerTicketState, LifecycleEvent, ParseError, TicketId,
    TxHash,
};
use chrono::{DateTime, Utc};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Size of one ABI word in bytes.
pub const WORD: usize = 32;

/// Errors raised while decoding ledger payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `topics[0]` does not match the requested event kind.
    #[error("Topic mismatch for {kind}: expected {expected}, found {found}")]
    WrongTopic {
        /// Kind that was requested
        kind: EventKind,
        /// Expected signature hash
        expected: String,
        /// Signature hash on the log
        found: String,
    },

    /// A required topic is missing.
    #[error("Log is missing topic {0}")]
    MissingTopic(usize),

    /// Hex payload could not be decoded.
    #[error("Malformed hex payload: {0}")]
    BadHex(String),

    /// Payload has the wrong number of bytes.
    #[error("Expected {expected} bytes of data, found {actual}")]
    BadLength {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// A numeric word does not fit the target type.
    #[error("Value for {0} does not fit")]
    Overflow(&'static str),

    /// An embedded identifier failed validation.
    #[error("Invalid identifier: {0}")]
    Identifier(#[from] ParseError),
}

/// Keccak-256 digest.
#[must_use]
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Canonical Solidity signature for an event kind.
#[must_use]
pub const fn event_signature(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Created => "TicketCreated(uint256,address,uint256)",
        EventKind::Purchased => "TicketPurchased(uint256,address,uint256)",
        EventKind::Downloaded => "TicketDownloaded(uint256,address)",
        EventKind::Refunded => "TicketRefunded(uint256,address,uint256)",
    }
}

/// `topics[0]` for an event kind (`0x`-prefixed keccak of the signature).
#[must_use]
pub fn event_topic(kind: EventKind) -> String {
    format!("0x{}", hex::encode(keccak256(event_signature(kind).as_bytes())))
}

/// Whether logs of this kind carry an amount word in their data section.
#[must_use]
pub const fn carries_amount(kind: EventKind) -> bool {
    !matches!(kind, EventKind::Downloaded)
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    hex::decode(digits).map_err(|e| DecodeError::BadHex(format!("{raw}: {e}")))
}

fn word_from_hex(raw: &str) -> Result<[u8; WORD], DecodeError> {
    let bytes = decode_hex(raw)?;
    bytes.as_slice().try_into().map_err(|_| DecodeError::BadLength {
        expected: WORD,
        actual: bytes.len(),
    })
}

fn word_to_u64(word: &[u8], what: &'static str) -> Result<u64, DecodeError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow(what));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(buf))
}

fn word_to_u128(word: &[u8], what: &'static str) -> Result<u128, DecodeError> {
    if word[..WORD - 16].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow(what));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[WORD - 16..]);
    Ok(u128::from_be_bytes(buf))
}

fn word_to_address(word: &[u8]) -> Result<Address, DecodeError> {
    if word[..WORD - 20].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow("address"));
    }
    Ok(Address::parse(&hex::encode(&word[WORD - 20..]))?)
}

fn u64_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn u128_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    // Address digits are validated on construction.
    if let Ok(bytes) = hex::decode(&address.as_str()[2..]) {
        word[WORD - bytes.len()..].copy_from_slice(&bytes);
    }
    word
}

fn topic_hex(word: &[u8; WORD]) -> String {
    format!("0x{}", hex::encode(word))
}

/// Decode a raw log fetched for `kind` into a [`LifecycleEvent`].
///
/// # Errors
///
/// Returns [`DecodeError`] if the log does not have the shape of `kind`.
pub fn decode_log(kind: EventKind, log: &RawLog) -> Result<LifecycleEvent, DecodeError> {
    let signature = log.topics.first().ok_or(DecodeError::MissingTopic(0))?;
    let expected = event_topic(kind);
    if !signature.eq_ignore_ascii_case(&expected) {
        return Err(DecodeError::WrongTopic {
            kind,
            expected,
            found: signature.clone(),
        });
    }

    let ticket_word = word_from_hex(log.topics.get(1).ok_or(DecodeError::MissingTopic(1))?)?;
    let party_word = word_from_hex(log.topics.get(2).ok_or(DecodeError::MissingTopic(2))?)?;
    let ticket_id = TicketId::new(word_to_u64(&ticket_word, "ticket id")?);
    let party = word_to_address(&party_word)?;

    let data = decode_hex(&log.data)?;
    let amount = if carries_amount(kind) {
        if data.len() != WORD {
            return Err(DecodeError::BadLength {
                expected: WORD,
                actual: data.len(),
            });
        }
        Some(word_to_u128(&data, "amount")?)
    } else {
        None
    };

    let timestamp = log
        .block_timestamp
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    Ok(LifecycleEvent {
        kind,
        ticket_id,
        party,
        amount,
        block_number: log.block_number,
        log_index: log.log_index,
        tx_hash: TxHash::parse(&log.tx_hash)?,
        timestamp,
    })
}

/// Encode a [`LifecycleEvent`] as the log the contract would emit.
///
/// Used by in-memory ledgers so tests exercise the same decoding path as
/// production.
#[must_use]
pub fn encode_log(event: &LifecycleEvent) -> RawLog {
    let data = if carries_amount(event.kind) {
        format!("0x{}", hex::encode(u128_word(event.amount.unwrap_or(0))))
    } else {
        "0x".to_string()
    };

    RawLog {
        topics: vec![
            event_topic(event.kind),
            topic_hex(&u64_word(event.ticket_id.value())),
            topic_hex(&address_word(&event.party)),
        ],
        data,
        block_number: event.block_number,
        log_index: event.log_index,
        tx_hash: event.tx_hash.to_string(),
        block_timestamp: event
            .timestamp
            .and_then(|ts| u64::try_from(ts.timestamp()).ok()),
    }
}

/// Call data for `getTicket(uint256)`.
#[must_use]
pub fn ticket_call_data(ticket_id: TicketId) -> String {
    let selector = &keccak256(b"getTicket(uint256)")[..4];
    format!(
        "0x{}{}",
        hex::encode(selector),
        hex::encode(u64_word(ticket_id.value()))
    )
}

/// Decode the return data of `getTicket(uint256)`.
///
/// The contract returns zeroed storage for unknown ids; that is reported as
/// `None`.
///
/// # Errors
///
/// Returns [`DecodeError`] if the return data is not three words.
pub fn decode_ticket(ticket_id: TicketId, return_data: &str) -> Result<Option<LedgerTicket>, DecodeError> {
    let bytes = decode_hex(return_data)?;
    if bytes.len() != 3 * WORD {
        return Err(DecodeError::BadLength {
            expected: 3 * WORD,
            actual: bytes.len(),
        });
    }
    if bytes.iter().all(|b| *b == 0) {
        return Ok(None);
    }

    let owner = word_to_address(&bytes[..WORD])?;
    let price = word_to_u128(&bytes[WORD..2 * WORD], "price")?;
    let code = word_to_u64(&bytes[2 * WORD..], "ticket state")?;
    let code = u8::try_from(code).map_err(|_| DecodeError::Overflow("ticket state"))?;

    Ok(Some(LedgerTicket {
        ticket_id,
        owner,
        price,
        state: LedgerTicketState::from_code(code)?,
    }))
}

/// Encode a [`LedgerTicket`] as `getTicket` return data.
#[must_use]
pub fn encode_ticket(ticket: &LedgerTicket) -> String {
    format!(
        "0x{}{}{}",
        hex::encode(address_word(&ticket.owner)),
        hex::encode(u128_word(ticket.price)),
        hex::encode(u64_word(u64::from(ticket.state.code())))
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn buyer() -> Address {
        Address::parse("0x00000000000000000000000000000000000000b1").unwrap()
    }

    fn purchased(ticket: u64) -> LifecycleEvent {
        LifecycleEvent {
            kind: EventKind::Purchased,
            ticket_id: TicketId::new(ticket),
            party: buyer(),
            amount: Some(50_000_000_000_000_000),
            block_number: 120,
            log_index: 3,
            tx_hash: TxHash::parse("0xABC").unwrap(),
            timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0),
        }
    }

    #[test]
    fn known_transfer_topic_matches_keccak() {
        // Well-known ERC-20 Transfer topic validates the hashing setup.
        let topic = hex::encode(keccak256(b"Transfer(address,address,uint256)"));
        assert_eq!(
            topic,
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn decodes_what_the_contract_emits() {
        let event = purchased(9);
        let decoded = decode_log(EventKind::Purchased, &encode_log(&event)).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn downloaded_logs_have_no_amount() {
        let mut event = purchased(4);
        event.kind = EventKind::Downloaded;
        event.amount = None;
        let log = encode_log(&event);
        assert_eq!(log.data, "0x");
        assert_eq!(decode_log(EventKind::Downloaded, &log).unwrap().amount, None);
    }

    #[test]
    fn rejects_log_of_another_kind() {
        let log = encode_log(&purchased(9));
        let err = decode_log(EventKind::Refunded, &log).unwrap_err();
        assert!(matches!(err, DecodeError::WrongTopic { .. }));
    }

    #[test]
    fn rejects_truncated_data() {
        let mut log = encode_log(&purchased(9));
        log.data = "0x01".to_string();
        assert!(matches!(
            decode_log(EventKind::Purchased, &log),
            Err(DecodeError::BadLength { expected: 32, actual: 1 })
        ));
    }

    #[test]
    fn rejects_ticket_id_wider_than_u64() {
        let mut log = encode_log(&purchased(9));
        log.topics[1] = format!("0x01{}", "0".repeat(62));
        assert_eq!(
            decode_log(EventKind::Purchased, &log),
            Err(DecodeError::Overflow("ticket id"))
        );
    }

    #[test]
    fn rejects_missing_party_topic() {
        let mut log = encode_log(&purchased(9));
        log.topics.truncate(2);
        assert_eq!(
            decode_log(EventKind::Purchased, &log),
            Err(DecodeError::MissingTopic(2))
        );
    }

    #[test]
    fn ticket_call_data_has_selector_and_word() {
        let data = ticket_call_data(TicketId::new(42));
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.ends_with("2a"));
    }

    #[test]
    fn decodes_ticket_struct() {
        let ticket = LedgerTicket {
            ticket_id: TicketId::new(42),
            owner: buyer(),
            price: 1_000,
            state: LedgerTicketState::Downloaded,
        };
        let decoded = decode_ticket(TicketId::new(42), &encode_ticket(&ticket)).unwrap();
        assert_eq!(decoded, Some(ticket));
    }

    #[test]
    fn zeroed_ticket_struct_means_unknown() {
        let zeros = format!("0x{}", "0".repeat(64 * 3));
        assert_eq!(decode_ticket(TicketId::new(1), &zeros).unwrap(), None);
    }
}
