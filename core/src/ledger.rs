//! Read interface to the external ledger.
//!
//! The ledger is the immutable source of truth for ticket existence, ownership
//! and lifecycle transitions. GatePass only ever reads from it:
//!
//! - [`Ledger::head_block`]: current chain head
//! - [`Ledger::logs`]: raw event logs of one [`EventKind`] over a block range
//! - [`Ledger::ticket`]: point query for one ticket's lifecycle struct
//!
//! Logs are returned undecoded ([`RawLog`]) so that one malformed log can be
//! skipped by the caller without failing the whole query. Decoding lives in
//! [`crate::abi`].
//!
//! # Implementations
//!
//! - `JsonRpcLedger` (in `gatepass-ledger`): production JSON-RPC client
//! - `InMemoryLedger` (in `gatepass-testing`): deterministic testing
//!
//! # Dyn Compatibility
//!
//! The trait returns boxed futures so it can be shared as `Arc<dyn Ledger>`
//! between the indexer loop and maintenance tasks.

use crate::types::{BlockNumber, BlockRange, EventKind, LedgerTicket, TicketId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Boxed future returned by dyn-compatible traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur while reading from the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger endpoint could not be reached.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// A request exceeded its deadline.
    #[error("Ledger request timed out after {0:?}")]
    Timeout(Duration),

    /// The node answered with a JSON-RPC error.
    #[error("Ledger RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message from the node
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Whether retrying on the next poll may succeed.
    ///
    /// Every ledger failure is retried by the indexer; this only affects how
    /// loudly it is logged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// An undecoded event log as reported by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Indexed topics; `topics[0]` is the event signature hash
    pub topics: Vec<String>,
    /// Hex-encoded non-indexed data
    pub data: String,
    /// Block containing the log
    pub block_number: BlockNumber,
    /// Log index within the block
    pub log_index: u64,
    /// Transaction that emitted the log (as reported, not yet normalized)
    pub tx_hash: String,
    /// Block timestamp in seconds, when the node includes it
    pub block_timestamp: Option<u64>,
}

/// Read-only access to the ledger.
pub trait Ledger: Send + Sync {
    /// Human-readable endpoint, reported by the indexer status probe.
    fn endpoint(&self) -> &str;

    /// Current chain head.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the ledger cannot be reached.
    fn head_block(&self) -> BoxFuture<'_, Result<BlockNumber, LedgerError>>;

    /// All logs of `kind` emitted within `range` (inclusive).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the query cannot be completed. A partial
    /// result is never returned.
    fn logs(
        &self,
        kind: EventKind,
        range: BlockRange,
    ) -> BoxFuture<'_, Result<Vec<RawLog>, LedgerError>>;

    /// Lifecycle struct for one ticket, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the ledger cannot be reached.
    fn ticket(&self, ticket_id: TicketId)
    -> BoxFuture<'_, Result<Option<LedgerTicket>, LedgerError>>;
}
