//! # GatePass Indexer
//!
//! Polls the ledger for ticket lifecycle events and applies them to the
//! off-chain store with idempotent, natural-key writes.
//!
//! # Overview
//!
//! - [`Indexer`]: the polling component; `start()` spawns the loop, `stop()`
//!   signals shutdown and awaits it
//! - [`CorrelationStrategy`]: ordered lookups that match a ledger event to an
//!   off-chain purchase record
//! - [`BatchReport`]: per-batch outcome counts
//!
//! # Progress
//!
//! ```text
//! cursor ─→ [last+1 ..= head] ─→ batches of N blocks ─→ per batch:
//!     fetch every kind concurrently → decode → sort by (block, log_index)
//!     → apply sequentially → persist cursor = batch.to
//! ```
//!
//! The cursor only moves after a batch's enumeration completes. A ledger
//! failure anywhere in a batch aborts the cycle with the cursor at the last
//! completed batch; the next tick retries from there.
//!
//! # Example
//!
//! ```ignore
//! use gatepass_indexer::{Indexer, IndexerConfig};
//!
//! let indexer = Indexer::new(ledger, store, clock, IndexerConfig::default());
//! indexer.start().await?;
//! // ...
//! indexer.stop().await?;
//! ```

use gatepass_core::ledger::LedgerError;
use gatepass_core::store::StoreError;
use gatepass_core::BlockNumber;
use thiserror::Error;

mod config;
mod correlation;
mod handlers;
mod indexer;
pub mod metrics;

pub use config::{IndexerConfig, StartBlock};
pub use correlation::{Correlation, CorrelationStrategy};
pub use handlers::Outcome;
pub use indexer::{BatchReport, Indexer, IndexerStatus, PollReport};

/// Errors that abort an indexing cycle or a maintenance call.
///
/// Per-event handler failures never surface here; they are counted in
/// [`BatchReport::failed`].
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Ledger unreachable, timed out or returned garbage.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Cursor or record storage failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// `start()` called while the polling task is alive.
    #[error("Indexer is already running")]
    AlreadyRunning,

    /// Rescan bounds are inverted.
    #[error("Invalid block range: {from} > {to}")]
    InvalidRange {
        /// Requested first block
        from: BlockNumber,
        /// Requested last block
        to: BlockNumber,
    },

    /// The polling task panicked or was cancelled.
    #[error("Indexer task failed: {0}")]
    Task(String),
}

/// Result type for indexer operations
pub type Result<T> = std::result::Result<T, IndexerError>;
