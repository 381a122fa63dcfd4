//! # GatePass Core
//!
//! Core domain types and dependency traits shared by the GatePass crates.
//!
//! GatePass keeps an off-chain store consistent with tickets whose ground truth
//! lives on an immutable ledger, and decides entry admission for scanned ticket
//! credentials against an append-only entry log.
//!
//! ## Core Concepts
//!
//! - **Lifecycle event**: a ledger-emitted fact (`Created`, `Purchased`,
//!   `Downloaded`, `Refunded`) ordered by `(block_number, log_index)`
//! - **Purchase record**: off-chain materialization of a purchase, keyed by the
//!   canonical transaction hash
//! - **Entry log**: append-only record of every scan attempt; a ticket is
//!   "used" once a `SUCCESS` row exists
//! - **Cursor**: the last block the indexer has fully enumerated
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  poll   ┌──────────┐  idempotent writes  ┌───────────────┐
//! │  Ledger  │ ──────→ │ Indexer  │ ──────────────────→ │ Off-chain     │
//! └──────────┘         └──────────┘                     │ Store         │
//!                                                       │  purchases    │
//! ┌──────────┐  scan   ┌──────────────────┐  read/append│  event records│
//! │Gatekeeper│ ──────→ │ Admission        │ ←─────────→ │  entry log    │
//! └──────────┘         │ Controller       │             │  cursor       │
//!                      └──────────────────┘             └───────────────┘
//! ```
//!
//! All external dependencies are abstracted behind the traits in [`ledger`],
//! [`store`] and [`environment`], so the indexer and admission controller can
//! be exercised against in-memory implementations.

pub mod abi;
pub mod ledger;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use types::*;

/// Environment module - Dependency injection traits
///
/// Time is injected rather than read from the system so that decision windows
/// and server-assigned scan times are deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gatepass_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
