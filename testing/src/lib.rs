//! # GatePass Testing
//!
//! Testing utilities for GatePass.
//!
//! This crate provides:
//! - [`InMemoryLedger`]: scripted ledger with outage and malformed-log injection
//! - [`InMemoryStore`]: every store trait behind one lock, including the
//!   `(ticket, SUCCESS)` uniqueness guard
//! - [`ManualClock`]: a clock tests move by hand
//! - [`fixtures`]: short constructors for addresses, hashes and events
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_testing::{InMemoryLedger, InMemoryStore, test_clock};
//!
//! let ledger = Arc::new(InMemoryLedger::new());
//! let store = Arc::new(InMemoryStore::new());
//! ledger.push_event(fixtures::purchased(9, fixtures::tx(0xabc), 1, 120, 0));
//! ```

use chrono::{DateTime, Utc};
use gatepass_core::environment::Clock;

mod ledger_mocks;
mod store_mocks;

pub use ledger_mocks::InMemoryLedger;
pub use store_mocks::{InMemoryStore, LookupHold};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Clock whose time only changes when a test says so.
    ///
    /// Clones share the same underlying time, so a test can keep one handle
    /// and hand another to the component under test.
    ///
    /// # Example
    ///
    /// ```
    /// use gatepass_testing::mocks::ManualClock;
    /// use gatepass_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let before = clock.now();
    /// clock.advance(Duration::seconds(30));
    /// assert_eq!(clock.now() - before, Duration::seconds(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward with a negative duration)
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }

        /// Jump to an absolute time
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap() = to;
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Short constructors for test data.
#[allow(clippy::expect_used)]
pub mod fixtures {
    use gatepass_core::{Address, EventKind, LifecycleEvent, TicketId, TxHash};

    /// Address whose last byte is `n`.
    ///
    /// # Panics
    ///
    /// Never; the generated address is always well formed.
    #[must_use]
    pub fn address(n: u8) -> Address {
        Address::parse(&format!("0x{n:040x}")).expect("generated address is valid")
    }

    /// Transaction hash with numeric value `n`.
    ///
    /// # Panics
    ///
    /// Never; the generated hash is always well formed.
    #[must_use]
    pub fn tx(n: u64) -> TxHash {
        TxHash::parse(&format!("0x{n:x}")).expect("generated hash is valid")
    }

    /// A lifecycle event at `(block, log_index)`.
    #[must_use]
    pub fn event(
        kind: EventKind,
        ticket: u64,
        tx_hash: TxHash,
        party: u8,
        block: u64,
        log_index: u64,
    ) -> LifecycleEvent {
        let amount = match kind {
            EventKind::Downloaded => None,
            _ => Some(1_000),
        };
        LifecycleEvent {
            kind,
            ticket_id: TicketId::new(ticket),
            party: address(party),
            amount,
            block_number: block,
            log_index,
            tx_hash,
            timestamp: None,
        }
    }

    /// A `Purchased` event.
    #[must_use]
    pub fn purchased(ticket: u64, tx_hash: TxHash, buyer: u8, block: u64, log_index: u64) -> LifecycleEvent {
        event(EventKind::Purchased, ticket, tx_hash, buyer, block, log_index)
    }
}

// Re-export commonly used items
pub use mocks::{ManualClock, test_clock};
