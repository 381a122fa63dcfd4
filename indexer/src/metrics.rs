//! Indexer metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `gatepass_indexer_events_total{kind,outcome}` - Events handled by outcome
//!   (applied, skipped, corrected, unmatched, malformed, failed)
//! - `gatepass_indexer_corrections_total` - Purchase records whose ticket id
//!   was overwritten from the ledger
//! - `gatepass_indexer_poll_failures_total` - Poll cycles aborted by a ledger
//!   or store failure
//!
//! ## Gauges
//! - `gatepass_indexer_cursor` - Last fully processed block
//!
//! ## Histograms
//! - `gatepass_indexer_poll_duration_seconds` - Wall time of a poll cycle

use gatepass_core::{BlockNumber, EventKind};
use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all indexer metric descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_metrics() {
    describe_counter!(
        "gatepass_indexer_events_total",
        "Ledger events handled by the indexer, by kind and outcome"
    );
    describe_counter!(
        "gatepass_indexer_corrections_total",
        "Purchase records whose ticket id was corrected from the ledger"
    );
    describe_counter!(
        "gatepass_indexer_poll_failures_total",
        "Poll cycles aborted before completing"
    );
    describe_gauge!(
        "gatepass_indexer_cursor",
        "Last block whose enumeration completed"
    );
    describe_histogram!(
        "gatepass_indexer_poll_duration_seconds",
        "Time taken by one poll cycle"
    );

    tracing::info!("Indexer metrics registered");
}

/// Record one handled event.
pub fn record_event(kind: EventKind, outcome: &'static str) {
    metrics::counter!(
        "gatepass_indexer_events_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a ticket id correction.
pub fn record_correction() {
    metrics::counter!("gatepass_indexer_corrections_total").increment(1);
}

/// Record an aborted poll cycle.
pub fn record_poll_failure() {
    metrics::counter!("gatepass_indexer_poll_failures_total").increment(1);
}

/// Publish the cursor position.
#[allow(clippy::cast_precision_loss)] // Block heights stay far below 2^52
pub fn set_cursor(block: BlockNumber) {
    metrics::gauge!("gatepass_indexer_cursor").set(block as f64);
}

/// Record the duration of a poll cycle.
pub fn record_poll_duration(duration_secs: f64) {
    metrics::histogram!("gatepass_indexer_poll_duration_seconds").record(duration_secs);
}
