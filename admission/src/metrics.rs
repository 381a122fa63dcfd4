//! Admission metrics.
//!
//! - `gatepass_admissions_total{decision}` - Scan decisions by verdict
//! - `gatepass_admissions_retryable_total` - Decisions that could not be
//!   completed because the store was unavailable or slow

use crate::decision::Decision;
use metrics::describe_counter;

/// Register admission metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "gatepass_admissions_total",
        "Scan decisions by verdict (ADMIT, DUPLICATE, ALREADY_USED, EXPIRED, INVALID)"
    );
    describe_counter!(
        "gatepass_admissions_retryable_total",
        "Scan decisions that failed on store trouble and may be retried"
    );
}

/// Record one decision.
pub fn record_decision(decision: Decision) {
    metrics::counter!("gatepass_admissions_total", "decision" => decision.as_str()).increment(1);
}

/// Record a decision that could not be completed.
pub fn record_retryable() {
    metrics::counter!("gatepass_admissions_retryable_total").increment(1);
}
