//! Admission policy: fraud windows and credential requirements.

use crate::decision::Decision;
use crate::token::TokenKey;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// How a credential's timestamp compares to server time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Within the freshness window and not ahead of the allowed skew
    Fresh,
    /// Older than the freshness window
    Stale {
        /// How old the credential is
        age: TimeDelta,
    },
    /// Further in the future than the allowed clock skew
    Ahead {
        /// How far ahead of server time
        ahead: TimeDelta,
    },
}

/// Tunable admission rules.
///
/// # Example
///
/// ```
/// use gatepass_admission::AdmissionPolicy;
/// use std::time::Duration;
///
/// let policy = AdmissionPolicy::default()
///     .with_duplicate_window(Duration::from_secs(90))
///     .with_freshness_window(Duration::from_secs(120));
/// assert_eq!(policy.duplicate_window, Duration::from_secs(90));
/// ```
#[derive(Clone, Debug)]
pub struct AdmissionPolicy {
    /// A re-scan within this long of the success is a benign duplicate
    pub duplicate_window: Duration,
    /// Maximum credential age
    pub freshness_window: Duration,
    /// Maximum tolerated credential timestamp ahead of server time
    pub max_clock_skew: Duration,
    /// Key for freshness tokens; tokens are not checked when unset
    pub token_key: Option<TokenKey>,
    /// Reject credentials without a token (only with a key configured)
    pub require_token: bool,
    /// Bound on one whole decision
    pub decision_timeout: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            duplicate_window: Duration::from_secs(60),
            freshness_window: Duration::from_secs(300),
            max_clock_skew: Duration::from_secs(30),
            token_key: None,
            require_token: false,
            decision_timeout: Duration::from_secs(5),
        }
    }
}

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

impl AdmissionPolicy {
    /// Set the duplicate window
    #[must_use]
    pub const fn with_duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    /// Set the freshness window
    #[must_use]
    pub const fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set the tolerated clock skew
    #[must_use]
    pub const fn with_max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    /// Check freshness tokens with `key`; `required` rejects credentials
    /// that carry none.
    #[must_use]
    pub fn with_token_key(mut self, key: TokenKey, required: bool) -> Self {
        self.token_key = Some(key);
        self.require_token = required;
        self
    }

    /// Set the decision timeout
    #[must_use]
    pub const fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }

    /// Classify a credential issued at `issued` as seen at `now`.
    ///
    /// A credential exactly at the window edge is still fresh.
    #[must_use]
    pub fn freshness(&self, now: DateTime<Utc>, issued: DateTime<Utc>) -> Freshness {
        let age = now - issued;
        if age > delta(self.freshness_window) {
            Freshness::Stale { age }
        } else if -age > delta(self.max_clock_skew) {
            Freshness::Ahead { ahead: -age }
        } else {
            Freshness::Fresh
        }
    }

    /// Decision for a re-scan at `now` of a ticket first admitted at
    /// `admitted_at`.
    ///
    /// A success stamped after `now` (a concurrent winner on a clock that
    /// ran ahead) counts as zero elapsed time.
    #[must_use]
    pub fn classify_rescan(&self, now: DateTime<Utc>, admitted_at: DateTime<Utc>) -> Decision {
        let elapsed = (now - admitted_at).max(TimeDelta::zero());
        if elapsed < delta(self.duplicate_window) {
            Decision::Duplicate
        } else {
            Decision::AlreadyUsed
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn rescan_windows() {
        let policy = AdmissionPolicy::default();
        assert_eq!(
            policy.classify_rescan(t0() + TimeDelta::seconds(30), t0()),
            Decision::Duplicate
        );
        assert_eq!(
            policy.classify_rescan(t0() + TimeDelta::minutes(10), t0()),
            Decision::AlreadyUsed
        );
        assert_eq!(
            policy.classify_rescan(t0() + TimeDelta::seconds(60), t0()),
            Decision::AlreadyUsed
        );
        assert_eq!(
            policy.classify_rescan(t0() - TimeDelta::seconds(2), t0()),
            Decision::Duplicate
        );
    }

    #[test]
    fn freshness_windows() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.freshness(t0(), t0() - TimeDelta::minutes(5)), Freshness::Fresh);
        assert_eq!(
            policy.freshness(t0(), t0() - TimeDelta::minutes(6)),
            Freshness::Stale {
                age: TimeDelta::minutes(6)
            }
        );
        assert_eq!(policy.freshness(t0(), t0() + TimeDelta::seconds(30)), Freshness::Fresh);
        assert_eq!(
            policy.freshness(t0(), t0() + TimeDelta::seconds(31)),
            Freshness::Ahead {
                ahead: TimeDelta::seconds(31)
            }
        );
    }

    proptest! {
        #[test]
        fn rescan_is_duplicate_exactly_inside_window(window in 1u64..3_600, elapsed in 0i64..7_200) {
            let policy = AdmissionPolicy::default().with_duplicate_window(Duration::from_secs(window));
            let decision = policy.classify_rescan(t0() + TimeDelta::seconds(elapsed), t0());
            let inside = u64::try_from(elapsed).unwrap() < window;
            prop_assert_eq!(decision == Decision::Duplicate, inside);
        }

        #[test]
        fn stale_iff_older_than_window(window in 1u64..3_600, age in -60i64..7_200) {
            let policy = AdmissionPolicy::default()
                .with_freshness_window(Duration::from_secs(window))
                .with_max_clock_skew(Duration::from_secs(60));
            let verdict = policy.freshness(t0(), t0() - TimeDelta::seconds(age));
            let stale = age > 0 && u64::try_from(age).unwrap() > window;
            prop_assert_eq!(matches!(verdict, Freshness::Stale { .. }), stale);
            let ahead = matches!(verdict, Freshness::Ahead { .. });
            prop_assert!(!ahead);
        }
    }
}
