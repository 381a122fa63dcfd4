//! Gatekeeper authorization.

use gatepass_core::{Address, ParseError};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Which gatekeepers may scan for which events.
pub trait GatekeeperDirectory: Send + Sync {
    /// Whether `gatekeeper` may admit holders to `event_name`.
    fn is_authorized(&self, gatekeeper: &Address, event_name: &str) -> bool;
}

/// Fixed gatekeeper assignments, loaded from configuration.
///
/// Parsed from `event:address` pairs separated by commas:
///
/// ```
/// use gatepass_admission::{GatekeeperDirectory, StaticGatekeepers};
/// use gatepass_core::Address;
///
/// let directory: StaticGatekeepers =
///     "Summer Fest:0x00000000000000000000000000000000000000e1".parse().unwrap();
/// let gatekeeper = Address::parse("0x00000000000000000000000000000000000000E1").unwrap();
/// assert!(directory.is_authorized(&gatekeeper, "Summer Fest"));
/// assert!(!directory.is_authorized(&gatekeeper, "Winter Gala"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticGatekeepers {
    by_event: HashMap<String, HashSet<Address>>,
}

impl StaticGatekeepers {
    /// Empty directory; nobody is authorized
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize `gatekeeper` for `event_name`
    #[must_use]
    pub fn allow(mut self, event_name: impl Into<String>, gatekeeper: Address) -> Self {
        self.by_event
            .entry(event_name.into())
            .or_default()
            .insert(gatekeeper);
        self
    }

    /// Number of `(event, gatekeeper)` assignments
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_event.values().map(HashSet::len).sum()
    }

    /// Whether no gatekeeper is authorized anywhere
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GatekeeperDirectory for StaticGatekeepers {
    fn is_authorized(&self, gatekeeper: &Address, event_name: &str) -> bool {
        self.by_event
            .get(event_name)
            .is_some_and(|allowed| allowed.contains(gatekeeper))
    }
}

impl FromStr for StaticGatekeepers {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .try_fold(Self::new(), |directory, entry| {
                // Event names may contain ':'; addresses never do.
                let (event, address) = entry.rsplit_once(':').ok_or_else(|| {
                    ParseError::UnknownVariant {
                        kind: "gatekeeper assignment",
                        value: entry.to_string(),
                    }
                })?;
                let event = event.trim();
                if event.is_empty() {
                    return Err(ParseError::Empty("gatekeeper event name"));
                }
                Ok(directory.allow(event, Address::parse(address)?))
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn parses_multiple_assignments() {
        let directory: StaticGatekeepers = "Concert:0x00000000000000000000000000000000000000e1, \
             Concert:0x00000000000000000000000000000000000000e2,\
             Expo 2025: Hall A:0x00000000000000000000000000000000000000e1"
            .parse()
            .unwrap();

        assert_eq!(directory.len(), 3);
        let e2 = Address::parse("0x00000000000000000000000000000000000000e2").unwrap();
        assert!(directory.is_authorized(&e2, "Concert"));
        assert!(!directory.is_authorized(&e2, "Expo 2025: Hall A"));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!("Concert".parse::<StaticGatekeepers>().is_err());
        assert!(":0x00000000000000000000000000000000000000e1".parse::<StaticGatekeepers>().is_err());
        assert!("Concert:0x12".parse::<StaticGatekeepers>().is_err());
        assert!("".parse::<StaticGatekeepers>().unwrap().is_empty());
    }
}
