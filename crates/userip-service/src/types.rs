//! Domain types shared by the store, the codec and the transports.

use std::collections::BTreeMap;

use serde::Serialize;

/// One IP address seen for a user, with the Unix second it was last seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sighting {
    pub ip: String,
    pub last_seen: i64,
}

impl Sighting {
    pub fn new(ip: impl Into<String>, last_seen: i64) -> Self {
        Self {
            ip: ip.into(),
            last_seen,
        }
    }
}

/// IP history of a single user, most recently used first.
///
/// Every IP appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub sightings: Vec<Sighting>,
}

impl UserRecord {
    /// Returns the index of `ip` in the history, if present.
    pub fn position(&self, ip: &str) -> Option<usize> {
        self.sightings.iter().position(|s| s.ip == ip)
    }

    /// Newest timestamp across the history, or 0 when empty.
    pub fn most_recent(&self) -> i64 {
        self.sightings
            .iter()
            .map(|s| s.last_seen)
            .max()
            .unwrap_or(0)
    }

    pub fn ips(&self) -> Vec<String> {
        self.sightings.iter().map(|s| s.ip.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sightings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sightings.is_empty()
    }

    /// Drops repeated IPs (keeping the first, most recent occurrence) and
    /// truncates to `max` entries. Returns `true` if anything was removed.
    pub(crate) fn normalize(&mut self, max: usize) -> bool {
        let before = self.sightings.len();
        let mut seen = std::collections::HashSet::new();
        self.sightings.retain(|s| seen.insert(s.ip.clone()));
        self.sightings.truncate(max);
        self.sightings.len() != before
    }
}

/// Durable projection of every user record. The reverse index is not part
/// of it; it is always rebuilt from the records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub users: BTreeMap<String, UserRecord>,
}

/// Counts reported by health and metrics endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub users: usize,
    pub ips: usize,
    pub dirty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_recent_ignores_order() {
        let record = UserRecord {
            sightings: vec![Sighting::new("1.1.1.1", 5), Sighting::new("2.2.2.2", 9)],
        };
        assert_eq!(record.most_recent(), 9);
        assert_eq!(UserRecord::default().most_recent(), 0);
    }

    #[test]
    fn normalize_dedupes_and_truncates() {
        let mut record = UserRecord {
            sightings: vec![
                Sighting::new("1.1.1.1", 9),
                Sighting::new("2.2.2.2", 8),
                Sighting::new("1.1.1.1", 7),
                Sighting::new("3.3.3.3", 6),
            ],
        };
        assert!(record.normalize(2));
        assert_eq!(record.ips(), vec!["1.1.1.1", "2.2.2.2"]);
        assert_eq!(record.sightings[0].last_seen, 9);
        assert!(!record.normalize(2));
    }
}
