//! JSON codec for the snapshot file.
//!
//! Current schema:
//!
//! ```json
//! { "user_data": { "alice@example.com": { "ips": [ { "ip": "1.2.3.4", "last_seen": 1700000000 } ] } } }
//! ```
//!
//! The legacy schema stored a flat list of IP strings and one `last_seen`
//! per user. It is accepted on read only: each IP inherits the user-level
//! timestamp and the result is flagged as migrated so the caller rewrites
//! the file in the current schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::types::{Sighting, Snapshot, UserRecord};

/// Result of decoding a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub snapshot: Snapshot,
    /// `true` when the payload was in the legacy schema.
    pub migrated: bool,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DocumentOut<'a> {
    user_data: BTreeMap<&'a str, UserOut<'a>>,
}

#[derive(Serialize)]
struct UserOut<'a> {
    ips: Vec<IpOut<'a>>,
}

#[derive(Serialize)]
struct IpOut<'a> {
    ip: &'a str,
    last_seen: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen_iso: Option<String>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    user_data: Option<BTreeMap<String, UserEntry>>,
}

// Unknown keys (a stale user-level `last_seen`, `last_seen_iso`) are ignored.
#[derive(Deserialize)]
struct UserEntry {
    #[serde(default)]
    ips: Option<Vec<IpEntry>>,
}

#[derive(Deserialize)]
struct IpEntry {
    ip: String,
    last_seen: i64,
}

#[derive(Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    user_data: Option<BTreeMap<String, LegacyUserEntry>>,
}

#[derive(Deserialize)]
struct LegacyUserEntry {
    #[serde(default)]
    ips: Option<Vec<String>>,
    #[serde(default)]
    last_seen: i64,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Serializes a snapshot as pretty-printed JSON with users in key order.
///
/// With `annotate`, every IP entry also carries a human-readable
/// `last_seen_iso` field. It is ignored on read.
pub fn encode(snapshot: &Snapshot, annotate: bool) -> Result<Vec<u8>, ServiceError> {
    let user_data = snapshot
        .users
        .iter()
        .map(|(user, record)| {
            let ips = record
                .sightings
                .iter()
                .map(|s| IpOut {
                    ip: &s.ip,
                    last_seen: s.last_seen,
                    last_seen_iso: annotate.then(|| iso8601(s.last_seen)),
                })
                .collect();
            (user.as_str(), UserOut { ips })
        })
        .collect();

    serde_json::to_vec_pretty(&DocumentOut { user_data })
        .map_err(|e| ServiceError::Internal(format!("encoding snapshot: {e}")))
}

/// Parses a snapshot, trying the current schema first and the legacy
/// schema second.
pub fn decode(bytes: &[u8]) -> Result<Decoded, ServiceError> {
    let current_err = match serde_json::from_slice::<Document>(bytes) {
        Ok(doc) => {
            return Ok(Decoded {
                snapshot: from_current(doc),
                migrated: false,
            });
        }
        Err(e) => e,
    };

    match serde_json::from_slice::<LegacyDocument>(bytes) {
        Ok(doc) => Ok(Decoded {
            snapshot: from_legacy(doc),
            migrated: true,
        }),
        Err(legacy_err) => Err(ServiceError::MalformedData(format!(
            "not the current schema ({current_err}) nor the legacy schema ({legacy_err})"
        ))),
    }
}

fn from_current(doc: Document) -> Snapshot {
    let users = doc
        .user_data
        .unwrap_or_default()
        .into_iter()
        .map(|(user, entry)| {
            let sightings = entry
                .ips
                .unwrap_or_default()
                .into_iter()
                .map(|e| Sighting::new(e.ip, e.last_seen))
                .collect();
            (user, UserRecord { sightings })
        })
        .collect();
    Snapshot { users }
}

fn from_legacy(doc: LegacyDocument) -> Snapshot {
    let users = doc
        .user_data
        .unwrap_or_default()
        .into_iter()
        .map(|(user, entry)| {
            let last_seen = entry.last_seen;
            let sightings = entry
                .ips
                .unwrap_or_default()
                .into_iter()
                .map(|ip| Sighting::new(ip, last_seen))
                .collect();
            (user, UserRecord { sightings })
        })
        .collect();
    Snapshot { users }
}

fn iso8601(unix: i64) -> String {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
