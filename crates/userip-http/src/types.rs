//! Response bodies of the HTTP API.

use serde::Serialize;
use userip_service::types::Sighting;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Server status ("ok").
    pub status: String,
    /// Server version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_seconds: u64,
    /// Users with at least one retained IP.
    pub users_tracked: usize,
    /// Distinct IPs in the reverse index.
    pub ips_tracked: usize,
    /// In-memory state differs from the last written snapshot.
    pub dirty: bool,
    pub persister_running: bool,
}

/// Result of matching the caller's IP against the tracked users.
#[derive(Serialize)]
pub struct MatchResponse {
    /// Resolved client IP, if any.
    pub ip: Option<String>,
    pub matched: bool,
}

/// IP history of one user, most recent first.
#[derive(Serialize)]
pub struct UserIpsResponse {
    pub user: String,
    pub ips: Vec<Sighting>,
}

/// Users currently associated with one IP, sorted.
#[derive(Serialize)]
pub struct IpUsersResponse {
    pub ip: String,
    pub users: Vec<String>,
}

#[derive(Serialize)]
pub struct FlushResponse {
    /// `true` once the snapshot file has been replaced.
    pub written: bool,
}
