//! Matcher and reverse-index diagnostics.

use axum::extract::{Json, Path, State};

use crate::client_ip::ClientIp;
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{IpUsersResponse, MatchResponse, UserIpsResponse};

/// Reports whether the caller's IP belongs to any tracked user.
pub async fn match_client(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
) -> Json<MatchResponse> {
    let matched = ip.as_deref().is_some_and(|ip| state.store().has_ip(ip));
    tracing::debug!(ip = ?ip, matched, "Matching client IP against known user IPs");
    Json(MatchResponse { ip, matched })
}

/// IP history of a user with last-seen timestamps.
pub async fn user_ips(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<UserIpsResponse>, ApiError> {
    let ips = state
        .store()
        .sightings_for_user(&user)
        .ok_or_else(|| ApiError::NotFound(format!("user '{user}' is not tracked")))?;
    Ok(Json(UserIpsResponse { user, ips }))
}

/// Users currently associated with an IP. Unknown IPs yield an empty list.
pub async fn ip_users(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Json<IpUsersResponse> {
    let users = state.store().users_for_ip(&ip).into_iter().collect();
    Json(IpUsersResponse { ip, users })
}
