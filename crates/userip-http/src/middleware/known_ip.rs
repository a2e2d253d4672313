//! Gate that only admits clients whose IP belongs to a tracked user.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::client_ip::ClientIp;
use crate::error::ApiError;
use crate::state::AppState;

/// Returns 403 unless the client IP is in the reverse index.
pub async fn require_known_ip_middleware(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let matched = ip.as_deref().is_some_and(|ip| state.store().has_ip(ip));
    tracing::debug!(ip = ?ip, matched, "Matching client IP against known user IPs");

    if !matched {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}
