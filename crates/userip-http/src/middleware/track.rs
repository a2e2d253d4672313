//! User-IP tracking middleware.
//!
//! Every request that carries the authenticated-user header records a
//! sighting of the client IP for that user. Requests without the header
//! pass through untouched. The store call only takes an in-memory lock;
//! persistence happens in the background.

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::client_ip;
use crate::state::AppState;

/// Returns the trimmed, non-empty value of the user header.
fn user_from(req: &Request, state: &AppState) -> Option<String> {
    req.headers()
        .get(state.user_header())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub async fn track_user_ip_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(user) = user_from(&req, &state) else {
        tracing::trace!("No user header, skipping IP tracking");
        return next.run(req).await;
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0);

    match client_ip::resolve(req.headers(), peer) {
        Some(ip) => {
            let new_ip = state.store().record(&user, &ip);
            tracing::debug!(user = %user, ip = %ip, new_ip, "Tracked user IP");
        }
        None => tracing::debug!(user = %user, "Client IP unavailable, skipping IP tracking"),
    }

    next.run(req).await
}
