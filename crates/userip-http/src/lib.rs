//! UserIP HTTP — REST transport adapter for the user-IP tracking server.
//!
//! Provides:
//! - the tracking middleware that records `(user, client IP)` sightings
//! - the matcher (`GET /match`) and the known-IP gate for protected routes
//! - reverse-index diagnostics (`/users/{user}/ips`, `/ips/{ip}/users`)
//! - a forced flush (`POST /admin/flush`)
//! - health and Prometheus metrics, request-ID middleware

pub mod client_ip;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub use axum::http::HeaderName;
pub use state::{AppState, DEFAULT_USER_HEADER};

fn api_routes() -> Router<AppState> {
    Router::new()
        // Matcher and diagnostics
        .route("/match", get(routes::lookup::match_client))
        .route("/users/{user}/ips", get(routes::lookup::user_ips))
        .route("/ips/{ip}/users", get(routes::lookup::ip_users))
        // Admin
        .route("/admin/flush", post(routes::admin::flush))
        // System
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics_endpoint))
}

fn finish(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track::track_user_ip_middleware,
        ))
        .layer(axum::middleware::from_fn(
            middleware::request_id::request_id_middleware,
        ))
        .with_state(state)
}

/// Builds the HTTP API router.
///
/// Every route, including the built-in ones, passes through the tracking
/// middleware.
pub fn router(state: AppState) -> Router {
    finish(api_routes(), state)
}

/// Builds the API router plus `protected` routes that only admit clients
/// whose IP belongs to a tracked user. `protected` must hold at least one
/// route.
///
/// Tracking runs before the gate, so a request carrying the user header
/// registers its IP and is admitted.
pub fn router_with_protected(state: AppState, protected: Router<AppState>) -> Router {
    let protected = protected.route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::known_ip::require_known_ip_middleware,
    ));
    finish(api_routes().merge(protected), state)
}

/// Serve the HTTP router on the given listener with graceful shutdown.
///
/// Wraps `axum::serve` with `ConnectInfo<SocketAddr>` so the peer address
/// is available when no forwarding header is present.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
