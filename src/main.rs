//! UserIP Server entry point.

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use userip_http::HeaderName;
use userip_server::AppState;
use userip_server::ServiceState;
use userip_server::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let service = match ServiceState::new(&config.service_config()) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };

    if let Err(e) = service.load_from_disk() {
        tracing::error!(
            path = %config.persist_path,
            error = %e,
            "Failed to load user IP data from disk"
        );
        std::process::exit(1);
    }
    tracing::info!(path = %config.persist_path, "Loaded user IP data from disk");

    let user_header = HeaderName::try_from(config.user_header.as_str()).unwrap_or_else(|e| {
        tracing::error!(header = %config.user_header, error = %e, "Invalid user header name");
        std::process::exit(2);
    });

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        persist_path = %config.persist_path,
        max_ips_per_user = config.max_ips_per_user,
        user_data_ttl = config.user_data_ttl,
        "UserIP Server starting",
    );

    service.start_persister();

    let app = userip_server::router(AppState::new(service.clone(), user_header));

    let addr = SocketAddr::new(config.host.parse().expect("invalid host"), config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, "UserIP Server ready");

    if let Err(e) = userip_http::serve(listener, app, shutdown_signal()).await {
        tracing::error!(error = %e, "Server error");
    }

    // The final write happens even if serving failed.
    if service.shutdown().await.is_err() {
        std::process::exit(1);
    }

    tracing::info!("UserIP Server shut down");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install signal handler");
    tracing::info!("Shutdown signal received");
}
