//! Server configuration via CLI args and environment variables.

use std::time::Duration;

use clap::Parser;
use userip_service::ServiceConfig;

/// Tracks the client IPs of authenticated users and answers "is this IP
/// one of theirs?".
#[derive(Parser, Debug, Clone)]
#[command(name = "userip-server", version, about)]
pub struct Config {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "USERIP_HOST")]
    pub host: String,

    /// Bind port.
    #[arg(long, default_value_t = 7480, env = "USERIP_PORT")]
    pub port: u16,

    /// File the user → IP snapshot is persisted to.
    #[arg(long, env = "USERIP_PERSIST_PATH")]
    pub persist_path: String,

    /// Maximum number of distinct recent IPs kept per user.
    #[arg(long, env = "USERIP_MAX_IPS_PER_USER")]
    pub max_ips_per_user: u64,

    /// Seconds of inactivity after which a user's data is dropped (0 = never).
    #[arg(long, default_value_t = 0, env = "USERIP_USER_DATA_TTL")]
    pub user_data_ttl: u64,

    /// Seconds between forced snapshot writes.
    #[arg(long, default_value_t = 300, env = "USERIP_PERSIST_INTERVAL")]
    pub persist_interval: u64,

    /// Header carrying the authenticated user, set by the upstream proxy.
    #[arg(long, default_value = "X-Token-User-Email", env = "USERIP_USER_HEADER")]
    pub user_header: String,

    /// Write a human-readable `last_seen_iso` next to every timestamp.
    #[arg(long, env = "USERIP_ANNOTATE_TIMESTAMPS")]
    pub annotate_timestamps: bool,

    /// Log level.
    #[arg(long, default_value = "info", env = "USERIP_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[arg(long, default_value = "text", env = "USERIP_LOG_FORMAT")]
    pub log_format: String,
}

impl Config {
    /// Parses configuration from CLI args and env vars.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Extracts the service-layer subset.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            persist_path: self.persist_path.clone(),
            max_ips_per_user: self.max_ips_per_user,
            user_data_ttl: self.user_data_ttl,
            persist_interval: Duration::from_secs(self.persist_interval),
            annotate_timestamps: self.annotate_timestamps,
        }
    }
}
