//! UserIP Service — core business logic for the user-IP tracking server.
//!
//! This crate contains all transport-agnostic logic: the tracking store
//! and its reverse IP index, the snapshot codec, crash-safe persistence,
//! the periodic persister and the lifecycle glue around them.
//!
//! The HTTP transport (`userip-http`) depends on this crate and only calls
//! the public operations on [`ServiceState`] and [`store::TrackingStore`].

pub mod clock;
pub mod codec;
pub mod error;
pub mod metrics;
pub mod persist;
pub mod persister;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use clock::{Clock, SystemClock};
use error::ServiceError;
use metrics::Metrics;
use persister::PeriodicPersister;
use store::TrackingStore;

/// Default interval between forced snapshot writes.
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration subset relevant to the service layer.
///
/// Transport-specific config (bind address, header names, log format)
/// stays in the binary crate's `Config` struct.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Snapshot file path. Required.
    pub persist_path: String,
    /// Bound on the IP history kept per user. Must be positive.
    pub max_ips_per_user: u64,
    /// Seconds of inactivity after which a user is dropped (0 = never).
    pub user_data_ttl: u64,
    /// Interval of the periodic forced write.
    pub persist_interval: Duration,
    /// Add `last_seen_iso` next to each timestamp in the snapshot file.
    pub annotate_timestamps: bool,
}

impl ServiceConfig {
    /// Config with expiry disabled and the default persist interval.
    pub fn new(persist_path: impl Into<String>, max_ips_per_user: u64) -> Self {
        Self {
            persist_path: persist_path.into(),
            max_ips_per_user,
            user_data_ttl: 0,
            persist_interval: DEFAULT_PERSIST_INTERVAL,
            annotate_timestamps: false,
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.persist_path.trim().is_empty() {
            return Err(ServiceError::Configuration(
                "persist_path is required".to_string(),
            ));
        }
        if self.max_ips_per_user == 0 {
            return Err(ServiceError::Configuration(
                "max_ips_per_user must be greater than 0".to_string(),
            ));
        }
        if self.persist_interval.is_zero() {
            return Err(ServiceError::Configuration(
                "persist_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared service state, cloneable across all transport handlers.
///
/// Construct it once at startup and hand clones to every collaborator
/// (tracking middleware, matcher, admin endpoints).
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<Inner>,
}

struct Inner {
    store: TrackingStore,
    persister: Mutex<Option<PeriodicPersister>>,
    persist_interval: Duration,
    start_time: Instant,
}

impl ServiceState {
    /// Creates a new service state backed by the system clock.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a new service state with an explicit clock (for tests).
    pub fn with_clock(config: &ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        let store = TrackingStore::new(config, clock)?;

        tracing::info!(
            persist_path = %config.persist_path,
            max_ips_per_user = config.max_ips_per_user,
            user_data_ttl = config.user_data_ttl,
            "User IP tracking configured"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                persister: Mutex::new(None),
                persist_interval: config.persist_interval,
                start_time: Instant::now(),
            }),
        })
    }

    // --- Accessors ---

    pub fn store(&self) -> &TrackingStore {
        &self.inner.store
    }

    pub fn metrics(&self) -> &Metrics {
        self.inner.store.metrics()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn persister_running(&self) -> bool {
        self.inner.persister.lock().is_some()
    }

    // --- Lifecycle ---

    /// Loads the snapshot file into the store. Any error is fatal to
    /// startup: state integrity cannot be assumed.
    pub fn load_from_disk(&self) -> Result<(), ServiceError> {
        self.inner.store.load_from_disk()
    }

    /// Runs [`TrackingStore::flush`] on the blocking pool.
    pub async fn flush(&self, force: bool) -> Result<bool, ServiceError> {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || store.flush(force))
            .await
            .map_err(|e| ServiceError::Internal(format!("flush task failed: {e}")))?
    }

    /// Starts the periodic persister. Calling it twice is a no-op.
    pub fn start_persister(&self) {
        let mut slot = self.inner.persister.lock();
        if slot.is_some() {
            return;
        }
        *slot = Some(PeriodicPersister::start(
            self.inner.store.clone(),
            self.inner.persist_interval,
        ));
    }

    /// Stops the periodic persister and waits for its loop to exit.
    pub async fn stop_persister(&self) {
        let persister = self.inner.persister.lock().take();
        if let Some(persister) = persister {
            tracing::info!("Shutting down periodic persister");
            persister.stop().await;
        }
    }

    /// Stops background persistence, drains queued opportunistic writes
    /// and performs the final forced write.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.stop_persister().await;
        self.inner.store.drain_writes().await;

        tracing::info!("Performing final persistence on shutdown");
        match self.flush(true).await {
            Ok(_) => {
                tracing::info!("Final persistence on shutdown complete");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    path = %self.inner.store.persist_path().display(),
                    error = %e,
                    "Failed to perform final persistence on shutdown"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn config_in(dir: &tempfile::TempDir) -> ServiceConfig {
        ServiceConfig::new(
            dir.path().join("state.json").to_string_lossy().into_owned(),
            2,
        )
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(ServiceConfig::new("state.json", 1).validate().is_ok());
        assert!(ServiceConfig::new("  ", 1).validate().is_err());
        assert!(ServiceConfig::new("state.json", 0).validate().is_err());

        let mut config = ServiceConfig::new("state.json", 1);
        config.persist_interval = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ServiceError::Configuration(_))
        ));
    }

    #[test]
    fn construction_fails_on_invalid_config() {
        assert!(ServiceState::new(&ServiceConfig::new("", 3)).is_err());
    }

    #[tokio::test]
    async fn start_and_stop_persister() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(&config_in(&dir)).unwrap();

        state.start_persister();
        state.start_persister();
        assert!(state.persister_running());

        state.stop_persister().await;
        assert!(!state.persister_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_writes_final_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let state = ServiceState::with_clock(&config, Arc::new(ManualClock::new(42))).unwrap();
        state.start_persister();

        state.store().record("alice@example.com", "10.1.1.1");
        state.shutdown().await.unwrap();
        assert!(!state.persister_running());
        assert!(!state.store().is_dirty());

        let reloaded = ServiceState::new(&config).unwrap();
        reloaded.load_from_disk().unwrap();
        assert_eq!(
            reloaded.store().sightings_for_user("alice@example.com"),
            Some(vec![types::Sighting::new("10.1.1.1", 42)])
        );
    }

    #[tokio::test]
    async fn shutdown_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::new(
            dir.path().join("gone").join("state.json").to_string_lossy().into_owned(),
            2,
        );
        let state = ServiceState::new(&config).unwrap();

        let err = state.shutdown().await.unwrap_err();
        assert!(matches!(err, ServiceError::Io { .. }));
    }
}
