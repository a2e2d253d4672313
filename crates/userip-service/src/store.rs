//! In-memory user → IP tracking store.
//!
//! Holds, per user, a bounded most-recently-used list of IP sightings and a
//! reverse index from IP to the users that currently retain it. Both maps
//! and the dirty flag live behind one `RwLock`: mutations and flushes take
//! it exclusively, lookups share it.
//!
//! Every mutation marks the store dirty and queues a non-forced flush on
//! the blocking pool. At most one such write is queued at a time; the
//! caller never waits on disk I/O.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio_util::task::TaskTracker;

use crate::ServiceConfig;
use crate::clock::Clock;
use crate::codec;
use crate::error::ServiceError;
use crate::metrics::Metrics;
use crate::persist;
use crate::types::{Sighting, Snapshot, StoreStats, UserRecord};

/// Thread-safe tracking store. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct TrackingStore {
    inner: Arc<Shared>,
}

struct Shared {
    state: RwLock<StoreState>,
    max_ips_per_user: usize,
    /// Seconds of inactivity before a user is dropped; 0 disables expiry.
    user_data_ttl: i64,
    persist_path: PathBuf,
    annotate_timestamps: bool,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    /// Set while an opportunistic write is queued but not yet started.
    write_pending: AtomicBool,
    writes: TaskTracker,
}

#[derive(Default)]
struct StoreState {
    users: HashMap<String, UserRecord>,
    ip_index: HashMap<String, HashSet<String>>,
    dirty: bool,
}

impl StoreState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            users: self
                .users
                .iter()
                .map(|(user, record)| (user.clone(), record.clone()))
                .collect(),
        }
    }
}

/// Removes `user` from the bucket for `ip`, dropping the bucket once empty.
fn unindex(ip_index: &mut HashMap<String, HashSet<String>>, ip: &str, user: &str) {
    if let Some(users) = ip_index.get_mut(ip) {
        users.remove(user);
        if users.is_empty() {
            ip_index.remove(ip);
            tracing::debug!(ip, "Removed IP from global tracking (no remaining users)");
        }
    }
}

impl TrackingStore {
    /// Creates an empty store. Fails if the configuration is invalid.
    pub fn new(config: &ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Shared {
                state: RwLock::new(StoreState::default()),
                max_ips_per_user: usize::try_from(config.max_ips_per_user).unwrap_or(usize::MAX),
                user_data_ttl: i64::try_from(config.user_data_ttl).unwrap_or(i64::MAX),
                persist_path: PathBuf::from(&config.persist_path),
                annotate_timestamps: config.annotate_timestamps,
                clock,
                metrics: Metrics::new(),
                write_pending: AtomicBool::new(false),
                writes: TaskTracker::new(),
            }),
        })
    }

    pub fn persist_path(&self) -> &Path {
        &self.inner.persist_path
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    // --- Mutation ---

    /// Records that `user` was seen at `ip`.
    ///
    /// Returns `true` if the IP was new for this user, `false` if it was
    /// already known (its timestamp is refreshed and it moves to the front).
    pub fn record(&self, user: &str, ip: &str) -> bool {
        let now = self.inner.clock.now_unix();
        let max = self.inner.max_ips_per_user;

        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        let record = state.users.entry(user.to_owned()).or_insert_with(|| {
            tracing::info!(user, ip, "Created new user entry");
            UserRecord::default()
        });

        if let Some(index) = record.position(ip) {
            let mut sighting = record.sightings.remove(index);
            sighting.last_seen = now;
            record.sightings.insert(0, sighting);
            if index > 0 {
                tracing::debug!(user, ip, from = index, "Moved existing IP to front (MRU)");
            }

            state.dirty = true;
            self.inner.metrics.record_sighting(false);
            self.schedule_write();
            return false;
        }

        record.sightings.insert(0, Sighting::new(ip, now));
        if record.sightings.len() > max {
            for evicted in record.sightings.drain(max..) {
                tracing::info!(
                    user,
                    evicted_ip = %evicted.ip,
                    evicted_ip_last_seen = evicted.last_seen,
                    new_ip = ip,
                    "Evicting oldest IP for user"
                );
                unindex(&mut state.ip_index, &evicted.ip, user);
                self.inner.metrics.record_eviction();
            }
        }

        state
            .ip_index
            .entry(ip.to_owned())
            .or_default()
            .insert(user.to_owned());

        state.dirty = true;
        tracing::info!(user, ip, "Added new IP for user");
        self.inner.metrics.record_sighting(true);
        self.schedule_write();

        if self.inner.user_data_ttl > 0 {
            self.sweep_expired(state, now);
        }

        true
    }

    /// Drops every user whose newest sighting is older than `now - ttl`.
    /// Returns the number of users removed.
    fn sweep_expired(&self, state: &mut StoreState, now: i64) -> usize {
        let threshold = now.saturating_sub(self.inner.user_data_ttl);

        let expired: Vec<String> = state
            .users
            .iter()
            .filter(|(_, record)| record.most_recent() < threshold)
            .map(|(user, _)| user.clone())
            .collect();

        for user in &expired {
            if let Some(record) = state.users.remove(user) {
                tracing::info!(
                    user = %user,
                    most_recent_activity = record.most_recent(),
                    ip_count = record.len(),
                    "User data expired, removing user"
                );
                for sighting in &record.sightings {
                    unindex(&mut state.ip_index, &sighting.ip, user);
                }
            }
        }

        if !expired.is_empty() {
            state.dirty = true;
            self.inner.metrics.record_expired(expired.len());
            self.schedule_write();
        }
        expired.len()
    }

    /// Queues a non-forced flush unless one is already queued.
    ///
    /// Outside a tokio runtime, or once shutdown has closed the write
    /// tracker, nothing is queued and the dirty flag stays set for the next
    /// forced flush.
    fn schedule_write(&self) {
        if self.inner.write_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.inner.writes.is_closed() => handle,
            _ => {
                self.inner.write_pending.store(false, Ordering::Release);
                tracing::trace!("Opportunistic write not scheduled, left to the next forced flush");
                return;
            }
        };

        let store = self.clone();
        self.inner.writes.spawn_blocking_on(
            move || {
                store.inner.write_pending.store(false, Ordering::Release);
                match store.flush(false) {
                    Ok(_) => tracing::debug!("Successfully wrote data immediately"),
                    Err(e) => tracing::error!(error = %e, "Failed to write data immediately"),
                }
            },
            &handle,
        );
    }

    /// Stops queuing opportunistic writes and waits for queued ones to end.
    pub(crate) async fn drain_writes(&self) {
        self.inner.writes.close();
        self.inner.writes.wait().await;
    }

    // --- Lookups ---

    /// Returns `true` if any tracked user currently retains `ip`.
    pub fn has_ip(&self, ip: &str) -> bool {
        self.inner.state.read().ip_index.contains_key(ip)
    }

    /// Users currently retaining `ip`, sorted.
    pub fn users_for_ip(&self, ip: &str) -> BTreeSet<String> {
        self.inner
            .state
            .read()
            .ip_index
            .get(ip)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// IPs of `user`, most recently used first. Empty for an unknown user.
    pub fn ips_for_user(&self, user: &str) -> Vec<String> {
        self.inner
            .state
            .read()
            .users
            .get(user)
            .map(UserRecord::ips)
            .unwrap_or_default()
    }

    /// Full history of `user` with timestamps, or `None` if unknown.
    pub fn sightings_for_user(&self, user: &str) -> Option<Vec<Sighting>> {
        self.inner
            .state
            .read()
            .users
            .get(user)
            .map(|record| record.sightings.clone())
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.read().dirty
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.inner.state.read();
        StoreStats {
            users: state.users.len(),
            ips: state.ip_index.len(),
            dirty: state.dirty,
        }
    }

    /// Copy of the durable subset of the store.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.read().snapshot()
    }

    // --- Persistence ---

    /// Writes the snapshot file.
    ///
    /// Without `force`, a clean store is left alone and `Ok(false)` is
    /// returned. The exclusive lock is held across encode, write and
    /// rename. The dirty flag is cleared only after the rename succeeds.
    pub fn flush(&self, force: bool) -> Result<bool, ServiceError> {
        let mut state = self.inner.state.write();
        if !state.dirty && !force {
            self.inner.metrics.record_flush(Ok(false));
            return Ok(false);
        }

        let path = &self.inner.persist_path;
        let result = codec::encode(&state.snapshot(), self.inner.annotate_timestamps)
            .and_then(|bytes| persist::write_atomic(path, &bytes));

        match result {
            Ok(()) => {
                state.dirty = false;
                self.inner.metrics.record_flush(Ok(true));
                tracing::debug!(path = %path.display(), force, "Dirty flag cleared after persisting to disk");
                Ok(true)
            }
            Err(e) => {
                self.inner.metrics.record_flush(Err(()));
                Err(e)
            }
        }
    }

    /// Replaces the in-memory state with the snapshot file, if it exists.
    ///
    /// Legacy-format files are migrated, histories that break the
    /// configured bound are trimmed and users without any IP are dropped;
    /// each leaves the store dirty so the next flush rewrites the file.
    pub fn load_from_disk(&self) -> Result<(), ServiceError> {
        let path = &self.inner.persist_path;
        let mut state = self.inner.state.write();

        let Some(decoded) = persist::read_snapshot(path)? else {
            tracing::debug!(path = %path.display(), "Persistence file does not exist");
            return Ok(());
        };

        if decoded.migrated {
            tracing::info!(path = %path.display(), "Detected old data format, performing migration");
        }

        let max = self.inner.max_ips_per_user;
        let mut normalized = false;
        let users: HashMap<String, UserRecord> = decoded
            .snapshot
            .users
            .into_iter()
            .filter_map(|(user, mut record)| {
                if record.normalize(max) {
                    tracing::warn!(user = %user, max_ips_per_user = max, "Trimmed stored IP history");
                    normalized = true;
                }
                if record.is_empty() {
                    tracing::warn!(user = %user, "Dropped stored user without IPs");
                    normalized = true;
                    return None;
                }
                Some((user, record))
            })
            .collect();

        let mut ip_index: HashMap<String, HashSet<String>> = HashMap::new();
        for (user, record) in &users {
            for sighting in &record.sightings {
                ip_index
                    .entry(sighting.ip.clone())
                    .or_default()
                    .insert(user.clone());
            }
        }

        tracing::info!(
            path = %path.display(),
            user_count = users.len(),
            migrated = decoded.migrated,
            "Loaded data from disk"
        );

        state.users = users;
        state.ip_index = ip_index;
        state.dirty = decoded.migrated || normalized;
        Ok(())
    }
}
