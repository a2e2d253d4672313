//! Lightweight Prometheus-compatible metrics using atomic counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::StoreStats;

/// Store-wide counters. All updates are `Relaxed`; the values are
/// diagnostics, not synchronization.
pub struct Metrics {
    sightings_total: AtomicU64,
    new_ips_total: AtomicU64,
    refreshes_total: AtomicU64,
    evictions_total: AtomicU64,
    expired_users_total: AtomicU64,
    flushes_total: AtomicU64,
    flushes_skipped_total: AtomicU64,
    flush_errors_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sightings_total: AtomicU64::new(0),
            new_ips_total: AtomicU64::new(0),
            refreshes_total: AtomicU64::new(0),
            evictions_total: AtomicU64::new(0),
            expired_users_total: AtomicU64::new(0),
            flushes_total: AtomicU64::new(0),
            flushes_skipped_total: AtomicU64::new(0),
            flush_errors_total: AtomicU64::new(0),
        }
    }

    /// Record one sighting; `new_ip` is `false` for a refresh of a known IP.
    pub fn record_sighting(&self, new_ip: bool) {
        self.sightings_total.fetch_add(1, Ordering::Relaxed);
        if new_ip {
            self.new_ips_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.refreshes_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_eviction(&self) {
        self.evictions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, users: usize) {
        self.expired_users_total
            .fetch_add(users as u64, Ordering::Relaxed);
    }

    /// Record the outcome of a flush: written, skipped (clean) or failed.
    pub fn record_flush(&self, outcome: Result<bool, ()>) {
        let counter = match outcome {
            Ok(true) => &self.flushes_total,
            Ok(false) => &self.flushes_skipped_total,
            Err(()) => &self.flush_errors_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flushes_total(&self) -> u64 {
        self.flushes_total.load(Ordering::Relaxed)
    }

    pub fn flush_errors_total(&self) -> u64 {
        self.flush_errors_total.load(Ordering::Relaxed)
    }

    pub fn evictions_total(&self) -> u64 {
        self.evictions_total.load(Ordering::Relaxed)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self, stats: StoreStats, uptime_seconds: u64) -> String {
        let mut out = String::with_capacity(1024);

        // Gauges (live values)
        gauge(
            &mut out,
            "userip_users_tracked",
            "Users with at least one retained IP",
            stats.users,
        );
        gauge(
            &mut out,
            "userip_ips_tracked",
            "Distinct IPs in the reverse index",
            stats.ips,
        );
        gauge(
            &mut out,
            "userip_dirty",
            "1 if in-memory state differs from the last written snapshot",
            u8::from(stats.dirty),
        );
        gauge(
            &mut out,
            "userip_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds,
        );

        let counters = [
            ("userip_sightings_total", "Sightings recorded", &self.sightings_total),
            ("userip_new_ips_total", "Sightings that added a new IP", &self.new_ips_total),
            (
                "userip_refreshes_total",
                "Sightings that refreshed a known IP",
                &self.refreshes_total,
            ),
            ("userip_evictions_total", "IPs evicted by the per-user bound", &self.evictions_total),
            (
                "userip_expired_users_total",
                "Users removed by the TTL sweep",
                &self.expired_users_total,
            ),
            ("userip_flushes_total", "Snapshot writes completed", &self.flushes_total),
            (
                "userip_flushes_skipped_total",
                "Non-forced flushes skipped on a clean store",
                &self.flushes_skipped_total,
            ),
            ("userip_flush_errors_total", "Snapshot writes that failed", &self.flush_errors_total),
        ];
        for (name, help, value) in counters {
            counter(&mut out, name, help, value.load(Ordering::Relaxed));
        }

        out
    }
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} gauge").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} counter").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}
