//! Background task that force-flushes the store on a fixed interval.
//!
//! Opportunistic writes already follow every mutation, but they can be
//! coalesced or fail. The periodic forced write is the checkpoint that
//! guarantees timestamp refreshes eventually reach disk.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::store::TrackingStore;

/// Handle to a running periodic persister.
pub struct PeriodicPersister {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicPersister {
    /// Spawns the persister on the current runtime. The first write happens
    /// one `interval` after start.
    pub fn start(store: TrackingStore, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(store, interval, cancel.clone()));
        Self { cancel, handle }
    }

    /// Signals the loop to stop and waits until it has exited. A write that
    /// is already in progress completes first.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Periodic persister task failed");
        }
    }
}

async fn run(store: TrackingStore, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(?interval, "Periodic persister started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Stop signal received, periodic persister exiting");
                break;
            }
            _ = ticker.tick() => {
                tracing::debug!("Periodic persistence triggered");
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.flush(true)).await {
                    Ok(Ok(_)) => tracing::debug!("Periodic persistence complete"),
                    Ok(Err(e)) => tracing::error!(
                        error = %e,
                        "Failed during periodic persistence"
                    ),
                    Err(e) => tracing::error!(error = %e, "Periodic persistence task failed"),
                }
            }
        }
    }

    tracing::info!("Periodic persister stopped");
}
