//! Periodic eviction of stale workers.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::registry::Registry;

/// Background loop that sweeps the registry on a fixed interval.
pub struct Sweeper {
    registry: Registry,
    interval: Duration,
}

impl Sweeper {
    pub fn new(registry: Registry, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Sweep until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            heartbeat_timeout_secs = self.registry.heartbeat_timeout().as_secs_f64(),
            "registry sweeper started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let evicted = self.registry.sweep().await;
                    debug!(evicted = evicted.len(), "sweep pass complete");
                }
                _ = shutdown.changed() => {
                    info!("registry sweeper shutting down");
                    break;
                }
            }
        }
    }
}
