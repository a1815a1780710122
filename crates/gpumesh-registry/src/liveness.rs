//! Heartbeat liveness.
//!
//! A worker is active while `now - last_heartbeat < heartbeat_timeout`.
//! The check is evaluated on every read and never cached.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::Worker;

/// Age of a heartbeat at `now`. Timestamps in the future count as zero.
pub fn heartbeat_age(now: DateTime<Utc>, last_heartbeat: DateTime<Utc>) -> Duration {
    (now - last_heartbeat).to_std().unwrap_or(Duration::ZERO)
}

pub fn is_alive(now: DateTime<Utc>, last_heartbeat: DateTime<Utc>, timeout: Duration) -> bool {
    heartbeat_age(now, last_heartbeat) < timeout
}

/// Liveness judgment with a fixed, deployment-wide timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    timeout: Duration,
}

impl Liveness {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_active(&self, worker: &Worker, now: DateTime<Utc>) -> bool {
        is_alive(now, worker.last_heartbeat, self.timeout)
    }

    pub fn is_stale(&self, worker: &Worker, now: DateTime<Utc>) -> bool {
        !self.is_active(worker, now)
    }
}
