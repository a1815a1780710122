//! Dispatch counters.
//!
//! Lock-free: every counter is an `AtomicU64` bumped with relaxed
//! ordering. Values are cumulative since startup.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DispatchStats {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    no_worker: AtomicU64,
    selection_timeouts: AtomicU64,
    forward_timeouts: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub no_worker: u64,
    pub selection_timeouts: u64,
    pub forward_timeouts: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_no_worker(&self) {
        self.no_worker.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_selection_timeout(&self) {
        self.selection_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forward_timeout(&self) {
        self.forward_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            no_worker: self.no_worker.load(Ordering::Relaxed),
            selection_timeouts: self.selection_timeouts.load(Ordering::Relaxed),
            forward_timeouts: self.forward_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = DispatchStats::new();
        stats.record_request();
        stats.record_request();
        stats.record_retry();
        stats.record_success();
        stats.record_failure();
        stats.record_no_worker();

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.no_worker, 1);
        assert_eq!(snap.selection_timeouts, 0);
        assert_eq!(snap.forward_timeouts, 0);
    }
}
