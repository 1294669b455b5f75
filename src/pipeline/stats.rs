//! Pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals updated by the pipeline tasks
#[derive(Debug, Default)]
pub struct PipelineStats {
    enqueued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    keepalives: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Fixes enqueued by the adapter
    pub enqueued: u64,
    /// Fixes accepted by the collector
    pub sent: u64,
    /// Send attempts that failed
    pub failed: u64,
    /// Fixes discarded (encode failure or full queue on retry)
    pub dropped: u64,
    /// Keepalive re-submissions
    pub keepalives: u64,
}

impl StatsSnapshot {
    /// Fixes enqueued (live or keepalive) that were neither sent nor dropped
    pub fn pending(&self) -> u64 {
        (self.enqueued + self.keepalives).saturating_sub(self.sent + self.dropped)
    }
}

impl PipelineStats {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new total
    pub fn record_sent(&self) -> u64 {
        self.sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keepalive(&self) {
        self.keepalives.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            keepalives: self.keepalives.load(Ordering::Relaxed),
        }
    }
}
