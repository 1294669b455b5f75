//! # Keepalive Timer
//!
//! Re-submits the last known fix when the provider goes quiet so the
//! collector keeps hearing from the device during signal gaps.
//!
//! Every new fix restarts the countdown. When the countdown elapses the last
//! known fix (if any) is enqueued again and the countdown starts over, so a
//! stalled provider yields one re-submission per period.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::fix::LocationFix;
use crate::pipeline::stats::PipelineStats;
use crate::queue::FixProducer;

/// Default keepalive period
pub const DEFAULT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(45);

/// Most recent fix seen by the adapter, shared with the keepalive timer
#[derive(Debug, Clone, Default)]
pub struct LastKnownFix {
    inner: Arc<RwLock<Option<LocationFix>>>,
}

impl LastKnownFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fix: LocationFix) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(fix);
    }

    pub fn get(&self) -> Option<LocationFix> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Restarts a running [`KeepaliveTimer`]
#[derive(Debug, Clone)]
pub struct KeepaliveHandle {
    restart: Arc<Notify>,
}

impl KeepaliveHandle {
    /// Cancel the pending elapse and start a fresh period
    pub fn restart(&self) {
        self.restart.notify_one();
    }
}

/// Recurring countdown that re-enqueues the last known fix
pub struct KeepaliveTimer {
    period: Duration,
    last_known: LastKnownFix,
    producer: FixProducer,
    restart: Arc<Notify>,
    stats: Arc<PipelineStats>,
}

impl KeepaliveTimer {
    pub fn new(period: Duration, last_known: LastKnownFix, producer: FixProducer) -> Self {
        Self {
            period,
            last_known,
            producer,
            restart: Arc::new(Notify::new()),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Count re-submissions into shared pipeline statistics
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn handle(&self) -> KeepaliveHandle {
        KeepaliveHandle { restart: Arc::clone(&self.restart) }
    }

    /// Run until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        debug!("Keepalive timer started ({}s period)", self.period.as_secs());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.restart.notified() => {
                    debug!("Keepalive countdown restarted");
                }
                _ = tokio::time::sleep(self.period) => {
                    match self.last_known.get() {
                        Some(fix) => {
                            info!("Last known fix re-submitted by keepalive");
                            if self.producer.put_until(fix, &shutdown).await.is_err() {
                                break;
                            }
                            self.stats.record_keepalive();
                        }
                        None => debug!("No last known fix, nothing re-submitted"),
                    }
                }
            }
        }

        debug!("Keepalive timer stopped");
    }
}
