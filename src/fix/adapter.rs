//! # Fix Source Adapter
//!
//! Turns raw provider readings into [`LocationFix`] values and hands them to
//! the event queue.
//!
//! The provider publishes on a typed channel; the adapter subscribes once
//! at construction. For every reading it:
//! - reconciles the timestamp to Unix seconds
//! - resolves the device identifier (placeholder on permission failure)
//! - records the fix as last known for the keepalive timer
//! - enqueues it, waiting while the queue is full
//! - restarts the keepalive countdown

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::clock::{reconcile_timestamp, Clock};
use super::device::{resolve_device_id, DeviceIdProvider};
use super::types::{LocationFix, RawFix};
use crate::keepalive::{KeepaliveHandle, LastKnownFix};
use crate::pipeline::stats::PipelineStats;
use crate::queue::FixProducer;

/// Buffer between the provider callback and the adapter
pub const RAW_FIX_CHANNEL_CAPACITY: usize = 64;

/// Publishing end handed to the location provider
pub type RawFixSender = mpsc::Sender<RawFix>;

/// Create the provider-to-adapter channel
pub fn raw_fix_channel() -> (RawFixSender, mpsc::Receiver<RawFix>) {
    mpsc::channel(RAW_FIX_CHANNEL_CAPACITY)
}

/// Converts provider readings and feeds the queue
pub struct FixAdapter {
    source: mpsc::Receiver<RawFix>,
    clock: Arc<dyn Clock>,
    device: Arc<dyn DeviceIdProvider>,
    last_known: LastKnownFix,
    keepalive: KeepaliveHandle,
    producer: FixProducer,
    stats: Arc<PipelineStats>,
}

impl FixAdapter {
    pub fn new(
        source: mpsc::Receiver<RawFix>,
        clock: Arc<dyn Clock>,
        device: Arc<dyn DeviceIdProvider>,
        last_known: LastKnownFix,
        keepalive: KeepaliveHandle,
        producer: FixProducer,
    ) -> Self {
        Self {
            source,
            clock,
            device,
            last_known,
            keepalive,
            producer,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Seed the last known fix from the provider's cached reading
    ///
    /// The seeded fix is not enqueued; it only gives the keepalive timer
    /// something to re-submit before the first live fix arrives.
    pub fn with_initial_fix(self, raw: RawFix) -> Self {
        let fix = self.convert(&raw);
        debug!("Seeded last known fix from provider cache");
        self.last_known.set(fix);
        self
    }

    /// Build the upload value for one reading
    pub fn convert(&self, raw: &RawFix) -> LocationFix {
        let timestamp = reconcile_timestamp(self.clock.as_ref(), raw.time);
        let device_id = resolve_device_id(self.device.as_ref());
        LocationFix::from_raw(raw, timestamp, device_id)
    }

    /// Run until the provider closes its channel or `shutdown` fires
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let raw = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                raw = self.source.recv() => raw,
            };

            let Some(raw) = raw else {
                info!("Fix source closed");
                break;
            };

            let fix = self.convert(&raw);
            debug!("Fix from provider '{}' at {}", fix.provider(), fix.timestamp());
            self.last_known.set(fix.clone());

            if self.producer.put_until(fix, &shutdown).await.is_err() {
                break;
            }
            self.stats.record_enqueued();
            self.keepalive.restart();
        }

        debug!("Fix adapter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::clock::mocks::FixedClock;
    use crate::fix::device::StaticDeviceId;
    use crate::fix::types::fixtures::raw_fix;
    use crate::fix::types::{FixTime, DEVICE_ID_PLACEHOLDER};
    use crate::keepalive::KeepaliveTimer;
    use crate::queue::EventQueue;
    use std::time::Duration;

    fn build(
        device: Option<&str>,
    ) -> (FixAdapter, RawFixSender, crate::queue::FixConsumer, LastKnownFix) {
        let (producer, consumer) = EventQueue::new(8);
        let last_known = LastKnownFix::new();
        let timer = KeepaliveTimer::new(Duration::from_secs(45), last_known.clone(), producer.clone());
        let (tx, rx) = raw_fix_channel();
        let adapter = FixAdapter::new(
            rx,
            Arc::new(FixedClock::new(1_700_003_600_000, 3_600_000)),
            Arc::new(StaticDeviceId::new(device.map(str::to_string))),
            last_known.clone(),
            timer.handle(),
            producer,
        );
        (adapter, tx, consumer, last_known)
    }

    #[test]
    fn test_convert_without_identifier_uses_placeholder() {
        let (adapter, _tx, _consumer, _last_known) = build(None);
        let raw = RawFix {
            latitude: 37.4219999,
            longitude: -122.0840575,
            altitude: 30.2,
            bearing: 0.0,
            speed: 0.0,
            accuracy: 5.0,
            provider: Some("gps".to_string()),
            time: FixTime::WallClockMillis(1_700_000_000_000),
        };

        let fix = adapter.convert(&raw);
        assert_eq!(fix.device_id(), DEVICE_ID_PLACEHOLDER);
        assert_eq!(fix.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_convert_boot_relative_time() {
        let (adapter, _tx, _consumer, _last_known) = build(Some("imei-7"));
        let mut raw = raw_fix(1.0, 2.0);
        // Clock booted at 1_700_000_000_000 ms; fix 12.5 s after boot
        raw.time = FixTime::SinceBootNanos(12_500_000_000);

        let fix = adapter.convert(&raw);
        assert_eq!(fix.timestamp(), 1_700_000_012);
        assert_eq!(fix.device_id(), "imei-7");
    }

    #[tokio::test]
    async fn test_fixes_forwarded_in_order_and_remembered() {
        let (adapter, tx, mut consumer, last_known) = build(Some("imei-7"));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(adapter.run(shutdown.clone()));

        tx.send(raw_fix(1.0, 0.0)).await.unwrap();
        tx.send(raw_fix(2.0, 0.0)).await.unwrap();

        assert_eq!(consumer.take(&shutdown).await.unwrap().latitude(), 1.0);
        assert_eq!(consumer.take(&shutdown).await.unwrap().latitude(), 2.0);
        assert_eq!(last_known.get().unwrap().latitude(), 2.0);

        // Closing the provider channel ends the adapter
        drop(tx);
        handle.await.unwrap();
    }

    #[test]
    fn test_initial_fix_seeds_last_known_only() {
        let (adapter, _tx, _consumer, last_known) = build(None);
        let _adapter = adapter.with_initial_fix(raw_fix(5.0, 6.0));

        assert_eq!(last_known.get().unwrap().latitude(), 5.0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_adapter() {
        let (adapter, _tx, _consumer, _last_known) = build(None);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(adapter.run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
