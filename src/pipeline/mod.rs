//! # Pipeline
//!
//! Wires the fix adapter, keepalive timer and transmitter around one event
//! queue and owns their tasks.
//!
//! This module handles:
//! - Building the queue and the last known fix slot
//! - Starting every worker under one cancellation token
//! - Ordered shutdown: stop the workers, then release the transport
//! - Running counters shared by the workers

pub mod consumer;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::fix::clock::{Clock, SystemClock};
use crate::fix::device::{self, DeviceIdProvider, StaticDeviceId};
use crate::fix::{FixAdapter, RawFix};
use crate::keepalive::{KeepaliveTimer, LastKnownFix, DEFAULT_KEEPALIVE_PERIOD};
use crate::queue::{EventQueue, FixProducer, DEFAULT_QUEUE_CAPACITY};
use crate::transport::Transport;

pub use consumer::{Transmitter, LOG_INTERVAL_FIXES};
pub use stats::{PipelineStats, StatsSnapshot};

/// Settings for a [`Pipeline`] before it starts
pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    source: mpsc::Receiver<RawFix>,
    queue_capacity: usize,
    keepalive_period: Duration,
    device: Arc<dyn DeviceIdProvider>,
    clock: Arc<dyn Clock>,
    initial_fix: Option<RawFix>,
}

impl PipelineBuilder {
    /// Queue capacity in fixes; zero is raised to one
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        if capacity == 0 {
            warn!("Queue capacity 0 is unusable, using 1");
        }
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn keepalive_period(mut self, period: Duration) -> Self {
        self.keepalive_period = period;
        self
    }

    pub fn device(mut self, device: Arc<dyn DeviceIdProvider>) -> Self {
        self.device = device;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Provider's cached reading, used as the last known fix until a live one arrives
    pub fn initial_fix(mut self, raw: RawFix) -> Self {
        self.initial_fix = Some(raw);
        self
    }

    /// Apply queue, keepalive and device settings from configuration
    pub fn with_config(self, config: &Config) -> Self {
        self.queue_capacity(config.queue.capacity)
            .keepalive_period(config.keepalive.period())
            .device(Arc::new(device::from_config(&config.device)))
    }

    /// Start every worker
    ///
    /// The transport is opened before the transmitter takes its first fix.
    pub async fn start(self) -> Pipeline {
        let shutdown = CancellationToken::new();
        let stats = Arc::new(PipelineStats::default());
        let (producer, consumer) = EventQueue::new(self.queue_capacity);
        let last_known = LastKnownFix::new();

        self.transport.open(&shutdown).await;

        let timer = KeepaliveTimer::new(self.keepalive_period, last_known.clone(), producer.clone())
            .with_stats(Arc::clone(&stats));

        let mut adapter = FixAdapter::new(
            self.source,
            self.clock,
            self.device,
            last_known,
            timer.handle(),
            producer.clone(),
        )
        .with_stats(Arc::clone(&stats));
        if let Some(raw) = self.initial_fix {
            adapter = adapter.with_initial_fix(raw);
        }

        let transmitter = Transmitter::new(consumer, producer.clone(), Arc::clone(&self.transport))
            .with_stats(Arc::clone(&stats));

        let workers = vec![
            tokio::spawn(adapter.run(shutdown.clone())),
            tokio::spawn(timer.run(shutdown.clone())),
            tokio::spawn(transmitter.run(shutdown.clone())),
        ];

        info!(
            "Pipeline started ({} transport, queue capacity {}, keepalive {}s)",
            self.transport.name(),
            self.queue_capacity,
            self.keepalive_period.as_secs()
        );

        Pipeline {
            shutdown,
            workers,
            transport: self.transport,
            stats,
            producer,
        }
    }
}

/// Running relay
pub struct Pipeline {
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    transport: Arc<dyn Transport>,
    stats: Arc<PipelineStats>,
    producer: FixProducer,
}

impl Pipeline {
    /// Builder with default capacity, keepalive period, system clock and
    /// no device identifier
    pub fn builder(transport: Arc<dyn Transport>, source: mpsc::Receiver<RawFix>) -> PipelineBuilder {
        PipelineBuilder {
            transport,
            source,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keepalive_period: DEFAULT_KEEPALIVE_PERIOD,
            device: Arc::new(StaticDeviceId::new(None)),
            clock: Arc::new(SystemClock::new()),
            initial_fix: None,
        }
    }

    /// Token that stops every worker when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of fixes waiting for the transmitter
    pub fn queue_len(&self) -> usize {
        self.producer.len()
    }

    /// Stop every worker, then close the transport
    ///
    /// Fixes still queued are discarded. Worker panics are logged, not
    /// propagated.
    pub async fn shutdown(self) -> StatsSnapshot {
        info!("Stopping pipeline ({} fixes queued)", self.producer.len());
        self.shutdown.cancel();

        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Pipeline worker failed: {}", e);
            }
        }

        self.transport.close().await;

        let snapshot = self.stats.snapshot();
        info!(
            "Pipeline stopped (sent {}, failed {}, dropped {}, keepalives {})",
            snapshot.sent, snapshot.failed, snapshot.dropped, snapshot.keepalives
        );
        snapshot
    }
}
