//! # Transmitter
//!
//! The single consumer of the event queue. Takes one fix at a time, encodes
//! it for the active transport and sends it. A fix that fails to send goes
//! back into the queue before the transport gets a chance to recover.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stats::PipelineStats;
use crate::error::RelayError;
use crate::fix::LocationFix;
use crate::queue::{FixConsumer, FixProducer};
use crate::transport::{RequeueMode, Transport};

/// Number of delivered fixes between status log messages
pub const LOG_INTERVAL_FIXES: u64 = 100;

/// Consumer loop feeding the transport
pub struct Transmitter {
    consumer: FixConsumer,
    producer: FixProducer,
    transport: Arc<dyn Transport>,
    stats: Arc<PipelineStats>,
}

impl Transmitter {
    /// `producer` is the transmitter's own handle for requeueing failed fixes
    pub fn new(consumer: FixConsumer, producer: FixProducer, transport: Arc<dyn Transport>) -> Self {
        Self {
            consumer,
            producer,
            transport,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Run until `shutdown` fires
    ///
    /// # Control Flow
    ///
    /// 1. `take` the next fix (returns on shutdown)
    /// 2. Encode it; a fix that cannot be encoded is dropped
    /// 3. Send it; on failure requeue per the transport's mode, then
    ///    await `recover`
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Transmitter started ({} transport)", self.transport.name());
        let mut last_log_count: u64 = 0;

        while let Some(fix) = self.consumer.take(&shutdown).await {
            let payload = match self.transport.encode(&fix) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Dropping fix that could not be encoded: {}", e);
                    self.stats.record_dropped();
                    continue;
                }
            };

            match self.transport.send(payload).await {
                Ok(()) => {
                    let sent = self.stats.record_sent();
                    if sent - last_log_count >= LOG_INTERVAL_FIXES {
                        info!("Delivered {} fixes ({} queued)", sent, self.producer.len());
                        last_log_count = sent;
                    }
                }
                Err(e) => {
                    debug!("Failed to send fix: {}", e);
                    self.stats.record_failed();
                    self.requeue(fix, &shutdown).await;
                    self.transport.recover(&e, &shutdown).await;
                }
            }
        }

        info!("Transmitter stopped ({} fixes delivered)", self.stats.snapshot().sent);
    }

    async fn requeue(&self, fix: LocationFix, shutdown: &CancellationToken) {
        match self.transport.requeue_mode() {
            RequeueMode::Blocking => {
                if let Err(e) = self.producer.put_until(fix, shutdown).await {
                    debug!("Failed fix not requeued: {}", e);
                }
            }
            RequeueMode::NonBlocking => match self.producer.offer(fix) {
                Ok(()) => {}
                Err(RelayError::QueueFull) => {
                    warn!("Queue full, failed fix dropped");
                    self.stats.record_dropped();
                }
                Err(e) => debug!("Failed fix not requeued: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::types::fixtures::fix;
    use crate::queue::EventQueue;
    use crate::transport::mocks::MockTransport;
    use std::time::Duration;

    async fn wait_for_attempts(transport: &MockTransport, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.get_attempts().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transport did not see enough attempts");
    }

    fn spawn(
        transport: &MockTransport,
        capacity: usize,
    ) -> (FixProducer, Arc<PipelineStats>, CancellationToken, tokio::task::JoinHandle<()>) {
        let (producer, consumer) = EventQueue::new(capacity);
        let stats = Arc::new(PipelineStats::default());
        let shutdown = CancellationToken::new();
        let transmitter = Transmitter::new(consumer, producer.clone(), Arc::new(transport.clone()))
            .with_stats(Arc::clone(&stats));
        let handle = tokio::spawn(transmitter.run(shutdown.clone()));
        (producer, stats, shutdown, handle)
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let transport = MockTransport::new(RequeueMode::Blocking, vec![]);
        let (producer, stats, shutdown, handle) = spawn(&transport, 8);

        for i in 1..=3 {
            producer.put(fix(i as f64, 0.0)).await.unwrap();
        }
        wait_for_attempts(&transport, 3).await;

        assert_eq!(transport.get_delivered(), vec![1.0, 2.0, 3.0]);
        assert_eq!(stats.snapshot().sent, 3);
        assert_eq!(transport.recovery_count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_fix_requeued_and_retried() {
        let transport = MockTransport::new(RequeueMode::Blocking, vec![false]);
        let (producer, stats, shutdown, handle) = spawn(&transport, 8);

        producer.put(fix(7.0, 0.0)).await.unwrap();
        wait_for_attempts(&transport, 2).await;

        assert_eq!(transport.get_attempts(), vec![7.0, 7.0], "Same fix must be attempted again");
        assert_eq!(transport.get_delivered(), vec![7.0]);
        assert_eq!(transport.recovery_count(), 1, "Recover runs once per failure");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.sent, 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_requeued_fix_goes_to_the_tail() {
        let transport = MockTransport::new(RequeueMode::NonBlocking, vec![false]);
        let (producer, consumer) = EventQueue::new(8);
        producer.put(fix(1.0, 0.0)).await.unwrap();
        producer.put(fix(2.0, 0.0)).await.unwrap();

        let shutdown = CancellationToken::new();
        let transmitter = Transmitter::new(consumer, producer.clone(), Arc::new(transport.clone()));
        let handle = tokio::spawn(transmitter.run(shutdown.clone()));

        wait_for_attempts(&transport, 3).await;
        assert_eq!(transport.get_attempts(), vec![1.0, 2.0, 1.0]);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_blocking_requeue_drops_when_full() {
        let transport = MockTransport::new(RequeueMode::NonBlocking, vec![]);
        let (producer, mut queued) = EventQueue::new(1);
        let (_unused, consumer) = EventQueue::new(1);
        let stats = Arc::new(PipelineStats::default());
        let transmitter = Transmitter::new(consumer, producer.clone(), Arc::new(transport))
            .with_stats(Arc::clone(&stats));
        let shutdown = CancellationToken::new();

        producer.offer(fix(2.0, 0.0)).unwrap();
        tokio::time::timeout(Duration::from_secs(1), transmitter.requeue(fix(1.0, 0.0), &shutdown))
            .await
            .expect("non-blocking requeue must not wait");

        assert_eq!(stats.snapshot().dropped, 1);
        assert_eq!(queued.take(&shutdown).await.unwrap().latitude(), 2.0);
        assert!(producer.is_empty(), "Failed fix must not be queued");
    }

    #[tokio::test]
    async fn test_blocking_requeue_gives_up_on_shutdown() {
        let transport = MockTransport::new(RequeueMode::Blocking, vec![]);
        let (producer, _queued) = EventQueue::new(1);
        let (_unused, consumer) = EventQueue::new(1);
        let transmitter = Transmitter::new(consumer, producer.clone(), Arc::new(transport));
        let shutdown = CancellationToken::new();

        producer.offer(fix(2.0, 0.0)).unwrap();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), transmitter.requeue(fix(1.0, 0.0), &shutdown))
            .await
            .expect("blocked requeue must end on shutdown");
    }

    #[tokio::test]
    async fn test_encode_failure_drops_fix() {
        let transport = MockTransport::new(RequeueMode::Blocking, vec![]);
        let (producer, stats, shutdown, handle) = spawn(&transport, 8);

        producer.put(fix(f64::NAN, 0.0)).await.unwrap();
        producer.put(fix(3.0, 0.0)).await.unwrap();
        wait_for_attempts(&transport, 1).await;

        assert_eq!(transport.get_attempts(), vec![3.0], "Unencodable fix never reaches send");
        assert_eq!(stats.snapshot().dropped, 1);
        assert_eq!(transport.recovery_count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_fix() {
        let transport = MockTransport::new(RequeueMode::Blocking, vec![]);
        let (_producer, _stats, shutdown, handle) = spawn(&transport, 8);

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(transport.get_attempts().is_empty());
    }

    #[test]
    fn test_log_interval_constant() {
        assert_eq!(LOG_INTERVAL_FIXES, 100);
    }
}
