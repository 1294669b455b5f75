//! # Bounded Event Queue
//!
//! Fixed-capacity FIFO between the fix producers (adapter, keepalive timer,
//! retry path) and the single transmitter.
//!
//! This module handles:
//! - Blocking enqueue (`put`) for producers that accept backpressure
//! - Non-blocking enqueue (`offer`) for the consumer's own retry path
//! - Cancellable blocking dequeue (`take`) for the one consumer

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, Result};
use crate::fix::LocationFix;

/// Default queue capacity in fixes
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Constructor for the producer/consumer pair
pub struct EventQueue;

impl EventQueue {
    /// Create a queue holding at most `capacity` fixes
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; configuration validation rejects that.
    pub fn new(capacity: usize) -> (FixProducer, FixConsumer) {
        let (tx, rx) = mpsc::channel(capacity);
        (FixProducer { tx }, FixConsumer { rx })
    }
}

/// Enqueue side; clone one per producer
#[derive(Debug, Clone)]
pub struct FixProducer {
    tx: mpsc::Sender<LocationFix>,
}

impl FixProducer {
    /// Enqueue, waiting for a free slot while the queue is full
    ///
    /// # Errors
    ///
    /// Returns `RelayError::QueueClosed` if the consumer is gone.
    pub async fn put(&self, fix: LocationFix) -> Result<()> {
        self.tx.send(fix).await.map_err(|_| RelayError::QueueClosed)
    }

    /// Like [`put`](Self::put) but gives up when `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns `RelayError::QueueClosed` on shutdown or if the consumer is gone.
    pub async fn put_until(&self, fix: LocationFix, shutdown: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(RelayError::QueueClosed),
            result = self.put(fix) => result,
        }
    }

    /// Enqueue without waiting
    ///
    /// # Errors
    ///
    /// Returns `RelayError::QueueFull` if no slot is free (the fix is
    /// dropped) or `RelayError::QueueClosed` if the consumer is gone.
    pub fn offer(&self, fix: LocationFix) -> Result<()> {
        self.tx.try_send(fix).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::QueueFull,
            TrySendError::Closed(_) => RelayError::QueueClosed,
        })
    }

    /// Number of fixes currently queued
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Dequeue side, owned by the transmitter
#[derive(Debug)]
pub struct FixConsumer {
    rx: mpsc::Receiver<LocationFix>,
}

impl FixConsumer {
    /// Wait for the next fix
    ///
    /// Returns `None` once `shutdown` fires or every producer is gone.
    /// Shutdown wins over queued fixes; those are dropped with the queue.
    pub async fn take(&mut self, shutdown: &CancellationToken) -> Option<LocationFix> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            fix = self.rx.recv() => fix,
        }
    }
}
