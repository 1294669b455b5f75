//! # Stream Transport
//!
//! Writes binary fix records to a persistent TCP connection.
//!
//! The connection lives in a [`ConnectionSlot`]. Only the reconnector
//! installs a connection; the transmitter writes through the slot's lock, so
//! a write can never race a close or a replacement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconnect::{Connector, LinkState, Reconnector, StreamWriter, TcpConnector};
use super::status::{ConnectionState, StatusSink};
use super::{RequeueMode, Transport};
use crate::codec::binary::encode_record;
use crate::config::StreamConfig;
use crate::error::{RelayError, Result};
use crate::fix::LocationFix;

/// Holder of the current collector connection
pub struct ConnectionSlot {
    writer: tokio::sync::Mutex<Option<Box<dyn StreamWriter>>>,
    generation: AtomicU64,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self {
            writer: tokio::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace the connection, closing any previous one
    pub async fn install(&self, writer: Box<dyn StreamWriter>) {
        let mut slot = self.writer.lock().await;
        if let Some(mut old) = slot.replace(writer) {
            if let Err(e) = old.shutdown().await {
                debug!("Error closing replaced connection: {}", e);
            }
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Close and remove the connection
    pub async fn close(&self) {
        let old = self.writer.lock().await.take();
        if let Some(mut old) = old {
            if let Err(e) = old.shutdown().await {
                debug!("Error closing connection: {}", e);
            }
        }
    }

    /// Write one record on the current connection
    ///
    /// # Errors
    ///
    /// Returns `RelayError::NotConnected` if no connection is installed, or
    /// the write error.
    pub async fn write(&self, record: &[u8]) -> Result<()> {
        let mut slot = self.writer.lock().await;
        match slot.as_mut() {
            Some(writer) => writer.write_record(record).await.map_err(RelayError::Io),
            None => Err(RelayError::NotConnected),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Number of connections installed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary-record transport over a reconnecting stream
pub struct StreamTransport {
    reconnector: Arc<Reconnector>,
    slot: Arc<ConnectionSlot>,
    link: Arc<LinkState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    pub fn new(connector: Arc<dyn Connector>, status: Arc<dyn StatusSink>, retry_delay: Duration) -> Self {
        let slot = Arc::new(ConnectionSlot::new());
        let link = Arc::new(LinkState::new(status));
        let reconnector = Reconnector::new(connector, Arc::clone(&slot), Arc::clone(&link), retry_delay);

        Self {
            reconnector: Arc::new(reconnector),
            slot,
            link,
            task: Mutex::new(None),
        }
    }

    pub fn from_config(config: &StreamConfig, status: Arc<dyn StatusSink>) -> Self {
        Self::new(
            Arc::new(TcpConnector::from_config(config)),
            status,
            config.retry_delay(),
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.link.get()
    }

    /// Whether a reconnect sequence is running
    pub fn is_reconnecting(&self) -> bool {
        self.reconnector.is_running()
    }

    /// Start a reconnect sequence unless one is already running
    ///
    /// Nothing is started after shutdown or after a fatal address error.
    /// Returns whether a sequence was started.
    fn spawn_reconnector(&self, shutdown: &CancellationToken) -> bool {
        if shutdown.is_cancelled() {
            return false;
        }

        if !self.reconnector.try_begin() {
            debug!("Reconnect already in progress or target is unusable");
            return false;
        }

        let reconnector = Arc::clone(&self.reconnector);
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            reconnector.run(&token).await;
        });

        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        true
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn requeue_mode(&self) -> RequeueMode {
        RequeueMode::NonBlocking
    }

    async fn open(&self, shutdown: &CancellationToken) {
        self.spawn_reconnector(shutdown);
    }

    fn encode(&self, fix: &LocationFix) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(&encode_record(fix)))
    }

    async fn send(&self, payload: Bytes) -> Result<()> {
        if self.link.get() != ConnectionState::Connected {
            return Err(RelayError::NotConnected);
        }
        self.slot.write(&payload).await
    }

    async fn recover(&self, error: &RelayError, shutdown: &CancellationToken) {
        // A failed write means the connection is dead. NotConnected means it
        // is already gone or being replaced, and must not be touched.
        if !matches!(error, RelayError::NotConnected) {
            warn!("Lost connection to collector: {}", error);
            self.link.set(ConnectionState::LostConnection);
            self.slot.close().await;
        }

        // Re-check on every state change; the running sequence may end
        // between the claim and the wait.
        let mut changes = self.link.subscribe();
        loop {
            if self.link.get() == ConnectionState::Connected {
                debug!("Collector connection restored");
                return;
            }

            self.spawn_reconnector(shutdown);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn close(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Reconnect task ended abnormally: {}", e);
            }
        }

        self.slot.close().await;
        self.link.set(ConnectionState::Disconnected);
        info!("Stream transport closed");
    }
}
