//! # Collector Transports
//!
//! Sends encoded fixes to the remote collector.
//!
//! This module handles:
//! - HTTP POST of JSON reports, with bounded backoff after failures
//! - Binary records over a persistent TCP stream
//! - Reconnecting the stream with a fixed retry delay
//! - Publishing connection state to a status sink

pub mod http;
pub mod reconnect;
pub mod status;
pub mod stream;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, TransportKind};
use crate::error::{RelayError, Result};
use crate::fix::LocationFix;

pub use http::HttpTransport;
pub use reconnect::{Connector, Reconnector, StreamWriter, TcpConnector};
pub use status::{ConnectionState, LogStatusSink, StatusSink};
pub use stream::StreamTransport;

/// How the transmitter puts a failed fix back into the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueMode {
    /// Wait for a free slot
    Blocking,
    /// Drop the fix if the queue is full
    NonBlocking,
}

/// One way of delivering fixes to the collector
///
/// The transmitter calls `encode` then `send` for every fix. After a failed
/// send it requeues the fix according to `requeue_mode` and awaits
/// `recover` before taking the next one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn requeue_mode(&self) -> RequeueMode;

    /// Prepare the transport when the pipeline starts
    async fn open(&self, _shutdown: &CancellationToken) {}

    /// Encode a fix into this transport's wire format
    fn encode(&self, fix: &LocationFix) -> Result<Bytes>;

    /// Deliver one encoded fix
    async fn send(&self, payload: Bytes) -> Result<()>;

    /// Called after a failed send, once the fix has been requeued
    async fn recover(&self, error: &RelayError, shutdown: &CancellationToken);

    /// Release connections after every worker has stopped
    async fn close(&self) {}
}

/// Build the transport selected in the configuration
///
/// # Errors
///
/// Returns error if the HTTP client cannot be constructed.
pub fn build_transport(config: &Config, status: Arc<dyn StatusSink>) -> Result<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match config.transport.kind {
        TransportKind::Http => Arc::new(HttpTransport::from_config(&config.http)?),
        TransportKind::Stream => Arc::new(StreamTransport::from_config(&config.stream, status)),
    };
    Ok(transport)
}
