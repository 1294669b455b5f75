//! # Stream Reconnector
//!
//! Establishes the stream collector connection and keeps retrying until it
//! succeeds or the pipeline shuts down.
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//! Connected -> LostConnection -> Connecting   (write failure)
//! Connecting -> Connecting                    (transient failure, after retry delay)
//! Connecting -> Disconnected                  (malformed address, no retry)
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::status::{ConnectionState, StatusSink};
use super::stream::ConnectionSlot;
use crate::config::StreamConfig;
use crate::error::{RelayError, Result};

/// Default delay between connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Write half of an open collector connection
#[async_trait]
pub trait StreamWriter: Send {
    /// Write one complete record
    async fn write_record(&mut self, record: &[u8]) -> io::Result<()>;

    /// Close the connection
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Opens collector connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Target description for logs
    fn target(&self) -> String;

    /// Open a new connection
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidAddress` for a malformed target (fatal);
    /// any other error is transient.
    async fn connect(&self) -> Result<Box<dyn StreamWriter>>;
}

/// TCP connector for the stream collector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            write_timeout,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.port,
            config.connect_timeout(),
            config.write_timeout(),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.host.chars().any(char::is_whitespace) {
            return Err(RelayError::InvalidAddress(format!("malformed host '{}'", self.host)));
        }

        if self.port == 0 {
            return Err(RelayError::InvalidAddress("port 0 is not connectable".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> Result<Box<dyn StreamWriter>> {
        self.validate()?;

        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| RelayError::Timeout("connect"))??;

        stream.set_nodelay(true)?;

        Ok(Box::new(TcpWriter {
            stream,
            write_timeout: self.write_timeout,
        }))
    }
}

/// Open TCP connection to the collector
struct TcpWriter {
    stream: TcpStream,
    write_timeout: Duration,
}

#[async_trait]
impl StreamWriter for TcpWriter {
    async fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let write = async {
            self.stream.write_all(record).await?;
            self.stream.flush().await
        };

        tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "record write timed out"))?
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// Connection state shared by the transport, the reconnector and observers
///
/// Every transition is forwarded to the status sink.
pub struct LinkState {
    tx: watch::Sender<ConnectionState>,
    sink: Arc<dyn StatusSink>,
}

impl LinkState {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, sink }
    }

    pub fn set(&self, state: ConnectionState) {
        self.tx.send_replace(state);
        self.sink.publish(state);
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

/// How a reconnect sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Connected,
    /// Target is malformed; no further attempts
    Fatal,
    Cancelled,
}

/// Runs connect attempts until one succeeds
///
/// At most one sequence runs at a time: callers claim it with
/// [`try_begin`](Self::try_begin) before spawning [`run`](Self::run).
pub struct Reconnector {
    connector: Arc<dyn Connector>,
    slot: Arc<ConnectionSlot>,
    link: Arc<LinkState>,
    retry_delay: Duration,
    in_flight: AtomicBool,
    fatal: AtomicBool,
}

impl Reconnector {
    pub fn new(
        connector: Arc<dyn Connector>,
        slot: Arc<ConnectionSlot>,
        link: Arc<LinkState>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            connector,
            slot,
            link,
            retry_delay,
            in_flight: AtomicBool::new(false),
            fatal: AtomicBool::new(false),
        }
    }

    /// Claim the next reconnect sequence
    ///
    /// Returns `false` if a sequence is already running or an earlier one
    /// hit a malformed address.
    pub fn try_begin(&self) -> bool {
        if self.fatal.load(Ordering::SeqCst) {
            return false;
        }
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether a sequence is running
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the target was found malformed
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    /// Run one reconnect sequence
    ///
    /// On success the new connection is installed in the slot before the
    /// state becomes `Connected`. The sequence is released before its final
    /// state is published, so anyone woken by that state can claim the next
    /// one.
    pub async fn run(&self, shutdown: &CancellationToken) -> ReconnectOutcome {
        let outcome = self.connect_until_done(shutdown).await;

        if outcome == ReconnectOutcome::Fatal {
            self.fatal.store(true, Ordering::SeqCst);
        }
        self.in_flight.store(false, Ordering::SeqCst);

        match outcome {
            ReconnectOutcome::Connected => self.link.set(ConnectionState::Connected),
            ReconnectOutcome::Fatal => self.link.set(ConnectionState::Disconnected),
            ReconnectOutcome::Cancelled => {}
        }
        outcome
    }

    async fn connect_until_done(&self, shutdown: &CancellationToken) -> ReconnectOutcome {
        let target = self.connector.target();
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return ReconnectOutcome::Cancelled;
            }

            attempt += 1;
            self.link.set(ConnectionState::Connecting);
            debug!("Connecting to collector at {} (attempt {})", target, attempt);

            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return ReconnectOutcome::Cancelled,
                result = self.connector.connect() => result,
            };

            match result {
                Ok(writer) => {
                    self.slot.install(writer).await;
                    info!("Connected to collector at {} after {} attempt(s)", target, attempt);
                    return ReconnectOutcome::Connected;
                }
                Err(e) if e.is_fatal() => {
                    error!("Cannot connect to collector at {}: {}. Not retrying", target, e);
                    return ReconnectOutcome::Fatal;
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to {}: {}. Retrying in {}s",
                        target,
                        e,
                        self.retry_delay.as_secs_f32()
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return ReconnectOutcome::Cancelled,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Writer that records records and fails on demand
    #[derive(Clone)]
    pub struct MockStreamWriter {
        pub written_data: Arc<Mutex<Vec<Vec<u8>>>>,
        pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub closed: Arc<AtomicBool>,
    }

    impl MockStreamWriter {
        pub fn new() -> Self {
            Self {
                written_data: Arc::new(Mutex::new(Vec::new())),
                write_error: Arc::new(Mutex::new(None)),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written_data.lock().unwrap().clone()
        }

        pub fn set_write_error(&self, error: Option<io::ErrorKind>) {
            *self.write_error.lock().unwrap() = error;
        }
    }

    #[async_trait]
    impl StreamWriter for MockStreamWriter {
        async fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
            if let Some(error) = *self.write_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock write error"));
            }
            self.written_data.lock().unwrap().push(record.to_vec());
            Ok(())
        }

        async fn shutdown(&mut self) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Planned result of one connect attempt
    pub enum Attempt {
        Refused,
        Malformed,
        Accept(MockStreamWriter),
    }

    /// Connector that plays back a script of attempts
    ///
    /// Once the script runs out every attempt is refused.
    #[derive(Clone)]
    pub struct MockConnector {
        pub script: Arc<Mutex<VecDeque<Attempt>>>,
        pub attempts: Arc<Mutex<Vec<Instant>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl MockConnector {
        pub fn new(script: Vec<Attempt>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                attempts: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn push(&self, attempt: Attempt) {
            self.script.lock().unwrap().push_back(attempt);
        }

        pub fn get_attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn target(&self) -> String {
            "mock:9000".to_string()
        }

        async fn connect(&self) -> Result<Box<dyn StreamWriter>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.attempts.lock().unwrap().push(Instant::now());

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Attempt::Accept(writer)) => Ok(Box::new(writer)),
                Some(Attempt::Malformed) => Err(RelayError::InvalidAddress("mock".to_string())),
                Some(Attempt::Refused) | None => {
                    Err(RelayError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)))
                }
            }
        }
    }
}
