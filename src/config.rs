//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event queue configuration
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

/// Keepalive timer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct KeepaliveConfig {
    #[serde(default = "default_keepalive_period_secs")]
    pub period_secs: u64,
}

/// Device identifier configuration
///
/// A missing `id` behaves like a platform that refuses access to the
/// identifier: the fallback is tried, then the placeholder is sent.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub fallback_id: Option<String>,
}

/// Which transport carries fixes to the collector
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Stream,
}

/// Transport selection
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,
}

/// HTTP collector configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_url")]
    pub url: String,

    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

/// Stream collector configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_host")]
    pub host: String,

    #[serde(default = "default_stream_port")]
    pub port: u16,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stderr only
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_queue_capacity() -> usize { 512 }

fn default_keepalive_period_secs() -> u64 { 45 }

fn default_transport_kind() -> TransportKind { TransportKind::Http }

fn default_http_url() -> String { "http://127.0.0.1:3000/phone_location".to_string() }
fn default_http_timeout_ms() -> u64 { 10000 }
fn default_backoff_initial_ms() -> u64 { 1000 }
fn default_backoff_max_ms() -> u64 { 60000 }

fn default_stream_host() -> String { "127.0.0.1".to_string() }
fn default_stream_port() -> u16 { 9000 }
fn default_retry_delay_ms() -> u64 { 10000 }
fn default_connect_timeout_ms() -> u64 { 10000 }
fn default_write_timeout_ms() -> u64 { 5000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: default_queue_capacity() }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self { period_secs: default_keepalive_period_secs() }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { kind: default_transport_kind() }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: default_http_url(),
            timeout_ms: default_http_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: default_stream_host(),
            port: default_stream_port(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            keepalive: KeepaliveConfig::default(),
            device: DeviceConfig::default(),
            transport: TransportConfig::default(),
            http: HttpConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl KeepaliveConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StreamConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> RelayError {
    RelayError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fix_relay::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == 0 || self.queue.capacity > 65536 {
            return Err(invalid("queue capacity must be between 1 and 65536"));
        }

        if self.keepalive.period_secs == 0 || self.keepalive.period_secs > 3600 {
            return Err(invalid("keepalive period_secs must be between 1 and 3600"));
        }

        match self.transport.kind {
            TransportKind::Http => self.validate_http()?,
            TransportKind::Stream => self.validate_stream()?,
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(format!("unknown log level '{}'", self.logging.level)));
        }

        Ok(())
    }

    fn validate_http(&self) -> Result<()> {
        let url = &self.http.url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("http url must start with http:// or https://"));
        }

        if self.http.timeout_ms == 0 || self.http.timeout_ms > 120000 {
            return Err(invalid("http timeout_ms must be between 1 and 120000"));
        }

        if self.http.backoff_initial_ms == 0 {
            return Err(invalid("backoff_initial_ms must be greater than 0"));
        }

        if self.http.backoff_max_ms < self.http.backoff_initial_ms {
            return Err(invalid("backoff_max_ms must not be less than backoff_initial_ms"));
        }

        Ok(())
    }

    // Host and port format are checked by the connector: a malformed address
    // aborts the reconnect attempt instead of refusing to start.
    fn validate_stream(&self) -> Result<()> {
        if self.stream.retry_delay_ms == 0 || self.stream.retry_delay_ms > 600000 {
            return Err(invalid("retry_delay_ms must be between 1 and 600000"));
        }

        if self.stream.connect_timeout_ms == 0 || self.stream.connect_timeout_ms > 120000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 120000"));
        }

        if self.stream.write_timeout_ms == 0 || self.stream.write_timeout_ms > 120000 {
            return Err(invalid("write_timeout_ms must be between 1 and 120000"));
        }

        Ok(())
    }
}
