//! # Connection Status
//!
//! Stream connection state and the sink that presents it to the user.

use std::fmt;

use tracing::info;

/// State of the stream collector connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    LostConnection,
}

impl ConnectionState {
    /// Short human-readable status line
    pub fn as_status_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::LostConnection => "lost connection, retrying",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_status_str())
    }
}

/// Receiver of connection state changes (e.g. a status notification)
///
/// Called from the transport tasks on every transition; implementations
/// must return promptly.
pub trait StatusSink: Send + Sync {
    fn publish(&self, state: ConnectionState);
}

/// Sink that writes status changes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn publish(&self, state: ConnectionState) {
        info!("Collector status: {}", state);
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that records every published state
    #[derive(Clone, Default)]
    pub struct RecordingStatusSink {
        pub states: Arc<Mutex<Vec<ConnectionState>>>,
    }

    impl RecordingStatusSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_states(&self) -> Vec<ConnectionState> {
            self.states.lock().unwrap().clone()
        }
    }

    impl StatusSink for RecordingStatusSink {
        fn publish(&self, state: ConnectionState) {
            self.states.lock().unwrap().push(state);
        }
    }
}
