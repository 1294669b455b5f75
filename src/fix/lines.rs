//! # JSON Lines Fix Source
//!
//! Reads provider readings as one JSON object per line, e.g. piped from a
//! GNSS daemon bridge:
//!
//! ```text
//! {"latitude":40.7128,"longitude":-74.006,"speed":1.2,"provider":"gps","time_ms":1700000000000}
//! {"latitude":40.7129,"longitude":-74.006,"since_boot_ns":86400000000000}
//! ```
//!
//! `since_boot_ns` is read against the host boot clock (see
//! [`SystemClock`](super::clock::SystemClock)). Lines without a time are
//! stamped with the current wall clock.

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adapter::RawFixSender;
use super::types::{FixTime, RawFix};
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct FixLine {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: f64,
    #[serde(default)]
    bearing: f64,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    accuracy: f64,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    time_ms: Option<i64>,
    #[serde(default)]
    since_boot_ns: Option<u64>,
}

/// Parse one JSON line into a raw reading
///
/// # Errors
///
/// Returns `RelayError::Json` if the line is not a valid fix object.
pub fn parse_fix_line(line: &str) -> Result<RawFix> {
    let parsed: FixLine = serde_json::from_str(line)?;

    let time = match (parsed.time_ms, parsed.since_boot_ns) {
        (Some(millis), _) => FixTime::WallClockMillis(millis),
        (None, Some(nanos)) => FixTime::SinceBootNanos(nanos),
        (None, None) => FixTime::WallClockMillis(chrono::Utc::now().timestamp_millis()),
    };

    Ok(RawFix {
        latitude: parsed.latitude,
        longitude: parsed.longitude,
        altitude: parsed.altitude,
        bearing: parsed.bearing,
        speed: parsed.speed,
        accuracy: parsed.accuracy,
        provider: parsed.provider.filter(|p| !p.is_empty()),
        time,
    })
}

/// Publish every parsable line until end of input or `shutdown`
///
/// Returns the number of readings published. Malformed lines are logged
/// and skipped.
pub async fn forward_lines<R>(reader: R, sink: RawFixSender, shutdown: CancellationToken) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("End of fix input after {} readings", published);
                break;
            }
            Err(e) => {
                warn!("Failed to read fix input: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_fix_line(line) {
            Ok(raw) => {
                if sink.send(raw).await.is_err() {
                    debug!("Fix adapter gone, stopping input");
                    break;
                }
                published += 1;
            }
            Err(e) => warn!("Skipping malformed fix line: {}", e),
        }
    }

    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::adapter::raw_fix_channel;

    #[test]
    fn test_parse_full_line() {
        let raw = parse_fix_line(
            r#"{"latitude":40.7128,"longitude":-74.006,"altitude":10.0,"bearing":45.67,"speed":12.34,"accuracy":3.0,"provider":"gps","time_ms":1700000000000}"#,
        )
        .unwrap();

        assert_eq!(raw.latitude, 40.7128);
        assert_eq!(raw.longitude, -74.006);
        assert_eq!(raw.bearing, 45.67);
        assert_eq!(raw.provider.as_deref(), Some("gps"));
        assert_eq!(raw.time, FixTime::WallClockMillis(1_700_000_000_000));
    }

    #[test]
    fn test_parse_boot_relative_line() {
        let raw = parse_fix_line(r#"{"latitude":1.0,"longitude":2.0,"since_boot_ns":5000000000}"#).unwrap();
        assert_eq!(raw.time, FixTime::SinceBootNanos(5_000_000_000));
        assert_eq!(raw.altitude, 0.0, "Missing optional fields default to zero");
        assert!(raw.provider.is_none());
    }

    #[test]
    fn test_parse_rejects_missing_coordinates() {
        assert!(parse_fix_line(r#"{"latitude":1.0}"#).is_err());
        assert!(parse_fix_line("not json").is_err());
    }

    #[tokio::test]
    async fn test_forward_skips_bad_lines() {
        let input = concat!(
            "{\"latitude\":1.0,\"longitude\":2.0,\"time_ms\":1000}\n",
            "garbage\n",
            "\n",
            "{\"latitude\":3.0,\"longitude\":4.0,\"time_ms\":2000}\n",
        );
        let (tx, mut rx) = raw_fix_channel();

        let published = forward_lines(input.as_bytes(), tx, CancellationToken::new()).await;
        assert_eq!(published, 2);

        assert_eq!(rx.recv().await.unwrap().latitude, 1.0);
        assert_eq!(rx.recv().await.unwrap().latitude, 3.0);
        assert!(rx.recv().await.is_none(), "Sender dropped after end of input");
    }

    #[tokio::test]
    async fn test_boot_relative_line_stamped_near_now() {
        use crate::fix::clock::SystemClock;
        use crate::fix::device::StaticDeviceId;
        use crate::fix::FixAdapter;
        use crate::keepalive::{KeepaliveTimer, LastKnownFix};
        use crate::queue::EventQueue;
        use std::sync::Arc;
        use std::time::Duration;

        let clock = Arc::new(SystemClock::new());
        let (producer, mut consumer) = EventQueue::new(4);
        let last_known = LastKnownFix::new();
        let timer = KeepaliveTimer::new(Duration::from_secs(45), last_known.clone(), producer.clone());
        let (tx, rx) = raw_fix_channel();
        let adapter = FixAdapter::new(
            rx,
            clock.clone(),
            Arc::new(StaticDeviceId::new(None)),
            last_known,
            timer.handle(),
            producer,
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(adapter.run(shutdown.clone()));

        // Reading taken 60 s ago on the host boot clock
        let since_boot_ns = clock.since_boot_nanos().saturating_sub(60_000_000_000);
        let input = format!("{{\"latitude\":1.0,\"longitude\":2.0,\"since_boot_ns\":{}}}\n", since_boot_ns);
        assert_eq!(forward_lines(input.as_bytes(), tx, shutdown.clone()).await, 1);

        let fix = consumer.take(&shutdown).await.unwrap();
        let expected = chrono::Utc::now().timestamp() - 60;
        assert!(
            (fix.timestamp() - expected).abs() <= 2,
            "Expected ~{}, got {}",
            expected,
            fix.timestamp()
        );

        handle.await.unwrap();
    }
}
