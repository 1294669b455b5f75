//! # Fix Types
//!
//! The location fix as produced by the provider and as forwarded to the
//! collector.

use serde::{Deserialize, Serialize};

/// Identifier sent when the device identifier cannot be read
pub const DEVICE_ID_PLACEHOLDER: &str = "1234567890";

/// When a raw fix was taken, as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixTime {
    /// Milliseconds since the Unix epoch
    WallClockMillis(i64),

    /// Nanoseconds on the monotonic clock since boot
    SinceBootNanos(u64),
}

/// A fix as delivered by the external location provider
#[derive(Debug, Clone, PartialEq)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub bearing: f64,
    pub speed: f64,
    pub accuracy: f64,
    pub provider: Option<String>,
    pub time: FixTime,
}

/// One geolocation sample ready for upload
///
/// Built once by the fix adapter and never mutated afterwards; the queue
/// and transports only move or clone it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    bearing: f64,
    speed: f64,
    accuracy: f64,
    provider: String,
    timestamp: i64,
    device_id: String,
}

impl LocationFix {
    /// Build a fix from a raw provider reading
    ///
    /// # Arguments
    ///
    /// * `raw` - Provider reading
    /// * `timestamp` - Reconciled wall-clock time in whole seconds
    /// * `device_id` - Device identifier or the placeholder
    pub fn from_raw(raw: &RawFix, timestamp: i64, device_id: String) -> Self {
        Self {
            latitude: raw.latitude,
            longitude: raw.longitude,
            altitude: raw.altitude,
            bearing: raw.bearing,
            speed: raw.speed,
            accuracy: raw.accuracy,
            provider: raw.provider.clone().unwrap_or_default(),
            timestamp,
            device_id,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Seconds since the Unix epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_copies_reading() {
        let raw = fixtures::raw_fix(40.7128, -74.0060);
        let fix = LocationFix::from_raw(&raw, 1_700_000_000, "dev-1".to_string());

        assert_eq!(fix.latitude(), 40.7128);
        assert_eq!(fix.longitude(), -74.0060);
        assert_eq!(fix.altitude(), 30.2);
        assert_eq!(fix.bearing(), 45.67);
        assert_eq!(fix.speed(), 12.34);
        assert_eq!(fix.accuracy(), 5.0);
        assert_eq!(fix.provider(), "gps");
        assert_eq!(fix.timestamp(), 1_700_000_000);
        assert_eq!(fix.device_id(), "dev-1");
    }

    #[test]
    fn test_missing_provider_is_empty() {
        let mut raw = fixtures::raw_fix(1.0, 2.0);
        raw.provider = None;
        let fix = LocationFix::from_raw(&raw, 0, DEVICE_ID_PLACEHOLDER.to_string());
        assert_eq!(fix.provider(), "", "Unknown provider should be an empty string");
    }

    #[test]
    fn test_out_of_range_bearing_not_clamped() {
        let mut raw = fixtures::raw_fix(1.0, 2.0);
        raw.bearing = 400.0;
        raw.speed = -1.0;
        let fix = LocationFix::from_raw(&raw, 0, DEVICE_ID_PLACEHOLDER.to_string());
        assert_eq!(fix.bearing(), 400.0);
        assert_eq!(fix.speed(), -1.0);
    }
}
