//! # JSON Fix Report
//!
//! Body POSTed to the HTTP collector.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fix::LocationFix;

/// One fix as the HTTP collector expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix seconds
    pub gps_time: i64,
    pub provider: String,
    pub accuracy: f64,
    pub speed: f64,
    pub altitude: f64,
    pub bearing: f64,
    /// Device identifier or the placeholder
    pub imei: String,
}

impl From<&LocationFix> for LocationReport {
    fn from(fix: &LocationFix) -> Self {
        Self {
            latitude: fix.latitude(),
            longitude: fix.longitude(),
            gps_time: fix.timestamp(),
            provider: fix.provider().to_string(),
            accuracy: fix.accuracy(),
            speed: fix.speed(),
            altitude: fix.altitude(),
            bearing: fix.bearing(),
            imei: fix.device_id().to_string(),
        }
    }
}

/// Serialize a fix into a request body
///
/// # Errors
///
/// Returns `RelayError::Json` if serialization fails.
pub fn encode_report(fix: &LocationFix) -> Result<Bytes> {
    let body = serde_json::to_vec(&LocationReport::from(fix))?;
    Ok(Bytes::from(body))
}
