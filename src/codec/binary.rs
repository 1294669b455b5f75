//! # Binary Fix Record
//!
//! Fixed-width 15-byte record written to the stream collector. There is no
//! sync byte, length prefix or checksum; records are written back to back.
//!
//! ```text
//! Byte  0-2 : bearing    excess, int, frac(x100)
//! Byte  3-7 : latitude   excess, int, frac(x100), frac(x10^4), frac(x10^6)
//! Byte 8-12 : longitude  excess, int, frac(x100), frac(x10^4), frac(x10^6)
//! Byte 13-14: speed      int, frac(x100)
//! ```
//!
//! Integer parts of bearing and coordinates are "excess-split": the signed
//! byte holds the truncated value clamped to -128..=127 and the preceding
//! byte holds whatever did not fit. One excess step covers roughly
//! -256..=254; anything beyond saturates. Fraction bytes are
//! `trunc(value * scale) mod 100` and keep the sign of the value.
//! All bytes are two's complement.

use tracing::warn;

use crate::error::{RelayError, Result};
use crate::fix::LocationFix;

/// Size of one record in bytes
pub const RECORD_SIZE: usize = 15;

/// Offset of the bearing field
pub const BEARING_OFFSET: usize = 0;

/// Offset of the latitude field
pub const LATITUDE_OFFSET: usize = 3;

/// Offset of the longitude field
pub const LONGITUDE_OFFSET: usize = 8;

/// Offset of the speed field
pub const SPEED_OFFSET: usize = 13;

/// Encoded record
pub type Record = [u8; RECORD_SIZE];

/// Field values recovered from a record, at the precision the record keeps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedRecord {
    pub bearing: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
}

/// Encode a fix into a stream record
///
/// # Examples
///
/// ```ignore
/// let record = encode_record(&fix);
/// assert_eq!(record.len(), 15);
/// ```
pub fn encode_record(fix: &LocationFix) -> Record {
    let mut record = [0u8; RECORD_SIZE];

    let [excess, whole] = split_integer(fix.bearing(), "bearing");
    record[BEARING_OFFSET] = excess;
    record[BEARING_OFFSET + 1] = whole;
    record[BEARING_OFFSET + 2] = fraction_digits(fix.bearing(), 100.0);

    encode_coordinate(&mut record[LATITUDE_OFFSET..LATITUDE_OFFSET + 5], fix.latitude(), "latitude");
    encode_coordinate(&mut record[LONGITUDE_OFFSET..LONGITUDE_OFFSET + 5], fix.longitude(), "longitude");

    // Speed carries no excess byte; the integer part wraps like a byte cast
    record[SPEED_OFFSET] = fix.speed().trunc() as i64 as u8;
    record[SPEED_OFFSET + 1] = fraction_digits(fix.speed(), 100.0);

    record
}

/// Decode a stream record
///
/// # Errors
///
/// Returns error if fewer than [`RECORD_SIZE`] bytes are given.
pub fn decode_record(bytes: &[u8]) -> Result<DecodedRecord> {
    if bytes.len() < RECORD_SIZE {
        return Err(RelayError::Codec(format!(
            "Record too short: expected {} bytes, got {}",
            RECORD_SIZE,
            bytes.len()
        )));
    }

    let bearing = join_integer(bytes[BEARING_OFFSET], bytes[BEARING_OFFSET + 1]) as f64
        + signed(bytes[BEARING_OFFSET + 2]) / 100.0;

    Ok(DecodedRecord {
        bearing,
        latitude: decode_coordinate(&bytes[LATITUDE_OFFSET..LATITUDE_OFFSET + 5]),
        longitude: decode_coordinate(&bytes[LONGITUDE_OFFSET..LONGITUDE_OFFSET + 5]),
        speed: signed(bytes[SPEED_OFFSET]) + signed(bytes[SPEED_OFFSET + 1]) / 100.0,
    })
}

fn encode_coordinate(out: &mut [u8], value: f64, field: &'static str) {
    let [excess, whole] = split_integer(value, field);
    out[0] = excess;
    out[1] = whole;
    out[2] = fraction_digits(value, 100.0);
    out[3] = fraction_digits(value, 10_000.0);
    out[4] = fraction_digits(value, 1_000_000.0);
}

fn decode_coordinate(bytes: &[u8]) -> f64 {
    join_integer(bytes[0], bytes[1]) as f64
        + signed(bytes[2]) / 100.0
        + signed(bytes[3]) / 10_000.0
        + signed(bytes[4]) / 1_000_000.0
}

/// Split the truncated integer part into `[excess, signed byte]`
fn split_integer(value: f64, field: &'static str) -> [u8; 2] {
    let whole = value.trunc() as i64;
    let max = i8::MAX as i64;
    let min = i8::MIN as i64;

    let (excess, base) = if whole > max {
        (whole - max, i8::MAX)
    } else if whole < min {
        (whole - min, i8::MIN)
    } else {
        (0, whole as i8)
    };

    let saturated = excess.clamp(min, max);
    if saturated != excess {
        warn!(
            "{} integer part {} exceeds one excess step, record saturates at {}",
            field,
            whole,
            base as i64 + saturated
        );
    }

    [saturated as i8 as u8, base as u8]
}

fn join_integer(excess: u8, base: u8) -> i64 {
    excess as i8 as i64 + base as i8 as i64
}

/// Two decimal digits of `value` at `scale`, sign preserved
fn fraction_digits(value: f64, scale: f64) -> u8 {
    (((value * scale).trunc() as i64) % 100) as i8 as u8
}

fn signed(byte: u8) -> f64 {
    byte as i8 as f64
}
