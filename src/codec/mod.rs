//! # Fix Codecs
//!
//! Wire formats for the two collector transports.
//!
//! This module handles:
//! - JSON report bodies for the HTTP collector
//! - Fixed-width 15-byte records for the stream collector

pub mod binary;
pub mod json;

pub use binary::{decode_record, encode_record, DecodedRecord, Record, RECORD_SIZE};
pub use json::{encode_report, LocationReport};
