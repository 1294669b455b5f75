//! # Fix Acquisition Module
//!
//! Everything between the external location provider and the event queue.
//!
//! This module handles:
//! - The fix value type and the raw provider reading
//! - Reconciling boot-relative fix times to wall-clock seconds
//! - Device identifier lookup with placeholder substitution
//! - The adapter task that feeds the queue
//! - A JSON lines reader used by the binary as its provider

pub mod adapter;
pub mod clock;
pub mod device;
pub mod lines;
pub mod types;

pub use adapter::{raw_fix_channel, FixAdapter, RawFixSender};
pub use types::{FixTime, LocationFix, RawFix, DEVICE_ID_PLACEHOLDER};
