//! # Fix Relay Library
//!
//! Forward location fixes from a location provider to a remote collector.
//!
//! Fixes flow through a bounded queue to a single transmitter, which uploads
//! them as JSON over HTTP or as 15-byte binary records over a reconnecting
//! TCP stream. A keepalive timer re-submits the last known fix while the
//! provider is quiet.

pub mod codec;
pub mod config;
pub mod error;
pub mod fix;
pub mod keepalive;
pub mod pipeline;
pub mod queue;
pub mod transport;
