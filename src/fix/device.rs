//! # Device Identifier
//!
//! The collector keys fixes by device. Platforms may refuse access to the
//! hardware identifier; the relay then falls back to a secondary identifier
//! and finally to a fixed placeholder, and keeps forwarding fixes.

use tracing::debug;

use super::types::DEVICE_ID_PLACEHOLDER;
use crate::config::DeviceConfig;
use crate::error::{RelayError, Result};

/// Provider of the device identifier
#[cfg_attr(test, mockall::automock)]
pub trait DeviceIdProvider: Send + Sync {
    /// Read the identifier
    ///
    /// # Errors
    ///
    /// Returns `RelayError::PermissionDenied` when the identifier is not
    /// accessible.
    fn device_id(&self) -> Result<String>;
}

/// Identifier taken from configuration
#[derive(Debug, Clone)]
pub struct StaticDeviceId {
    id: Option<String>,
}

impl StaticDeviceId {
    pub fn new(id: Option<String>) -> Self {
        Self { id }
    }
}

impl DeviceIdProvider for StaticDeviceId {
    fn device_id(&self) -> Result<String> {
        match &self.id {
            Some(id) if !id.trim().is_empty() => Ok(id.clone()),
            _ => Err(RelayError::PermissionDenied("device identifier not available".to_string())),
        }
    }
}

/// Tries a primary provider, then a secondary one
pub struct FallbackDeviceId<P, S> {
    primary: P,
    secondary: S,
}

impl<P: DeviceIdProvider, S: DeviceIdProvider> FallbackDeviceId<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: DeviceIdProvider, S: DeviceIdProvider> DeviceIdProvider for FallbackDeviceId<P, S> {
    fn device_id(&self) -> Result<String> {
        match self.primary.device_id() {
            Ok(id) => Ok(id),
            Err(e) => {
                debug!("Primary device identifier unavailable ({}), trying fallback", e);
                self.secondary.device_id()
            }
        }
    }
}

/// Configured identifier with the configured fallback behind it
pub fn from_config(config: &DeviceConfig) -> FallbackDeviceId<StaticDeviceId, StaticDeviceId> {
    FallbackDeviceId::new(
        StaticDeviceId::new(config.id.clone()),
        StaticDeviceId::new(config.fallback_id.clone()),
    )
}

/// Read the identifier, substituting the placeholder on any failure
pub fn resolve_device_id(provider: &dyn DeviceIdProvider) -> String {
    match provider.device_id() {
        Ok(id) => id,
        Err(e) => {
            debug!("Device identifier unavailable ({}), sending placeholder", e);
            DEVICE_ID_PLACEHOLDER.to_string()
        }
    }
}
