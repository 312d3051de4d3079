//! Platform configuration and controller setup.
//!
//! The host application supplies one [`PlatformConfig`] per physical device;
//! [`setup`] turns it into switch controllers sharing a single status cache.

use crate::cache::StatusCache;
use crate::controller::SwitchController;
use crate::error::{Result, SwitchError};
use crate::handle::{ADDR_UNRESOLVED, DeviceHandle};
use crate::scanner::Scanner;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL_ID: &str = "1";

fn default_channel_id() -> String {
    DEFAULT_CHANNEL_ID.to_string()
}

/// One extra switch exposed from a multi-outlet device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(default = "default_channel_id")]
    pub id: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
}

/// Configuration for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Name of the switch bound to the top-level `id`; no such switch if unset.
    #[serde(default)]
    pub name: Option<String>,
    /// Device address; absent or "0.0.0.0" means discover it.
    #[serde(default)]
    pub host: Option<String>,
    pub device_id: String,
    pub local_key: String,
    #[serde(default = "default_channel_id")]
    pub id: String,
    /// Additional switches keyed by slug.
    #[serde(default)]
    pub switches: BTreeMap<String, SwitchConfig>,
}

impl PlatformConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(SwitchError::InvalidConfig("device_id is required".into()));
        }
        if self.local_key.is_empty() {
            return Err(SwitchError::InvalidConfig("local_key is required".into()));
        }
        if self.id.is_empty() {
            return Err(SwitchError::InvalidConfig("id must not be empty".into()));
        }
        for (slug, switch) in &self.switches {
            if !is_slug(slug) {
                return Err(SwitchError::InvalidConfig(format!(
                    "invalid switch key '{}'",
                    slug
                )));
            }
            if switch.id.is_empty() {
                return Err(SwitchError::InvalidConfig(format!(
                    "switch '{}' has an empty id",
                    slug
                )));
            }
        }
        Ok(())
    }

    /// Whether the device address has to be discovered.
    pub fn needs_discovery(&self) -> bool {
        match self.host.as_deref().map(str::trim) {
            None | Some("") | Some(ADDR_UNRESOLVED) => true,
            Some(_) => false,
        }
    }

    /// `(name, channel)` of every switch to create, configured switches first.
    pub fn channels(&self) -> Vec<(String, String)> {
        let mut channels: Vec<(String, String)> = self
            .switches
            .iter()
            .map(|(slug, switch)| {
                (
                    switch.friendly_name.clone().unwrap_or_else(|| slug.clone()),
                    switch.id.clone(),
                )
            })
            .collect();
        if let Some(name) = &self.name {
            channels.push((name.clone(), self.id.clone()));
        }
        channels
    }
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Builds the switch controllers for one device.
///
/// `make_handle` receives `(device_id, host, local_key)` and returns the
/// protocol client. A device that cannot be discovered yet is still set up;
/// its handle starts unresolved and is discovered again on first use.
pub async fn setup<H, F>(
    config: &PlatformConfig,
    scanner: Arc<Scanner>,
    make_handle: F,
) -> Result<Vec<SwitchController<H>>>
where
    H: DeviceHandle,
    F: FnOnce(&str, &str, &str) -> H,
{
    config.validate()?;

    let host = if config.needs_discovery() {
        match scanner.resolve(&config.device_id, false).await {
            Ok(Some(ip)) => ip,
            Ok(None) => {
                warn!("Device {} not found on the network yet", config.device_id);
                ADDR_UNRESOLVED.to_string()
            }
            Err(e) => {
                warn!("Discovery of device {} failed: {}", config.device_id, e);
                ADDR_UNRESOLVED.to_string()
            }
        }
    } else {
        config.host.clone().unwrap_or_default().trim().to_string()
    };
    debug!("device_id=({}), host=({})", config.device_id, host);

    let handle = make_handle(&config.device_id, &host, &config.local_key);
    let cache = Arc::new(StatusCache::new(handle, scanner));

    Ok(config
        .channels()
        .into_iter()
        .map(|(name, channel)| SwitchController::new(cache.clone(), name, channel))
        .collect())
}
