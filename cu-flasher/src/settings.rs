//! Application settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use cu_detect::{DiscoveryConfig, LinkConfig, ScannerConfig};
use cu_provision::{AlwaysAllow, ExpiryGate, ProvisioningSettings, StartGate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors while saving settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine settings path")]
    NoConfigDir,

    #[error("failed to create settings directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write settings: {0}")]
    Write(std::io::Error),
}

/// Persistent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlasherConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Read timeout per exchange in milliseconds
    pub read_timeout_ms: u64,
    /// Maximum bytes read per exchange
    pub max_read: usize,
    /// Delay between detection cycles in milliseconds
    pub discovery_interval_ms: u64,
    /// Ports whose names contain any of these are never probed
    pub skip_patterns: Vec<String>,
    /// Refuse to start runs after this Unix time (seconds)
    pub expires_at_unix: Option<u64>,
    /// Last used provisioning settings
    pub provisioning: ProvisioningSettings,
}

impl Default for FlasherConfig {
    fn default() -> Self {
        let link = LinkConfig::default();
        Self {
            baud_rate: link.baud_rate,
            read_timeout_ms: link.read_timeout.as_millis() as u64,
            max_read: link.max_read,
            discovery_interval_ms: DiscoveryConfig::default().interval.as_millis() as u64,
            skip_patterns: ScannerConfig::default_skip_patterns(),
            expires_at_unix: None,
            provisioning: ProvisioningSettings::default(),
        }
    }
}

impl FlasherConfig {
    /// Config directory (`<config_dir>/cu-flasher`)
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cu-flasher"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::settings_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::CreateDir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(ConfigError::Write)
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            max_read: self.max_read,
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            interval: Duration::from_millis(self.discovery_interval_ms),
            link: self.link_config(),
        }
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            skip_patterns: self.skip_patterns.clone(),
        }
    }

    /// Start gate for provisioning runs
    pub fn start_gate(&self) -> Box<dyn StartGate> {
        match self.expires_at_unix {
            Some(secs) => Box::new(ExpiryGate::from_unix_secs(secs)),
            None => Box::new(AlwaysAllow),
        }
    }
}
