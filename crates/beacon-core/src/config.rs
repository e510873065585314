//! Configuration for the beacon peripheral daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BEACON_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/beacond/config.toml
//!   3. ~/.config/beacond/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub device: DeviceConfig,
    pub services: ServicesConfig,
}

/// Strings advertised via GATT advertising and the Device Information /
/// Generic Access services. No key material lives here — keys are never
/// persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Local name advertised over BLE. Empty = use the machine host name.
    pub advertise_name: String,
    pub model_name: String,
    pub manufacturer_name: String,
    pub firmware_revision: String,
    pub hardware_revision: String,
    pub software_revision: String,
    /// Empty = derive from `/etc/machine-id` at startup.
    pub serial_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Whether the NetworkManager application service is registered.
    pub network_manager: bool,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            advertise_name: String::new(),
            model_name: "Beacon Peripheral".to_string(),
            manufacturer_name: "Beacon".to_string(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
            hardware_revision: "1".to_string(),
            software_revision: env!("CARGO_PKG_VERSION").to_string(),
            serial_number: String::new(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            network_manager: true,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("beacond")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BeaconConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BeaconConfig::default()
        };
        config.apply_env_overrides();
        config.apply_runtime_defaults();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BEACON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BeaconConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BEACON_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BEACON_DEVICE__ADVERTISE_NAME") {
            self.device.advertise_name = v;
        }
        if let Ok(v) = std::env::var("BEACON_DEVICE__SERIAL_NUMBER") {
            self.device.serial_number = v;
        }
        if let Ok(v) = std::env::var("BEACON_SERVICES__NETWORK_MANAGER") {
            self.services.network_manager = v == "true" || v == "1";
        }
    }

    /// Fill in host-derived defaults that can't live in `Default` (they
    /// read the environment / filesystem).
    fn apply_runtime_defaults(&mut self) {
        if self.device.advertise_name.is_empty() {
            self.device.advertise_name = hostname();
        }
        if self.device.serial_number.is_empty() {
            self.device.serial_number = machine_id_serial();
        }
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "beacon-peripheral".to_string())
}

/// Reformat `/etc/machine-id` (32 lowercase hex chars, no dashes) as a
/// hyphenated UUID string, matching the source's serial-number default.
fn machine_id_serial() -> String {
    let raw = std::fs::read_to_string("/etc/machine-id")
        .unwrap_or_default()
        .trim()
        .to_string();
    if raw.len() != 32 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return "00000000-0000-0000-0000-000000000000".to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &raw[0..8],
        &raw[8..12],
        &raw[12..16],
        &raw[16..20],
        &raw[20..32]
    )
}
