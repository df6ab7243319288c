//! # Session Configuration
//!
//! YAML configuration for the ranging tools:
//!
//! - Device URI and serial link parameters
//! - Network: relay device and anchor positions
//! - Radio: UWB preset or explicit settings
//! - Sampling: targets, relay, acceptance filter and run limits
//! - Output files and terminal plot size
//! - Logging
//!
//! ## Configuration Search Path
//!
//! The first file found wins:
//! 1. Path in the `UWB_RANGE_CONFIG` environment variable
//! 2. `./uwb-range.yaml`
//! 3. `~/.config/uwb-range/config.yaml` (platform user config dir)
//! 4. `/etc/uwb-range/config.yaml`
//!
//! ## Example Configuration
//!
//! ```yaml
//! device:
//!   uri: "serial://auto"
//!
//! network:
//!   remote: "0x7607"
//!   anchors:
//!     - { id: "0x7612", kind: anchor, position: { x: 0, y: 0, z: 1500 } }
//!
//! radio:
//!   preset: long-range
//!   apply_to_remote: true
//!
//! sampling:
//!   targets: ["0x7612"]
//!   relay: "0x7607"
//!   filter:
//!     max_accepted_distance_m: 200.0
//!     require_positive_elapsed: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::observe::LogConfig;
use crate::sampling::{AcceptanceFilter, SamplingConfig};
use crate::types::{Coordinates, DeviceCoordinates, DeviceId, UwbSettings};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "UWB_RANGE_CONFIG";

/// Device connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Driver URI (`simulator://`, `serial:///dev/ttyACM0`, `serial://auto`)
    pub uri: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Per-request read timeout
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            uri: "simulator://".to_string(),
            baud_rate: 115_200,
            timeout_ms: 1000,
        }
    }
}

/// Relay device and the anchors it should know about.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Device reached through the local one
    pub remote: Option<DeviceId>,
    pub anchors: Vec<DeviceCoordinates>,
}

/// Radio settings to apply before ranging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Named preset (`working`, `long-range`, `max-range`, `max-rate`)
    pub preset: Option<String>,
    /// Explicit settings, used when no preset is named
    pub settings: Option<UwbSettings>,
    /// Also configure the remote device
    pub apply_to_remote: bool,
    /// Persist to flash after applying
    pub save_to_flash: bool,
}

impl RadioConfig {
    /// The settings to apply, if any.
    pub fn resolve(&self) -> Result<Option<UwbSettings>, ConfigError> {
        let settings = match (&self.preset, self.settings) {
            (Some(name), _) => Some(UwbSettings::preset(name).ok_or_else(|| {
                ConfigError::ValidationError(format!("unknown radio preset '{}'", name))
            })?),
            (None, settings) => settings,
        };
        if let Some(settings) = &settings {
            settings
                .validate()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        Ok(settings)
    }
}

/// Sampling targets, filter and run limits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSection {
    pub targets: Vec<DeviceId>,
    pub relay: Option<DeviceId>,
    pub filter: AcceptanceFilter,
    pub title: Option<String>,
    /// Stop after this many rounds
    pub max_samples: Option<u64>,
    /// Stop after this many seconds
    pub max_duration_s: Option<f64>,
}

impl SamplingSection {
    pub fn loop_config(&self) -> SamplingConfig {
        SamplingConfig {
            targets: self.targets.clone(),
            relay: self.relay,
            filter: self.filter,
            title: self.title.clone(),
        }
    }
}

/// Export files and terminal plot size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Series CSV (`series,elapsed_s,distance_m`)
    pub csv: Option<PathBuf>,
    /// Summary JSON
    pub json: Option<PathBuf>,
    pub plot_width: usize,
    pub plot_height: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv: None,
            json: None,
            plot_width: 72,
            plot_height: 20,
        }
    }
}

/// Complete session configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub radio: RadioConfig,
    pub sampling: SamplingSection,
    pub output: OutputConfig,
    pub logging: LogConfig,
}

impl SessionConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns defaults if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from(&path);
            }
            return Err(ConfigError::NotFound(format!(
                "{} points to {}",
                CONFIG_ENV,
                path.display()
            )));
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::ReadError(format!("{}: {}", path.display(), e)),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Configuration search paths after the environment variable.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./uwb-range.yaml")];

        if let Some(dirs) = directories::ProjectDirs::from("", "", "uwb-range") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/uwb-range/config.yaml"));

        paths
    }

    /// Check everything a ranging session needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.uri.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device uri must not be empty".to_string(),
            ));
        }
        if self.device.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "baud_rate must be positive".to_string(),
            ));
        }

        self.sampling.loop_config().validate()?;

        if let Some(duration) = self.sampling.max_duration_s {
            if duration <= 0.0 {
                return Err(ConfigError::ValidationError(
                    "max_duration_s must be positive".to_string(),
                ));
            }
        }

        self.radio.resolve()?;
        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let remote = DeviceId(0x7607);
        let anchor = DeviceId(0x7612);
        let config = Self {
            network: NetworkConfig {
                remote: Some(remote),
                anchors: vec![DeviceCoordinates::anchor(anchor, Coordinates::new(0, 0, 1500))],
            },
            radio: RadioConfig {
                preset: Some("long-range".to_string()),
                apply_to_remote: true,
                ..Default::default()
            },
            sampling: SamplingSection {
                targets: vec![anchor],
                relay: Some(remote),
                filter: AcceptanceFilter::long_range(),
                ..Default::default()
            },
            ..Default::default()
        };

        serde_yaml::to_string(&config).unwrap_or_default()
    }
}
