//! Configuration module
//!
//! Handles loading and saving relaywire configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{
    ProtocolSettings, WireError, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MIN_SUPPORTED_VERSION,
    PROTOCOL_VERSION,
};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid protocol settings: {0}")]
    Protocol(#[from] WireError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Wire protocol settings
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Node identifier announced in hellos (auto-generated if not set)
    pub node_id: Option<Uuid>,
    /// Human-readable name for this node
    pub name: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            verbose: false,
        }
    }
}

/// Protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Version spoken natively
    #[serde(default = "default_local_version")]
    pub local_version: u32,
    /// Oldest peer version accepted
    #[serde(default = "default_min_supported_version")]
    pub min_supported_version: u32,
    /// Largest accepted payload in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Network number for messages from versions that lack one
    pub default_network_num: Option<u32>,
}

fn default_local_version() -> u32 {
    PROTOCOL_VERSION
}

fn default_min_supported_version() -> u32 {
    DEFAULT_MIN_SUPPORTED_VERSION
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            local_version: default_local_version(),
            min_supported_version: default_min_supported_version(),
            max_message_size: default_max_message_size(),
            default_network_num: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("relaywire/config.toml")),
            Some(PathBuf::from("./relaywire.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the node ID, generating one if not set
    pub fn node_id(&self) -> Uuid {
        self.general.node_id.unwrap_or_else(Uuid::new_v4)
    }

    /// Validated settings for the version registry
    pub fn protocol_settings(&self) -> ConfigResult<ProtocolSettings> {
        let settings = ProtocolSettings {
            local_version: self.protocol.local_version,
            min_supported_version: self.protocol.min_supported_version,
            max_message_size: self.protocol.max_message_size,
            default_network_num: self.protocol.default_network_num,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig {
            node_id: Some(Uuid::nil()),
            name: "relay-eu-1".to_string(),
            verbose: false,
        },
        protocol: ProtocolConfig {
            default_network_num: Some(5),
            ..Default::default()
        },
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.protocol.local_version, PROTOCOL_VERSION);
        assert_eq!(config.protocol.min_supported_version, 6);
        assert_eq!(config.protocol.default_network_num, None);
        assert!(config.protocol_settings().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.protocol.default_network_num = Some(7);
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.protocol.default_network_num, Some(7));
        assert_eq!(loaded.protocol.max_message_size, config.protocol.max_message_size);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[protocol]\nmin_supported_version = 10").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.protocol.min_supported_version, 10);
        assert_eq!(config.protocol.local_version, PROTOCOL_VERSION);

        let settings = config.protocol_settings().unwrap();
        assert_eq!(settings.min_supported_version, 10);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let mut config = Config::default();
        config.protocol.min_supported_version = 30;
        assert!(matches!(
            config.protocol_settings(),
            Err(ConfigError::Protocol(WireError::UnsupportedVersion(30)))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/relaywire.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.general.name, "relay-eu-1");
        assert_eq!(parsed.general.node_id, Some(Uuid::nil()));
        assert_eq!(parsed.protocol.default_network_num, Some(5));
    }
}
