//! Configuration module
//!
//! Handles loading and saving lispwire configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::network::{WireConfig, DEFAULT_COMPACTION_THRESHOLD};
use crate::protocol::DEFAULT_PORT;

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
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Eval server to talk to
    #[serde(default)]
    pub server: ServerConfig,

    /// Session settings
    #[serde(default)]
    pub wire: WireSettings,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log file path (optional)
    pub log_file: Option<PathBuf>,
}

/// Server address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSettings {
    /// Cursor offset past which the receive buffer is dropped
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
    /// Connection timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Give up waiting for reply bytes after this long (ms). Unset waits forever.
    pub read_timeout_ms: Option<u64>,
    /// Bytes reserved per read from the socket
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

fn default_compaction_threshold() -> usize {
    DEFAULT_COMPACTION_THRESHOLD
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_chunk_size() -> usize {
    4096
}

impl Default for WireSettings {
    fn default() -> Self {
        Self {
            compaction_threshold: default_compaction_threshold(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: None,
            read_chunk_size: default_read_chunk_size(),
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
            dirs::config_dir().map(|p| p.join("lispwire/config.toml")),
            Some(PathBuf::from("./lispwire.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

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

    /// Session settings for the network layer
    pub fn wire_config(&self) -> WireConfig {
        WireConfig {
            connect_timeout: Duration::from_millis(self.wire.connect_timeout_ms),
            read_timeout: self.wire.read_timeout_ms.map(Duration::from_millis),
            compaction_threshold: self.wire.compaction_threshold,
            read_chunk_size: self.wire.read_chunk_size,
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        server: ServerConfig {
            host: "lisp.example.org".to_string(),
            port: DEFAULT_PORT,
        },
        wire: WireSettings {
            read_timeout_ms: Some(30_000),
            ..Default::default()
        },
        ..Default::default()
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
        assert_eq!(config.server.port, DEFAULT_PORT);

        let wire = config.wire_config();
        assert_eq!(wire.compaction_threshold, 100_000);
        assert_eq!(wire.read_timeout, None);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.wire.read_timeout_ms = Some(250);
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(
            loaded.wire_config().read_timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nhost = \"lisp-box\"").unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.server.host, "lisp-box");
        assert_eq!(loaded.server.port, DEFAULT_PORT);
        assert_eq!(loaded.wire.compaction_threshold, DEFAULT_COMPACTION_THRESHOLD);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/lispwire.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.server.host, "lisp.example.org");
        assert_eq!(parsed.wire.read_timeout_ms, Some(30_000));
    }
}
