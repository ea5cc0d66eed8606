//! Configuration: TOML file with serde defaults, overridable from the
//! command line.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name shown on the console status endpoint.
    pub server_name: String,
    pub api: ApiConfig,
    pub console: ConsoleConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    /// 0 requests an OS-assigned ephemeral port.
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Account tables and the admin recovery file.
    pub data_dir: PathBuf,
    /// Root of the public/private script areas.
    pub scripts_dir: PathBuf,
    /// Root of the per-user file areas.
    pub user_files_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: "servctl".to_string(),
            api: ApiConfig::default(),
            console: ConsoleConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            scripts_dir: PathBuf::from("scripts"),
            user_files_dir: PathBuf::from("users_data"),
        }
    }
}

impl Config {
    /// Load from a TOML file, or fall back to defaults when no path is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_config_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.api.port, 0);
        assert_eq!(config.console.port, 8080);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "server_name = \"lab\"\n\n[api]\nport = 5050\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server_name, "lab");
        assert_eq!(config.api.port, 5050);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.console.port, 8080);
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&tmp.path().join("nope.toml"))).is_err());
    }
}
