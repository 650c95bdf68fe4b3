//! Server configuration, loaded from `codegraph.toml` when present.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Runtime configuration for the server binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// SQLite database location.
    pub database_path: PathBuf,
    /// Bind address for the HTTP surface.
    pub bind_addr: String,
    pub port: u16,
    /// Default size ceiling applied to parse requests that omit one.
    pub max_file_size_kb: u64,
    /// Default per-file parse budget in seconds.
    pub parse_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            database_path: PathBuf::from("codegraph.db"),
            bind_addr: "127.0.0.1".to_string(),
            port: 8431,
            max_file_size_kb: 500,
            parse_timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, falling back to defaults on any problem.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return ServerConfig::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                ServerConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8431);
        assert_eq!(config.max_file_size_kb, 500);
        assert_eq!(config.parse_timeout_seconds, 30);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: ServerConfig =
            toml::from_str("port = 9000\ndatabase_path = \"/data/kg.db\"\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path, PathBuf::from("/data/kg.db"));
        // Unset keys keep their defaults
        assert_eq!(config.bind_addr, "127.0.0.1");
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = ServerConfig::load(Path::new("/nonexistent/codegraph.toml"));
        assert_eq!(config.port, ServerConfig::default().port);
    }
}
