//! Daemon runtime configuration.
//!
//! Loaded from an optional TOML file; a missing file means defaults, a
//! malformed file is reported to the caller, which logs and falls back
//! to defaults rather than refusing to start.

use std::path::Path;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use pawlink_core::ResolverConfig;

fn default_ip_endpoint() -> String {
    "https://ipwho.is".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Base URL of the IP geolocation service. A lookup for a specific
    /// address appends `/<ip>`.
    #[serde(default = "default_ip_endpoint")]
    pub ip_endpoint: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            resolver: ResolverConfig::default(),
            ip_endpoint: default_ip_endpoint(),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<DaemonConfig, String> {
    let path = match path {
        Some(path) => path,
        None => return Ok(DaemonConfig::default()),
    };

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DaemonConfig::default())
        }
        Err(err) => return Err(format!("Failed to read config: {}", err)),
    };

    toml::from_str(&raw).map_err(|err| format!("Failed to parse config: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_path_means_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.ip_endpoint, "https://ipwho.is");
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = load_config(Some(&temp.path().join("absent.toml"))).unwrap();
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("daemon.toml");
        fs::write(&path, "[resolver]\ngps_timeout_ms = 1500\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.resolver.gps_timeout(), Duration::from_millis(1500));
        assert_eq!(config.resolver.ip_timeout(), Duration::from_millis(3000));
        assert_eq!(config.ip_endpoint, "https://ipwho.is");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("daemon.toml");
        fs::write(&path, "this is not toml {{{").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
