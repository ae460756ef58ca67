//! Configuration file support for kiln.
//!
//! A project may carry `.kiln/config.toml` next to its `kiln.toml`:
//!
//! ```toml
//! [build]
//! backend = "ninja"
//!
//! [discovery]
//! cache = true
//! parallel = true
//! ```
//!
//! Everything is optional. An unreadable file falls back to the defaults
//! with a warning rather than failing the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::BackendId;

/// kiln configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Discovery settings
    pub discovery: DiscoveryConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default backend when `--backend` is not given (make, ninja, msbuild)
    pub backend: Option<String>,
}

/// Discovery-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Persist discovery records between runs. When false every query
    /// behaves as if it were declared with `cache = false`.
    pub cache: bool,

    /// Resolve independent queries on the rayon pool
    pub parallel: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            cache: true,
            parallel: true,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize config")?;
        crate::util::fs::write_string(path, &contents)
    }

    /// Parse backend from config string.
    pub fn backend(&self) -> Option<BackendId> {
        self.build.backend.as_ref().and_then(|s| s.parse().ok())
    }
}

/// Location of the project config, relative to the source directory.
pub const CONFIG_FILE: &str = ".kiln/config.toml";

/// The project config path (`<srcdir>/.kiln/config.toml`).
pub fn project_config_path(src_dir: &Path) -> PathBuf {
    src_dir.join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.build.backend.is_none());
        assert!(config.discovery.cache);
        assert!(config.discovery.parallel);
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[build]
backend = "ninja"

[discovery]
parallel = false
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.backend(), Some(BackendId::Ninja));
        assert!(config.discovery.cache);
        assert!(!config.discovery.parallel);
    }

    #[test]
    fn test_config_load_or_default_on_garbage() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[build\nbackend = ").unwrap();

        assert_eq!(Config::load_or_default(&config_path), Config::default());
        assert_eq!(
            Config::load_or_default(&tmp.path().join("missing.toml")),
            Config::default()
        );
    }

    #[test]
    fn test_config_save_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let config_path = project_config_path(tmp.path());

        let mut config = Config::default();
        config.build.backend = Some("msbuild".to_string());
        config.discovery.cache = false;
        config.save(&config_path).unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.backend(), Some(BackendId::MsBuild));
    }

    #[test]
    fn test_unknown_backend_is_none() {
        let mut config = Config::default();
        config.build.backend = Some("scons".to_string());
        assert_eq!(config.backend(), None);
    }
}
