//! core::config
//!
//! Configuration loading.
//!
//! # Overview
//!
//! Configuration is resolved once at process start into a [`Config`]
//! value and handed to the constructors of the lock manager, record
//! store and step log. Nothing reads the environment after that.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. Environment variables
//! 4. CLI flags (not handled here)
//!
//! # Config File Locations
//!
//! Searched in order, first existing file wins:
//! 1. `$POOLTX_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/pooltx/config.toml`
//! 3. `<platform config dir>/pooltx/config.toml`
//! 4. `/etc/pooltx/config.toml`
//!
//! # Environment
//!
//! - `POOLTX_STATE_DIR` - state root
//! - `POOLTX_DISABLE_LOCKS` - `1/true/yes/on` or `0/false/no/off`
//!
//! # Example
//!
//! ```no_run
//! use pooltx::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("State root: {}", config.state_dir.display());
//! ```

pub mod schema;

pub use schema::ConfigFile;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::{StatePaths, DEFAULT_STATE_DIR};

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG: &str = "POOLTX_CONFIG";

/// Environment variable overriding the state root.
pub const ENV_STATE_DIR: &str = "POOLTX_STATE_DIR";

/// Environment variable disabling pool locking.
pub const ENV_DISABLE_LOCKS: &str = "POOLTX_DISABLE_LOCKS";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root directory for locks, records and step logs.
    pub state_dir: PathBuf,

    /// When set, every lock acquisition succeeds and nothing is recorded
    /// as held. Test environments only.
    pub disable_locking: bool,

    /// Config file the values were read from, if any.
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            disable_locking: false,
            source: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment and the default
    /// config file locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or
    /// parsed, or if an environment value is malformed. A missing config
    /// file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();

        let file = match Self::find_config_file(&env) {
            Some(path) => Some((Self::read_config_file(&path)?, path)),
            None => None,
        };

        Self::from_sources(file, env)
    }

    /// Build configuration from an optional parsed file and an environment
    /// lookup.
    ///
    /// This is the pure core of [`Config::load`].
    pub fn from_sources<F>(
        file: Option<(ConfigFile, PathBuf)>,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some((file, path)) = file {
            file.validate()?;
            if let Some(dir) = file.state_dir {
                config.state_dir = dir;
            }
            if let Some(disable) = file.disable_locking {
                config.disable_locking = disable;
            }
            config.source = Some(path);
        }

        if let Some(dir) = env(ENV_STATE_DIR).filter(|d| !d.trim().is_empty()) {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(flag) = env(ENV_DISABLE_LOCKS) {
            config.disable_locking = parse_flag(ENV_DISABLE_LOCKS, &flag)?;
        }

        Ok(config)
    }

    /// Paths rooted at the configured state directory.
    pub fn paths(&self) -> StatePaths {
        StatePaths::new(&self.state_dir)
    }

    /// Locate the first existing config file.
    fn find_config_file<F>(env: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 1. Check $POOLTX_CONFIG
        if let Some(path) = env(ENV_CONFIG) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/pooltx/config.toml
        if let Some(xdg_home) = env("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("pooltx/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check the platform config dir
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("pooltx/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 4. Check /etc
        let system = PathBuf::from("/etc/pooltx/config.toml");
        system.exists().then_some(system)
    }

    /// Read and parse a config file.
    pub fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Parse a boolean flag value from the environment.
fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(None, env_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/pooltx"));
        assert!(!config.disable_locking);
    }

    #[test]
    fn file_overrides_defaults() {
        let file = ConfigFile {
            state_dir: Some(PathBuf::from("/srv/pools")),
            disable_locking: Some(true),
        };
        let config =
            Config::from_sources(Some((file, PathBuf::from("/etc/x.toml"))), env_from(&[]))
                .unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/srv/pools"));
        assert!(config.disable_locking);
        assert_eq!(config.source, Some(PathBuf::from("/etc/x.toml")));
    }

    #[test]
    fn env_overrides_file() {
        let file = ConfigFile {
            state_dir: Some(PathBuf::from("/srv/pools")),
            disable_locking: Some(true),
        };
        let env = env_from(&[(ENV_STATE_DIR, "/tmp/state"), (ENV_DISABLE_LOCKS, "off")]);
        let config = Config::from_sources(Some((file, PathBuf::from("c.toml"))), env).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
        assert!(!config.disable_locking);
    }

    #[test]
    fn blank_state_dir_env_is_ignored() {
        let env = env_from(&[(ENV_STATE_DIR, "  ")]);
        let config = Config::from_sources(None, env).unwrap();
        assert_eq!(config.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
    }

    #[test]
    fn disable_locks_flag_values() {
        for value in ["1", "true", "TRUE", "yes", "on"] {
            let config =
                Config::from_sources(None, env_from(&[(ENV_DISABLE_LOCKS, value)])).unwrap();
            assert!(config.disable_locking, "{} should enable", value);
        }
        for value in ["0", "false", "no", "off", ""] {
            let config =
                Config::from_sources(None, env_from(&[(ENV_DISABLE_LOCKS, value)])).unwrap();
            assert!(!config.disable_locking, "{} should not enable", value);
        }
    }

    #[test]
    fn disable_locks_rejects_garbage() {
        let result = Config::from_sources(None, env_from(&[(ENV_DISABLE_LOCKS, "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn invalid_file_rejected() {
        let file = ConfigFile {
            state_dir: Some(PathBuf::new()),
            disable_locking: None,
        };
        let result = Config::from_sources(Some((file, PathBuf::from("c.toml"))), env_from(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn read_config_file_parses_and_reports_errors() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.toml");
        fs::write(&good, "state_dir = \"/srv/pooltx\"\n").unwrap();
        let parsed = Config::read_config_file(&good).unwrap();
        assert_eq!(parsed.state_dir, Some(PathBuf::from("/srv/pooltx")));

        let bad = temp.path().join("bad.toml");
        fs::write(&bad, "state_dir = [").unwrap();
        assert!(matches!(
            Config::read_config_file(&bad),
            Err(ConfigError::ParseError { .. })
        ));

        let missing = temp.path().join("missing.toml");
        assert!(matches!(
            Config::read_config_file(&missing),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test]
    fn paths_use_state_dir() {
        let config = Config {
            state_dir: PathBuf::from("/srv/pools"),
            ..Default::default()
        };
        assert_eq!(config.paths().root(), Path::new("/srv/pools"));
    }
}
