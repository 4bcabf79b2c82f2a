//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Validation
//!
//! Values are validated after parsing; unknown keys are rejected so that
//! a typo never silently falls back to a default state root.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// On-disk configuration file.
///
/// # Example
///
/// ```toml
/// state_dir = "/srv/pooltx"
/// disable_locking = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Root directory for locks, records and step logs
    pub state_dir: Option<PathBuf>,

    /// Disable pool locking entirely (test environments only)
    pub disable_locking: Option<bool>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dir) = &self.state_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "state_dir cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
