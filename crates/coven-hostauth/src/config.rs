// ABOUTME: Configuration for host authentication: SSH directory and freshness window.
// ABOUTME: Loaded from ~/.config/coven/hostauth.toml with sensible defaults.

use crate::challenge::{CHALLENGE_DURATION_SECONDS, MAX_CLOCK_SKEW_SECONDS};
use crate::error::{HostAuthError, Result};
use crate::keystore::AUTHORIZED_KEYS_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Get XDG-style config directory (~/.config/coven).
///
/// Uses `XDG_CONFIG_HOME` if set, otherwise falls back to `~/.config`.
pub fn xdg_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("coven"))
}

/// Get the default config file path (~/.config/coven/hostauth.toml).
pub fn default_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|p| p.join("hostauth.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostAuthConfig {
    /// Directory holding `id_*` keys and the authorized keys file. `~` is expanded.
    pub ssh_dir: String,

    /// File name of the trusted key list inside `ssh_dir`.
    pub authorized_keys_file: String,

    /// Seconds a challenge stays valid.
    pub challenge_duration_secs: u64,

    /// Seconds a challenge may be dated ahead of the local clock.
    pub max_clock_skew_secs: u64,
}

impl Default for HostAuthConfig {
    fn default() -> Self {
        Self {
            ssh_dir: "~/.ssh".to_string(),
            authorized_keys_file: AUTHORIZED_KEYS_FILE.to_string(),
            challenge_duration_secs: CHALLENGE_DURATION_SECONDS,
            max_clock_skew_secs: MAX_CLOCK_SKEW_SECONDS,
        }
    }
}

impl HostAuthConfig {
    /// Load config from an explicit path, or from the default path if it exists.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No hostauth config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            HostAuthError::Config(format!("Failed to read config from {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded hostauth config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HostAuthError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ssh_dir.trim().is_empty() {
            return Err(HostAuthError::Config("ssh_dir is required".into()));
        }
        if self.authorized_keys_file.trim().is_empty() {
            return Err(HostAuthError::Config(
                "authorized_keys_file must not be empty".into(),
            ));
        }
        if self.challenge_duration_secs == 0 {
            return Err(HostAuthError::Config(
                "challenge_duration_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_ssh_dir(mut self, ssh_dir: impl Into<String>) -> Self {
        self.ssh_dir = ssh_dir.into();
        self
    }

    /// Expand ~ in the SSH directory path
    pub fn ssh_dir_expanded(&self) -> PathBuf {
        shellexpand::tilde(&self.ssh_dir).into_owned().into()
    }
}
