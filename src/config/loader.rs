//! Optional YAML settings file.
//!
//! ```yaml
//! strict: true
//! ssh_config: [~/.ssh/config, /etc/ssh/ssh_config]
//! defaults:
//!   ConnectTimeout: "10"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::source::{CombinedSource, MapSource};
use super::ssh_config::SshConfigSource;
use crate::error::{DialError, Result};

/// Settings controlling where host configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Reject profiles whose algorithm lists contain nothing supported
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// `ssh_config` files in precedence order; missing files are skipped
    #[serde(default = "default_ssh_config_paths")]
    pub ssh_config: Vec<String>,

    /// Lowest-precedence values applied to every alias
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

const fn default_strict() -> bool {
    true
}

fn default_ssh_config_paths() -> Vec<String> {
    vec!["~/.ssh/config".to_string(), "/etc/ssh/ssh_config".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            ssh_config: default_ssh_config_paths(),
            defaults: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Build the composite source: each readable `ssh_config` file in order,
    /// then `defaults`.
    #[must_use]
    pub fn source(&self) -> CombinedSource {
        let mut combined = CombinedSource::new();

        for raw in &self.ssh_config {
            let path = config_path(raw);
            if !path.exists() {
                debug!(path = %path.display(), "ssh_config not found, skipping");
                continue;
            }
            match SshConfigSource::from_path(&path) {
                Ok(source) => {
                    combined.push(Arc::new(source));
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Failed to read ssh_config");
                }
            }
        }

        if !self.defaults.is_empty() {
            combined.push(Arc::new(MapSource::from_pairs(&self.defaults)));
        }

        info!(sources = combined.len(), strict = self.strict, "Configuration sources ready");
        combined
    }
}

/// Load settings from a YAML file
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist
/// - The file cannot be read
/// - The YAML content is invalid
/// - A `defaults` entry has an empty key
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(DialError::SettingsNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_saphyr::from_str(&content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.defaults.keys().any(|key| key.trim().is_empty()) {
        return Err(DialError::Settings(
            "defaults: keys must be non-empty".to_string(),
        ));
    }
    if settings.ssh_config.iter().any(|path| path.trim().is_empty()) {
        return Err(DialError::Settings(
            "ssh_config: paths must be non-empty".to_string(),
        ));
    }
    Ok(())
}

/// Get the default settings path
#[must_use]
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hostdial")
        .join("config.yaml")
}

fn config_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}
