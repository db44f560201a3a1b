//! CLI configuration at `~/.nodebase/config.toml`.
//!
//! CLI flags always override config file values.

use anyhow::{Context, Result};
use nodebase_supervisor::SupervisorConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub control: ControlSection,
    #[serde(default)]
    pub relay: RelaySection,
    /// Apps known to `nodebase supervise`.
    #[serde(default)]
    pub apps: Vec<AppEntry>,
}

/// `[control]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlSection {
    /// When set, every control line must start with this token.
    #[serde(default)]
    pub token: Option<String>,
}

/// `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_relay_url")]
    pub url: String,
    #[serde(default)]
    pub server_token: Option<String>,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            server_token: None,
        }
    }
}

/// One `[[apps]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AppEntry {
    pub name: String,
    pub command: String,
    #[serde(default = "default_true")]
    pub autostart: bool,
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), apps = config.apps.len(), "loaded config");
        Ok(config)
    }

    /// Default location: `~/.nodebase/config.toml`.
    pub fn default_path() -> String {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".nodebase")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
