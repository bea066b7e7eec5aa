//! Client-side configuration, loaded from `~/.config/parley/config.toml`.
//!
//! This covers only what the client needs before it can reach the backend;
//! provider and key settings live on the backend and are edited through
//! the settings commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use parley_http::DEFAULT_BASE_URL;
use parley_render::DEFAULT_DIAGRAM_URL;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Diagram rendering service base URL.
    #[serde(default = "default_diagram_url")]
    pub diagram_url: String,

    /// Default log file; `--log-file` overrides.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_diagram_url() -> String {
    DEFAULT_DIAGRAM_URL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            diagram_url: default_diagram_url(),
            log_file: None,
        }
    }
}

impl ClientConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
    }

    /// Load from the default location; a missing file is just defaults,
    /// a malformed file is an error.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }
}
