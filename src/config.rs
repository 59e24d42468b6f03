//! Configuration management for af-cli.
//!
//! Loads optional defaults from `config.toml` in the platform config
//! directory (e.g. `~/.config/af-cli/config.toml`).

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

/// Defaults for `tunnel` and `db connect`; command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
pub struct TunnelConfig {
    pub local_port: Option<u16>,
    pub remote_host: Option<String>,
    pub remote_port: Option<u16>,
    /// Path or name of the wstunnel executable
    pub wstunnel: Option<String>,
    /// Path or name of the psql executable
    pub psql: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "af-cli").context("Could not determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
