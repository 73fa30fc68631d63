//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Guild used when `--guild` is not given
    pub default_guild: Option<String>,
    /// Channel used when `--channel` is not given
    pub default_channel: Option<String>,
}

impl Config {
    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to `path`
    #[allow(dead_code)]
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// API URL from the flag or environment, then the file, then the default
    pub fn resolve_api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Guild and channel from the flags, falling back to the file
    pub fn resolve_channel(
        &self,
        guild: Option<String>,
        channel: Option<String>,
    ) -> Result<(String, String)> {
        let guild = guild
            .or_else(|| self.default_guild.clone())
            .context("No guild given; pass --guild or set default_guild in the config file")?;
        let channel = channel
            .or_else(|| self.default_channel.clone())
            .context("No channel given; pass --channel or set default_channel in the config file")?;
        Ok((guild, channel))
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("cra").join("config.json"))
    }
}
