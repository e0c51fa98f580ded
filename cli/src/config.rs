// Configuration management for the blelink CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/blelink/config.json
// - Linux: ~/.config/blelink/config.json
// - Windows: %APPDATA%\blelink\config.json

use anyhow::{Context, Result};
use blelink_core::{DisconnectPolicy, LinkSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identity, MTU and disconnect policy shared by both roles
    pub link: LinkSettings,

    /// Peers connected by `simulate peripheral` when `--peers` is not given
    #[serde(default = "default_simulated_peers")]
    pub simulated_peers: usize,
}

fn default_simulated_peers() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkSettings::default(),
            simulated_peers: default_simulated_peers(),
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("blelink");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.link.validate().context("Invalid link settings")?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.link.validate().context("Invalid link settings")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value; the result must still validate
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        let identity = &mut updated.link.identity;

        match key {
            "service-name" => identity.service_name = value.to_string(),
            "service-id" => identity.service_id = parse_id(value)?,
            "read-id" => identity.read_channel = parse_id(value)?,
            "write-id" => identity.write_channel = parse_id(value)?,
            "mtu" => {
                updated.link.mtu_size = value.parse().context("Invalid MTU value")?;
            }
            "disconnect-policy" => {
                updated.link.disconnect_policy = value
                    .parse::<DisconnectPolicy>()
                    .context("Invalid disconnect policy")?;
            }
            "simulated-peers" => {
                updated.simulated_peers = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        updated.link.validate().context("Invalid link settings")?;
        *self = updated;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let identity = &self.link.identity;
        vec![
            ("service-name".to_string(), identity.service_name.clone()),
            ("service-id".to_string(), identity.service_id.to_string()),
            ("read-id".to_string(), identity.read_channel.to_string()),
            ("write-id".to_string(), identity.write_channel.to_string()),
            ("mtu".to_string(), self.link.mtu_size.to_string()),
            (
                "disconnect-policy".to_string(),
                self.link.disconnect_policy.to_string(),
            ),
            (
                "simulated-peers".to_string(),
                self.simulated_peers.to_string(),
            ),
        ]
    }
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid UUID: {}", value))
}
