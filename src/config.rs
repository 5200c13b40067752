use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where the model artifacts live and which device runs them.
///
/// Exactly one of `path` or `hub_id` should be set. A `hub_id` is resolved
/// against the local Hugging Face cache only; nothing is fetched over the
/// network at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    /// Directory containing config.json, tokenizer.json and *.safetensors.
    pub path: Option<PathBuf>,
    /// Hugging Face model id to resolve from the local cache.
    pub hub_id: Option<String>,
    /// CUDA device index. None means CPU.
    pub device: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8002
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            // Create default config
            let config = Config::default();
            config.save()?;
            return Ok(config);
        }

        let contents = fs::read_to_string(&config_path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, toml_string)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not determine home directory")?;

        Ok(home.join(".airguide").join("config.toml"))
    }

    /// Socket address string for the MCP endpoint
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.model.path.is_none());
        assert!(config.model.hub_id.is_none());
        assert!(config.model.device.is_none());
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8002);
    }

    #[test]
    fn test_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8002");
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.model.path = Some(PathBuf::from("/models/llama-3.2-1b"));
        config.model.device = Some(0);

        let toml_string = toml::to_string(&config).unwrap();
        assert!(toml_string.contains("llama-3.2-1b"));

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(
            deserialized.model.path,
            Some(PathBuf::from("/models/llama-3.2-1b"))
        );
        assert_eq!(deserialized.model.device, Some(0));
    }

    #[test]
    fn test_partial_config_parses() {
        let config: Config = toml::from_str("[model]\nhub_id = \"meta-llama/Llama-3.2-1B\"\n").unwrap();
        assert_eq!(
            config.model.hub_id.as_deref(),
            Some("meta-llama/Llama-3.2-1B")
        );
        assert_eq!(config.server.port, 8002);
    }
}
