//! Configuration management for hanashi.
//!
//! Loads config from YAML files in standard locations. Secrets can also be
//! supplied through `ELEVENLABS_API_KEY` and `OPENAI_API_KEY`, which take
//! precedence over the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ELEVENLABS_KEY_ENV: &str = "ELEVENLABS_API_KEY";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model_id: String,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".into(),
            model_id: "eleven_multilingual_v2".into(),
            api_key: None,
        }
    }
}

// Hand-written so the key never reaches a log line.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".into(),
            model: "gpt-4.1-mini-2025-04-14".into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Which credential flow the background coordinator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Forward to the hanashi server; the provider key stays server-side.
    #[default]
    Hosted,
    /// Call the provider directly with the key from the settings store.
    Direct,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mode: BridgeMode,
    pub server_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: BridgeMode::Hosted,
            server_url: "http://localhost:8787".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Settings file. Empty means `<data dir>/hanashi/settings.json`.
    pub path: String,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if !self.path.is_empty() {
            return PathBuf::from(&self.path);
        }
        dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hanashi")
            .join("settings.json")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub relay: RelayConfig,
    pub bridge: BridgeConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./hanashi.yaml
    /// 2. ~/.config/hanashi/config.yaml
    /// 3. /etc/hanashi/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("hanashi.yaml")),
                dirs::home_dir().map(|h| h.join(".config/hanashi/config.yaml")),
                Some(PathBuf::from("/etc/hanashi/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let mut config = match resolved {
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
            Some(config_path) => Self::read_file(&config_path),
        };
        config.apply_env();
        config
    }

    fn read_file(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }

    /// Overlay secrets from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ELEVENLABS_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.provider.api_key = Some(key);
        }
        if let Some(key) = lookup(OPENAI_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.relay.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hosted_deployment() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.provider.model_id, "eleven_multilingual_v2");
        assert_eq!(config.bridge.mode, BridgeMode::Hosted);
        assert!(config.relay.enabled);
    }

    #[test]
    fn partial_yaml_keeps_section_defaults() {
        let yaml = "server:\n  port: 9000\nbridge:\n  mode: direct\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.bridge.mode, BridgeMode::Direct);
        assert_eq!(config.bridge.server_url, "http://localhost:8787");
    }

    #[test]
    fn unknown_bridge_mode_is_rejected() {
        use clap::ValueEnum;
        assert_eq!(BridgeMode::from_str("direct", true), Ok(BridgeMode::Direct));
        assert_eq!(BridgeMode::from_str("HOSTED", true), Ok(BridgeMode::Hosted));
        assert!(BridgeMode::from_str("dirct", true).is_err());
        assert!(Config::from_yaml("bridge:\n  mode: dirct\n").is_err());
    }

    #[test]
    fn env_secrets_override_file_values() {
        let mut config = Config::from_yaml("provider:\n  api_key: from-file\n").unwrap();
        config.apply_env_from(|name| match name {
            ELEVENLABS_KEY_ENV => Some("from-env".into()),
            OPENAI_KEY_ENV => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.provider.api_key.as_deref(), Some("from-env"));
        assert!(config.relay.api_key.is_none());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = Config::default();
        config.provider.api_key = Some("sk_secret".into());
        config.relay.api_key = Some("sk_other".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk_secret"));
        assert!(!rendered.contains("sk_other"));
        assert!(rendered.contains("<redacted>"));
    }
}
