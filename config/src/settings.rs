//! Upstream completion API configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个乐于助人的助手。";

/// Everything the relay needs to talk to the completion API: credential,
/// endpoint, model identifier, and the fixed system instruction.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
}

/// Optional overrides stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SettingsFile {
    base_url: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
}

impl SettingsFile {
    fn load() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };

        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };

        toml::from_str(&content).unwrap_or_default()
    }
}

fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("shopmate").join("settings.toml"))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Resolve configuration from the environment.
    ///
    /// `DEEPSEEK_API_KEY` carries the credential; `DEEPSEEK_BASE_URL`,
    /// `SHOPMATE_MODEL` and `SHOPMATE_SYSTEM_PROMPT` override the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        UpstreamConfig {
            api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
            base_url: std::env::var("DEEPSEEK_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("SHOPMATE_MODEL").unwrap_or(defaults.model),
            system_prompt: std::env::var("SHOPMATE_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
        }
    }

    /// Resolve from the environment, then apply settings.toml overrides.
    pub fn load() -> Self {
        let mut config = Self::from_env();
        let file = SettingsFile::load();

        if let Some(base_url) = file.base_url {
            config.base_url = base_url;
        }
        if let Some(model) = file.model {
            config.model = model;
        }
        if let Some(system_prompt) = file.system_prompt {
            config.system_prompt = system_prompt;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_deepseek() {
        let config = UpstreamConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key.is_none());
        assert!(!config.system_prompt.is_empty());
    }

    #[test]
    fn settings_file_parses_partial_overrides() {
        let parsed: SettingsFile = toml::from_str("model = \"deepseek-reasoner\"").unwrap();
        assert_eq!(parsed.model.as_deref(), Some("deepseek-reasoner"));
        assert!(parsed.base_url.is_none());
        assert!(parsed.system_prompt.is_none());
    }

    #[test]
    fn settings_file_ignores_garbage() {
        let parsed: SettingsFile = toml::from_str("not valid toml [").unwrap_or_default();
        assert!(parsed.model.is_none());
    }
}
