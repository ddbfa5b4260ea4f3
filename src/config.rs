//! Engine configuration.
//!
//! Loaded from `{config_dir}/dojo/config.toml` with environment-variable
//! overrides for the secrets. A missing or unreadable file falls back to
//! defaults; configuration problems are logged, never fatal.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DojoConfig {
    /// Override for the data directory holding the ledger and schedule
    pub data_dir: Option<PathBuf>,
    /// Shared key required in `x-api-key` on every endpoint when set
    pub api_key: Option<String>,
    pub server: ServerConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat-completions API
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl DojoConfig {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Self {
        let mut config = match Self::default_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Load a specific file, degrading to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Invalid config at {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Cannot read config at {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dojo").join("config.toml"))
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("DOJO_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("DOJO_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("DOJO_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("DOJO_LLM_MODEL") {
            self.llm.model = model;
        }
    }
}
