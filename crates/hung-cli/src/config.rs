//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hung_ai::CompletionOptions;
use hung_ai::providers::{get_api_key, openai::API_KEY_ENV_VARS};

/// Configuration for hung
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model to request
    pub model: Option<String>,
    /// Base URL of the OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// API key (alternative to environment variables)
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Replaces the default persona prompt
    pub system_prompt: Option<String>,
    /// Delay between revealed characters, in milliseconds
    pub reveal_pace_ms: Option<u64>,
    /// Seconds between automatic archives
    pub autosave_interval_secs: Option<u64>,
    /// Where conversations and settings are stored
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hung")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("HUNG_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`; a missing or unreadable file gives defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write an example config file if none exists
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// API key from the config file, then the environment
    pub fn api_key(&self) -> Option<String> {
        get_api_key(self.api_key.as_deref(), API_KEY_ENV_VARS).ok()
    }

    /// Request options with unset fields at their defaults
    pub fn completion_options(&self) -> CompletionOptions {
        let defaults = CompletionOptions::default();
        CompletionOptions {
            model: self.model.clone().unwrap_or(defaults.model),
            temperature: self.temperature.or(defaults.temperature),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            ..defaults
        }
    }

    pub fn reveal_pace(&self) -> Option<Duration> {
        self.reveal_pace_ms.map(Duration::from_millis)
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        self.autosave_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# hung configuration file
# Place at ~/.config/hung/config.toml (Linux) or set HUNG_CONFIG_PATH

# Model to request
model = "deepseek/deepseek-r1:nitro"

# Any OpenAI-compatible endpoint
base_url = "https://openrouter.ai/api/v1"

# Sampling
temperature = 0.7
max_tokens = 2000

# Typing effect for non-streamed replies, in milliseconds per character
reveal_pace_ms = 30

# Archive the conversation this often while it changes
autosave_interval_secs = 30

# Replace the default assistant persona (optional)
# system_prompt = "You are a concise assistant."

# Storage location (optional)
# data_dir = "/home/me/.local/share/hung"

# API key (optional - HUNG_API_KEY or OPENROUTER_API_KEY also work)
# It's recommended to use environment variables instead for security
# api_key = "sk-or-..."
"#
}
