//! Configuration loading, validation, and management for Atlas.
//!
//! Loads configuration from an optional `atlas.toml` in the working directory,
//! then applies environment variable overrides:
//!
//! - `OPENROUTER_API_KEY`: chat model credentials
//! - `FREECRYPTO_API_KEY`: conversion tool credentials
//! - `MODEL_NAME`: model identifier
//! - `PORT`: HTTP listen port

use atlas_core::knowledge::KnowledgeSources;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "atlas.toml";

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenRouter API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Chat-completion endpoint settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Conversion tool settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Startup documents
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// HTTP server settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_model() -> String {
    "meta-llama/llama-3.1-8b-instruct".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("provider", &self.provider)
            .field("conversion", &self.conversion)
            .field("knowledge", &self.knowledge)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Sent as `HTTP-Referer` (OpenRouter attribution)
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Sent as `X-Title` (OpenRouter attribution)
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_provider_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_referer() -> String {
    "http://localhost".into()
}
fn default_title() -> String {
    "Crypto Chatbot".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            referer: default_referer(),
            title: default_title(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_conversion_url")]
    pub base_url: String,
}

fn default_conversion_url() -> String {
    "https://api.freecryptoapi.com/v1".into()
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_conversion_url(),
        }
    }
}

impl std::fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_instructions_path")]
    pub instructions_path: PathBuf,

    #[serde(default = "default_knowledge_base_path")]
    pub knowledge_base_path: PathBuf,
}

fn default_instructions_path() -> PathBuf {
    PathBuf::from(atlas_core::knowledge::INSTRUCTIONS_FILE)
}
fn default_knowledge_base_path() -> PathBuf {
    PathBuf::from(atlas_core::knowledge::KNOWLEDGE_BASE_FILE)
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            instructions_path: default_instructions_path(),
            knowledge_base_path: default_knowledge_base_path(),
        }
    }
}

impl KnowledgeConfig {
    pub fn sources(&self) -> KnowledgeSources {
        KnowledgeSources {
            instructions_path: self.instructions_path.clone(),
            knowledge_base_path: self.knowledge_base_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served for `GET /` and `GET /<path>`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl AppConfig {
    /// Load from `path` and apply overrides from `env`.
    pub fn load_with_env(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides. Empty values are ignored.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("OPENROUTER_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(key) = var("FREECRYPTO_API_KEY") {
            self.conversion.api_key = Some(key);
        }
        if let Some(model) = var("MODEL_NAME") {
            self.model = model;
        }
        if let Some(port) = var("PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT is not a valid port: {port}")))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn has_conversion_key(&self) -> bool {
        self.conversion
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            provider: ProviderConfig::default(),
            conversion: ConversionConfig::default(),
            knowledge: KnowledgeConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
