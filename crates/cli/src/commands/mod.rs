//! Subcommand implementations.

pub mod chat;
pub mod doctor;
pub mod serve;

use std::path::Path;

use atlas_config::{AppConfig, CONFIG_FILE};

/// Load `path` (or `./atlas.toml`) with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = path.unwrap_or(Path::new(CONFIG_FILE));
    let config = AppConfig::load_with_env(path, |key| std::env::var(key).ok())
        .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}
