// src/config/application.rs
// Process-wide application settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub log_level: String,
    /// Base directory for on-disk state (cookie files, prompt overrides).
    pub data_dir: PathBuf,
    pub auto_migrate: bool,
}

impl ApplicationConfig {
    pub fn from_env(errors: &mut Vec<String>) -> Self {
        use super::helpers::{env_or, env_parsed_or};
        let data_dir = env_or(
            "SENTINEL_DATA_DIR",
            &default_data_dir().to_string_lossy(),
        );
        Self {
            log_level: env_or("SENTINEL_LOG_LEVEL", "info"),
            data_dir: PathBuf::from(data_dir),
            auto_migrate: env_parsed_or("SENTINEL_AUTO_MIGRATE", true, errors),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sentinel-mcp")
}
