// src/config/database.rs
// Database pool sizing configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or ":memory:"/a shared-cache URI in test mode.
    pub path: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_timeout_s: u64,
}

impl DatabaseConfig {
    pub fn from_env(errors: &mut Vec<String>) -> Self {
        use super::helpers::{env_or, env_parsed_or};
        Self {
            path: env_or("SENTINEL_DATABASE_PATH", "sentinel.db"),
            pool_size: env_parsed_or("SENTINEL_DB_POOL_SIZE", 5, errors),
            max_overflow: env_parsed_or("SENTINEL_DB_MAX_OVERFLOW", 5, errors),
            pool_timeout_s: env_parsed_or("SENTINEL_DB_POOL_TIMEOUT_S", 30, errors),
        }
    }

    /// Disable pooling (single connection) when the database name contains
    /// "test", to avoid cross-test bleed between shared-cache databases.
    pub fn is_test_mode(&self) -> bool {
        self.path.contains("test")
    }
}
