// src/config/mod.rs
// Central configuration: all environment variables in one place, loaded once
// at startup and validated as a batch rather than failing on the first
// missing field.

pub mod application;
pub mod database;
pub mod helpers;
pub mod http_server;

use crate::error::ServerError;
use serde::{Deserialize, Serialize};

pub use application::ApplicationConfig;
pub use database::DatabaseConfig;
pub use http_server::{HttpServerConfig, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub application: ApplicationConfig,
    pub database: DatabaseConfig,
    pub http_server: HttpServerConfig,
}

impl Config {
    /// Load and validate configuration from the environment. Returns every
    /// invalid or missing field at once instead of stopping at the first.
    pub fn from_env() -> Result<Self, ServerError> {
        let mut errors = Vec::new();

        let application = ApplicationConfig::from_env(&mut errors);
        let database = DatabaseConfig::from_env(&mut errors);
        let http_server = HttpServerConfig::from_env(&mut errors);

        let config = Self {
            application,
            database,
            http_server,
        };

        config.cross_validate(&mut errors);

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ServerError::Config(errors))
        }
    }

    /// Checks that span more than one domain config.
    fn cross_validate(&self, errors: &mut Vec<String>) {
        if self.http_server.cookie_sessions_enabled {
            if let Some(path) = &self.http_server.cookie_sessions_config {
                if !path.exists() {
                    errors.push(format!(
                        "SENTINEL_COOKIE_SESSIONS_CONFIG: '{}' does not exist",
                        path.display()
                    ));
                }
            }
        }

        if self.database.pool_size == 0 {
            errors.push("SENTINEL_DB_POOL_SIZE: must be greater than 0".to_string());
        }

        if self.http_server.port == 0 && self.http_server.transport != Transport::Stdio {
            errors.push("SENTINEL_PORT: must be nonzero for http/sse transports".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_sentinel_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("SENTINEL_") {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_are_valid() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_sentinel_env();
        let config = Config::from_env().expect("defaults should be valid");
        assert_eq!(config.http_server.transport, Transport::Stdio);
        assert_eq!(config.database.pool_size, 5);
    }

    #[test]
    fn rejects_zero_pool_size() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_sentinel_env();
        std::env::set_var("SENTINEL_DB_POOL_SIZE", "0");
        let err = Config::from_env().unwrap_err();
        match err {
            ServerError::Config(msgs) => {
                assert!(msgs.iter().any(|m| m.contains("SENTINEL_DB_POOL_SIZE")))
            }
            other => panic!("expected Config error, got {other:?}"),
        }
        std::env::remove_var("SENTINEL_DB_POOL_SIZE");
    }

    #[test]
    fn cookie_sessions_enabled_without_path_is_aggregated_with_other_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_sentinel_env();
        std::env::set_var("SENTINEL_COOKIE_SESSIONS_ENABLED", "true");
        std::env::set_var("SENTINEL_DB_POOL_SIZE", "0");
        let err = Config::from_env().unwrap_err();
        match err {
            ServerError::Config(msgs) => {
                assert!(msgs.iter().any(|m| m.contains("SENTINEL_COOKIE_SESSIONS_CONFIG")));
                assert!(msgs.iter().any(|m| m.contains("SENTINEL_DB_POOL_SIZE")));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
        clear_sentinel_env();
    }
}
