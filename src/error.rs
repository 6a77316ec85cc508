// src/error.rs
// Crate-wide error type

use thiserror::Error;

/// Main error type for the server library
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Config(Vec<String>),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    Pool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("cookie profile '{profile}' failed: {reason}")]
    CookieProfile { profile: String, reason: String },

    #[error("cookie profiles not configured")]
    CookieProfilesNotConfigured,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl ServerError {
    /// Render for the MCP tool-call boundary: no stack traces, one string.
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<ServerError> for String {
    fn from(err: ServerError) -> Self {
        err.to_string()
    }
}

impl From<deadpool_sqlite::PoolError> for ServerError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        ServerError::Pool(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for ServerError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        ServerError::Pool(err.to_string())
    }
}
