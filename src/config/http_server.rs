// src/config/http_server.rs
// Outbound HTTP client and MCP transport configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Http,
    Sse,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" | "streamable-http" => Ok(Transport::Http),
            "sse" => Ok(Transport::Sse),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// MCP server identity reported in initialize responses.
    pub server_name: String,
    pub server_version: String,

    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub path: String,

    /// Upstream proxy for the `http_request` tool's outbound calls.
    pub proxy_url: Option<String>,
    pub timeout_s: u64,
    pub verify_ssl: bool,
    pub max_request_body_size: usize,
    pub max_response_body_size: usize,

    /// Header names (case-insensitive) stripped from tool output before
    /// it is returned to the model or persisted to the audit trail.
    pub sensitive_headers: Vec<String>,

    pub cookie_sessions_enabled: bool,
    pub cookie_sessions_config: Option<PathBuf>,
    pub cookie_cache_ttl_s: u64,
}

const DEFAULT_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
    "x-api-key",
];

impl HttpServerConfig {
    pub fn from_env(errors: &mut Vec<String>) -> Self {
        use super::helpers::{env_list, env_or, env_parsed_or};

        let transport_raw = env_or("SENTINEL_TRANSPORT", "stdio");
        let transport = transport_raw.parse().unwrap_or_else(|e| {
            errors.push(format!("SENTINEL_TRANSPORT: {e}"));
            Transport::Stdio
        });

        let cookie_sessions_enabled: bool =
            env_parsed_or("SENTINEL_COOKIE_SESSIONS_ENABLED", false, errors);
        let cookie_sessions_config = std::env::var("SENTINEL_COOKIE_SESSIONS_CONFIG")
            .ok()
            .map(PathBuf::from);
        if cookie_sessions_enabled && cookie_sessions_config.is_none() {
            errors.push(
                "SENTINEL_COOKIE_SESSIONS_CONFIG: required when cookie sessions are enabled"
                    .to_string(),
            );
        }

        let sensitive_headers = {
            let extra = env_list("SENTINEL_SENSITIVE_HEADERS");
            let mut headers: Vec<String> = DEFAULT_SENSITIVE_HEADERS
                .iter()
                .map(|s| s.to_string())
                .collect();
            headers.extend(extra);
            headers.sort();
            headers.dedup();
            headers
        };

        Self {
            server_name: env_or("SENTINEL_SERVER_NAME", "sentinel-mcp"),
            server_version: env_or("SENTINEL_SERVER_VERSION", env!("CARGO_PKG_VERSION")),
            transport,
            host: env_or("SENTINEL_HOST", "127.0.0.1"),
            port: env_parsed_or("SENTINEL_PORT", 8787u16, errors),
            path: env_or("SENTINEL_PATH", "/mcp"),
            proxy_url: std::env::var("SENTINEL_PROXY_URL").ok().filter(|s| !s.is_empty()),
            timeout_s: env_parsed_or("SENTINEL_HTTP_TIMEOUT_S", 30, errors),
            verify_ssl: env_parsed_or("SENTINEL_VERIFY_SSL", true, errors),
            max_request_body_size: env_parsed_or(
                "SENTINEL_MAX_REQUEST_BODY_SIZE",
                10 * 1024 * 1024,
                errors,
            ),
            max_response_body_size: env_parsed_or(
                "SENTINEL_MAX_RESPONSE_BODY_SIZE",
                10 * 1024 * 1024,
                errors,
            ),
            sensitive_headers,
            cookie_sessions_enabled,
            cookie_sessions_config,
            cookie_cache_ttl_s: env_parsed_or("SENTINEL_COOKIE_CACHE_TTL_S", 300, errors),
        }
    }

    /// True if `name` should be stripped from any header map leaving this process.
    pub fn is_sensitive_header(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.sensitive_headers.iter().any(|h| h == &lower)
    }
}
