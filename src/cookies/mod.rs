// src/cookies/mod.rs
// Cookie Session Provider: exposes each configured session as an MCP
// resource `cookie-session://<name>`, backed by a YAML manifest and
// on-disk JSON cookie files.
//
// Hot reload and the single-provider lock live here; per-session payload
// caching is delegated to moka, whose `get_with` guarantees the init
// future runs exactly once per key even under concurrent callers — this
// is what keeps a stale read from racing a live re-read.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const SESSION_NAME_PATTERN_HINT: &str = "[A-Za-z0-9_-]+";

fn is_valid_session_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestFile {
    pub version: String,
    pub sessions: HashMap<String, ManifestSession>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestSession {
    pub description: Option<String>,
    pub cookie_file: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_cache_ttl() -> u64 {
    60
}

#[derive(Debug, Clone)]
struct SessionConfig {
    name: String,
    description: Option<String>,
    cookie_file: PathBuf,
    cache_ttl: Duration,
    metadata: HashMap<String, serde_json::Value>,
}

/// The response shape for `cookie-session://<name>`: errors are data, never
/// exceptions, because the agent needs to see why cookies are missing.
#[derive(Debug, Clone, Serialize)]
pub struct CookieSessionResponse {
    pub cookies: HashMap<String, String>,
    pub session_name: String,
    pub description: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CookieSessionResponse {
    pub fn error(session_name: &str, description: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            cookies: HashMap::new(),
            session_name: session_name.to_string(),
            description: description.map(|s| s.to_string()),
            last_updated: Utc::now(),
            from_cache: false,
            file_modified: None,
            metadata: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Clone)]
struct CachedPayload {
    response: CookieSessionResponse,
    ttl: Duration,
}

struct PerSessionExpiry;

impl Expiry<String, Arc<CachedPayload>> for PerSessionExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CachedPayload>,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct CookieProvider {
    manifest_path: PathBuf,
    cookies_data_dir: PathBuf,
    sessions: RwLock<HashMap<String, SessionConfig>>,
    manifest_mtime: RwLock<Option<std::time::SystemTime>>,
    cache: Cache<String, Arc<CachedPayload>>,
}

impl CookieProvider {
    pub fn new(manifest_path: PathBuf, cookies_data_dir: PathBuf) -> Self {
        let cache = Cache::builder().expire_after(PerSessionExpiry).build();
        Self {
            manifest_path,
            cookies_data_dir,
            sessions: RwLock::new(HashMap::new()),
            manifest_mtime: RwLock::new(None),
            cache,
        }
    }

    /// Check the manifest's mtime; reparse if it changed. Clears the
    /// session set if the file disappeared.
    async fn maybe_reload(&self) {
        let current_mtime = std::fs::metadata(&self.manifest_path)
            .and_then(|m| m.modified())
            .ok();

        {
            let last = self.manifest_mtime.read().await;
            if *last == current_mtime && current_mtime.is_some() {
                return;
            }
        }

        let mut last = self.manifest_mtime.write().await;
        if *last == current_mtime && current_mtime.is_some() {
            return;
        }

        if current_mtime.is_none() {
            self.sessions.write().await.clear();
            *last = None;
            return;
        }

        match self.parse_manifest().await {
            Ok(parsed) => {
                *self.sessions.write().await = parsed;
                *last = current_mtime;
            }
            Err(e) => {
                tracing::warn!("failed to reload cookie session manifest: {}", e);
            }
        }
    }

    async fn parse_manifest(&self) -> anyhow::Result<HashMap<String, SessionConfig>> {
        let raw = tokio::fs::read_to_string(&self.manifest_path).await?;
        let manifest: ManifestFile = serde_yaml::from_str(&raw)?;

        let mut sessions = HashMap::new();
        for (name, entry) in manifest.sessions {
            if !is_valid_session_name(&name) {
                tracing::error!(
                    "skipping cookie session '{}': name must match {}",
                    name,
                    SESSION_NAME_PATTERN_HINT
                );
                continue;
            }
            let Some(cookie_file) = entry.cookie_file else {
                tracing::error!("skipping cookie session '{}': missing cookie_file", name);
                continue;
            };
            sessions.insert(
                name.clone(),
                SessionConfig {
                    name,
                    description: entry.description,
                    cookie_file: PathBuf::from(cookie_file),
                    cache_ttl: Duration::from_secs(entry.cache_ttl),
                    metadata: entry.metadata,
                },
            );
        }
        Ok(sessions)
    }

    /// All currently configured session names; also sweeps expired cache
    /// entries as a side effect.
    pub async fn list_sessions(&self) -> Vec<String> {
        self.maybe_reload().await;
        self.cache.run_pending_tasks().await;
        let sessions = self.sessions.read().await;
        let mut names: Vec<String> = sessions.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn clear_cache(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub async fn read(&self, name: &str) -> CookieSessionResponse {
        self.maybe_reload().await;

        let config = {
            let sessions = self.sessions.read().await;
            sessions.get(name).cloned()
        };

        let Some(config) = config else {
            return CookieSessionResponse::error(
                name,
                None,
                format!("cookie session '{name}' is not configured"),
            );
        };

        let was_cached = Arc::new(AtomicBool::new(true));
        let flag = was_cached.clone();
        let data_dir = self.cookies_data_dir.clone();
        let cfg = config.clone();

        let payload = self
            .cache
            .get_with(name.to_string(), async move {
                flag.store(false, Ordering::Relaxed);
                Arc::new(CachedPayload {
                    response: load_session(&cfg, &data_dir),
                    ttl: cfg.cache_ttl,
                })
            })
            .await;

        let mut response = payload.response.clone();
        response.from_cache = was_cached.load(Ordering::Relaxed);
        response
    }
}

fn load_session(config: &SessionConfig, cookies_data_dir: &Path) -> CookieSessionResponse {
    match resolve_and_read(config, cookies_data_dir) {
        Ok((cookies, file_modified)) => CookieSessionResponse {
            cookies,
            session_name: config.name.clone(),
            description: config.description.clone(),
            last_updated: Utc::now(),
            from_cache: false,
            file_modified: Some(file_modified),
            metadata: if config.metadata.is_empty() {
                None
            } else {
                Some(config.metadata.clone())
            },
            error: None,
        },
        Err(message) => CookieSessionResponse::error(&config.name, config.description.as_deref(), message),
    }
}

fn resolve_and_read(
    config: &SessionConfig,
    cookies_data_dir: &Path,
) -> Result<(HashMap<String, String>, DateTime<Utc>), String> {
    let original_was_absolute = config.cookie_file.is_absolute();

    let expanded = expand_home(&config.cookie_file);
    let candidate = if expanded.is_absolute() {
        expanded
    } else {
        cookies_data_dir.join(expanded)
    };

    let canonical = candidate
        .canonicalize()
        .map_err(|e| format!("cookie file not found: {e}"))?;

    let home = dirs::home_dir();
    let allowed_roots: Vec<PathBuf> = [Some(cookies_data_dir.to_path_buf()), home]
        .into_iter()
        .flatten()
        .filter_map(|p| p.canonicalize().ok())
        .collect();

    let within_allowed_root = allowed_roots.iter().any(|root| canonical.starts_with(root));
    let under_tmp = canonical.starts_with("/tmp") && original_was_absolute;

    if !within_allowed_root && !under_tmp {
        return Err(format!(
            "cookie file '{}' is outside the permitted directories",
            canonical.display()
        ));
    }

    let metadata = std::fs::metadata(&canonical).map_err(|e| format!("cannot stat cookie file: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 && mode != 0o400 {
            return Err(format!(
                "cookie file '{}' has insecure permissions {:o}; expected 0600 or 0400",
                canonical.display(),
                mode
            ));
        }
    }

    let file_modified: DateTime<Utc> = metadata
        .modified()
        .ok()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(Utc::now);

    let raw = std::fs::read_to_string(&canonical).map_err(|e| format!("cannot read cookie file: {e}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("cookie file is not valid JSON: {e}"))?;

    let object = value
        .as_object()
        .ok_or_else(|| "cookie file must contain a JSON object".to_string())?;

    let cookies = object
        .iter()
        .map(|(k, v)| (k.clone(), json_value_to_string(v)))
        .collect();

    Ok((cookies, file_modified))
}

fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_cookie_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, r#"{{"session_id": "abc123"}}"#).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn rejects_insecure_file_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        write_cookie_file(&data_dir, "admin.json", 0o644);

        let config = SessionConfig {
            name: "admin".to_string(),
            description: None,
            cookie_file: PathBuf::from("admin.json"),
            cache_ttl: Duration::from_secs(60),
            metadata: HashMap::new(),
        };

        let err = resolve_and_read(&config, &data_dir).unwrap_err();
        assert!(err.contains("insecure permissions"));
    }

    #[test]
    fn accepts_0600_and_parses_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        write_cookie_file(&data_dir, "admin.json", 0o600);

        let config = SessionConfig {
            name: "admin".to_string(),
            description: None,
            cookie_file: PathBuf::from("admin.json"),
            cache_ttl: Duration::from_secs(60),
            metadata: HashMap::new(),
        };

        let (cookies, _modified) = resolve_and_read(&config, &data_dir).unwrap();
        assert_eq!(cookies.get("session_id"), Some(&"abc123".to_string()));
    }

    #[test]
    fn session_names_reject_unsafe_characters() {
        assert!(is_valid_session_name("admin-session_1"));
        assert!(!is_valid_session_name("admin/session"));
        assert!(!is_valid_session_name("admin session"));
        assert!(!is_valid_session_name(""));
    }

    #[tokio::test]
    async fn unconfigured_session_yields_error_response_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("sessions.yaml");
        std::fs::write(&manifest_path, "version: \"1.0\"\nsessions: {}\n").unwrap();

        let provider = CookieProvider::new(manifest_path, dir.path().to_path_buf());
        let response = provider.read("missing").await;
        assert!(response.cookies.is_empty());
        assert!(response.error.is_some());
    }
}
