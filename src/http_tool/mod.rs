// src/http_tool/mod.rs
// The http_request tool: issues one outbound HTTP call through the
// configured proxy, logging a full audit trail (pre- and post-request)
// regardless of whether the call itself succeeds.

use crate::config::http_server::HttpServerConfig;
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::repositories::http_request::{HttpRequestPatch, HttpRequestRepository, NewHttpRequest};
use crate::repositories::target::TargetRepository;
use reqwest::{Client, Method};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TRUNCATION_SUFFIX: &str = "... [TRUNCATED]";

/// HTTP basic auth credentials for the outbound request.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct HttpRequestInput {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub data: Option<String>,
    pub follow_redirects: bool,
    pub mission_id: Option<i64>,
    pub cookie_profile: Option<String>,
    pub auth: Option<BasicAuth>,
}

/// The request half of the tool's audit trail: includes values the caller
/// never supplied directly (merged headers, resolved cookie profile) so the
/// log reflects what actually went over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct HttpRequestAudit {
    pub id: i64,
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub headers_user: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub cookie_profile: Option<String>,
    pub params: HashMap<String, String>,
    pub data: Option<String>,
    pub proxy_used: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HttpToolOutput {
    pub status_code: Option<u16>,
    pub headers: HashMap<String, String>,
    pub url: String,
    pub method: String,
    pub cookies: HashMap<String, String>,
    pub elapsed_ms: i64,
    pub encoding: &'static str,
    pub text: Option<String>,
    pub json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request: HttpRequestAudit,
}

fn truncate_to(body: String, limit: usize) -> String {
    if body.len() <= limit {
        return body;
    }
    let cut = limit.min(body.len());
    let mut boundary = cut;
    while boundary > 0 && !body.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}{}", &body[..boundary], TRUNCATION_SUFFIX)
}

pub struct HttpTool {
    client_follow: Client,
    client_no_redirect: Client,
    config: Arc<HttpServerConfig>,
    targets: TargetRepository,
    requests: HttpRequestRepository,
}

impl HttpTool {
    pub fn new(config: Arc<HttpServerConfig>, pool: Arc<DatabasePool>) -> Result<Self, ServerError> {
        let mut base = Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(Duration::from_secs(config.timeout_s));

        if let Some(proxy_url) = &config.proxy_url {
            base = base.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        let client_follow = base.clone().build()?;
        let client_no_redirect = base.redirect(reqwest::redirect::Policy::none()).build()?;

        Ok(Self {
            client_follow,
            client_no_redirect,
            config,
            targets: TargetRepository::new(pool.clone()),
            requests: HttpRequestRepository::new(pool),
        })
    }

    /// Merge `profile_cookies` (from a cookie session resource) under the
    /// caller-supplied `input.cookies`; the caller's values win, and each
    /// overwrite is logged so a silent clobber doesn't hide in the trail.
    fn merge_cookies(
        &self,
        profile_cookies: Option<&HashMap<String, String>>,
        input: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut merged = profile_cookies.cloned().unwrap_or_default();
        for (k, v) in input {
            if merged.contains_key(k) {
                tracing::warn!("cookie '{}' from request overwrites cookie profile value", k);
            }
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    fn merge_headers(&self, input: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        merged.insert("User-Agent".to_string(), format!("{}/{}", self.config.server_name, self.config.server_version));
        merged.insert("X-MCP-Source".to_string(), self.config.server_name.clone());
        for (k, v) in input {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    fn filter_sensitive(&self, headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| {
                if self.config.is_sensitive_header(k) {
                    (k.clone(), "[FILTERED]".to_string())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }

    fn truncate(&self, body: String) -> String {
        truncate_to(body, self.config.max_response_body_size)
    }

    fn truncate_request_body(&self, body: String) -> String {
        truncate_to(body, self.config.max_request_body_size)
    }

    pub async fn execute(
        &self,
        input: HttpRequestInput,
        profile_cookies: Option<HashMap<String, String>>,
    ) -> Result<HttpToolOutput, ServerError> {
        let method = input
            .method
            .parse::<Method>()
            .map_err(|e| ServerError::Validation(format!("method: {e}")))?;

        let cookies = self.merge_cookies(profile_cookies.as_ref(), &input.cookies);
        let headers = self.merge_headers(&input.headers);

        let target = self.targets.get_or_create_from_url(&input.url).await?;

        let logged_headers = self.filter_sensitive(&headers);
        let logged_headers_user = self.filter_sensitive(&input.headers);
        let logged_body = input.data.clone().map(|d| self.truncate_request_body(d));
        let request_id = self
            .requests
            .create(NewHttpRequest {
                mission_id: input.mission_id,
                method: method.to_string(),
                url: input.url.clone(),
                host: target.host.clone(),
                path: reqwest::Url::parse(&input.url)
                    .map(|u| u.path().to_string())
                    .unwrap_or_default(),
                query_params: input.params.clone(),
                headers: logged_headers.clone(),
                cookies: cookies.clone(),
                request_body: logged_body.clone(),
            })
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("failed to log outbound request: {}", e);
                0
            });

        if request_id != 0 {
            if let Err(e) = self.requests.link_to_target(request_id, target.id).await {
                tracing::warn!("failed to link request to target: {}", e);
            }
        }

        let audit = HttpRequestAudit {
            id: request_id,
            method: method.to_string(),
            url: input.url.clone(),
            headers: logged_headers,
            headers_user: logged_headers_user,
            cookies: cookies.clone(),
            cookie_profile: input.cookie_profile.clone(),
            params: input.params.clone(),
            data: logged_body,
            proxy_used: self.config.proxy_url.clone(),
        };

        let client = if input.follow_redirects {
            &self.client_follow
        } else {
            &self.client_no_redirect
        };

        let cookie_header = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");

        let mut builder = client.request(method.clone(), &input.url);
        for (k, v) in &headers {
            builder = builder.header(k, v);
        }
        if !cookie_header.is_empty() {
            builder = builder.header(reqwest::header::COOKIE, cookie_header);
        }
        if !input.params.is_empty() {
            builder = builder.query(&input.params);
        }
        if let Some(auth) = &input.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }

        if let Some(data) = &input.data {
            match serde_json::from_str::<serde_json::Value>(data) {
                Ok(json) => builder = builder.json(&json),
                Err(_) => builder = builder.body(data.clone()),
            }
        }

        let start = Instant::now();
        let send_result = builder.send().await;
        let elapsed_ms = start.elapsed().as_millis() as i64;

        match send_result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let response_headers: HashMap<String, String> = response
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect();

                let raw_body = response.text().await.unwrap_or_default();
                let body = self.truncate(raw_body);

                let filtered_response_headers = self.filter_sensitive(&response_headers);

                if request_id != 0 {
                    let patch = HttpRequestPatch {
                        status_code: Some(status_code),
                        response_headers: Some(filtered_response_headers.clone()),
                        response_body: Some(body.clone()),
                        response_size: Some(body.len() as i64),
                        elapsed_ms: Some(elapsed_ms),
                        error_message: None,
                    };
                    if let Err(e) = self.requests.update(request_id, patch).await {
                        tracing::warn!("failed to log response for request {}: {}", request_id, e);
                    }
                }

                let json = serde_json::from_str::<serde_json::Value>(&body).ok();
                let encoding = if json.is_some() { "json" } else { "text" };

                Ok(HttpToolOutput {
                    status_code: Some(status_code),
                    headers: response_headers,
                    url: input.url,
                    method: method.to_string(),
                    cookies,
                    elapsed_ms,
                    encoding,
                    text: Some(body),
                    json,
                    error: None,
                    request: audit,
                })
            }
            Err(e) => {
                let error_message = if e.is_timeout() {
                    format!("TimeoutError: {e}")
                } else if e.is_connect() {
                    format!("ConnectError: {e}")
                } else {
                    format!("HttpError: {e}")
                };

                if request_id != 0 {
                    let patch = HttpRequestPatch {
                        elapsed_ms: Some(elapsed_ms),
                        error_message: Some(error_message.clone()),
                        ..Default::default()
                    };
                    if let Err(e) = self.requests.update(request_id, patch).await {
                        tracing::warn!("failed to log request failure for {}: {}", request_id, e);
                    }
                }

                Ok(HttpToolOutput {
                    status_code: None,
                    headers: HashMap::new(),
                    url: input.url,
                    method: method.to_string(),
                    cookies,
                    elapsed_ms,
                    encoding: "text",
                    text: None,
                    json: None,
                    error: Some(error_message),
                    request: audit,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<HttpServerConfig> {
        let mut errors = Vec::new();
        Arc::new(HttpServerConfig::from_env(&mut errors))
    }

    #[tokio::test]
    async fn cookie_profile_values_are_overridden_by_request_cookies() {
        let tool = HttpTool::new(config(), open_test_pool().await).unwrap();
        let mut profile = HashMap::new();
        profile.insert("session".to_string(), "from-profile".to_string());
        let mut request_cookies = HashMap::new();
        request_cookies.insert("session".to_string(), "from-caller".to_string());

        let merged = tool.merge_cookies(Some(&profile), &request_cookies);
        assert_eq!(merged.get("session"), Some(&"from-caller".to_string()));
    }

    #[tokio::test]
    async fn sensitive_headers_are_filtered_for_the_audit_trail() {
        let tool = HttpTool::new(config(), open_test_pool().await).unwrap();
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer secret".to_string());
        headers.insert("X-Custom".to_string(), "value".to_string());

        let filtered = tool.filter_sensitive(&headers);
        assert_eq!(filtered.get("Authorization"), Some(&"[FILTERED]".to_string()));
        assert_eq!(filtered.get("X-Custom"), Some(&"value".to_string()));
    }

    #[tokio::test]
    async fn long_response_bodies_are_truncated_with_suffix() {
        let tool = HttpTool::new(config(), open_test_pool().await).unwrap();
        let body = "x".repeat(tool.config.max_response_body_size + 10);
        let truncated = tool.truncate(body);
        assert!(truncated.ends_with(TRUNCATION_SUFFIX));
        assert!(truncated.len() <= tool.config.max_response_body_size + TRUNCATION_SUFFIX.len());
    }

    async fn open_test_pool() -> Arc<DatabasePool> {
        let db_config = crate::config::database::DatabaseConfig {
            path: "test.db".to_string(),
            pool_size: 1,
            max_overflow: 0,
            pool_timeout_s: 5,
        };
        crate::db::open(&db_config).await.unwrap()
    }
}
