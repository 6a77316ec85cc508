// src/mcp/mod.rs
// Tool/Resource Registry: the MCP server surface. Binds every tool handler
// to the service layer underneath, using `validation::` to coerce the
// loosely-typed arguments an LLM tends to send before anything reaches a
// repository or service call.

pub mod resources;

use crate::config::http_server::HttpServerConfig;
use crate::context_versioning::ContextVersioner;
use crate::cookies::CookieProvider;
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::http_tool::{HttpRequestInput, HttpTool};
use crate::missions::MissionService;
use crate::models::{ActionType, ChangeType, MissionType, RiskLevel, Target, TargetContext, TargetStatus};
use crate::repositories::http_request::HttpRequestRepository;
use crate::repositories::tag::RequestTagRepository;
use crate::repositories::target::TargetRepository;
use crate::validation::{coerce_bool, coerce_i64, coerce_object, ValidationErrors};
use crate::vector::embeddings::EmbeddingProvider;
use crate::vector::VectorSearch;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    schemars,
    service::{RequestContext, RoleServer},
    tool, tool_router, ErrorData, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// MCP server state: one instance per process, shared across tool calls.
#[derive(Clone)]
pub struct SentinelServer {
    #[allow(dead_code)]
    pool: Arc<DatabasePool>,
    http_config: Arc<HttpServerConfig>,
    http_tool: Arc<HttpTool>,
    targets: Arc<TargetRepository>,
    contexts: Arc<ContextVersioner>,
    missions: Arc<MissionService>,
    vector: Arc<VectorSearch>,
    tags: Arc<RequestTagRepository>,
    requests: Arc<HttpRequestRepository>,
    cookies: Option<Arc<CookieProvider>>,
    tool_router: ToolRouter<Self>,
}

impl SentinelServer {
    pub fn new(
        pool: Arc<DatabasePool>,
        http_config: Arc<HttpServerConfig>,
        embeddings: Arc<dyn EmbeddingProvider>,
        cookies: Option<Arc<CookieProvider>>,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            http_tool: Arc::new(HttpTool::new(http_config.clone(), pool.clone())?),
            targets: Arc::new(TargetRepository::new(pool.clone())),
            contexts: Arc::new(ContextVersioner::new(pool.clone())),
            missions: Arc::new(MissionService::new(pool.clone(), embeddings.clone())),
            vector: Arc::new(VectorSearch::new(pool.clone(), embeddings)),
            tags: Arc::new(RequestTagRepository::new(pool.clone())),
            requests: Arc::new(HttpRequestRepository::new(pool.clone())),
            cookies,
            http_config,
            pool,
            tool_router: Self::tool_router(),
        })
    }

    /// Looks up a configured cookie session by name and surfaces its error
    /// (missing manifest entry, bad permissions, ...) as a tool error rather
    /// than silently sending the request with no cookies.
    async fn resolve_cookie_profile(&self, name: &str) -> Result<HashMap<String, String>, String> {
        let Some(provider) = &self.cookies else {
            return Err(ServerError::CookieProfilesNotConfigured.to_user_string());
        };
        let session = provider.read(name).await;
        match session.error {
            Some(reason) => Err(ServerError::CookieProfile {
                profile: name.to_string(),
                reason,
            }
            .to_user_string()),
            None => Ok(session.cookies),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

fn coerce_opt_i64(field: &str, value: &Option<Value>, errors: &mut ValidationErrors) -> Option<i64> {
    value.as_ref().and_then(|v| coerce_i64(field, v, errors))
}

fn coerce_opt_bool(field: &str, value: &Option<Value>, default: bool, errors: &mut ValidationErrors) -> bool {
    match value {
        Some(v) => coerce_bool(field, v, errors).unwrap_or(default),
        None => default,
    }
}

#[derive(Debug, Serialize)]
struct ContextSearchHit {
    context: TargetContext,
    target: Target,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct HttpRequestToolRequest {
    #[schemars(description = "Full request URL, including scheme and path")]
    pub url: String,
    #[schemars(description = "HTTP method, defaults to GET")]
    pub method: Option<String>,
    #[schemars(description = "Custom headers as a JSON object or JSON-encoded string")]
    pub headers: Option<Value>,
    #[schemars(description = "Cookies to send as a JSON object or JSON-encoded string; a configured cookie_profile's values are merged underneath")]
    pub cookies: Option<Value>,
    #[schemars(description = "Query parameters as a JSON object or JSON-encoded string")]
    pub params: Option<Value>,
    #[schemars(description = "Request body; sent as JSON if it parses as JSON, else raw")]
    pub data: Option<String>,
    #[schemars(description = "Follow redirects, default true. Accepts a bool or common string spellings")]
    pub follow_redirects: Option<Value>,
    #[schemars(description = "Mission to associate this request with")]
    pub mission_id: Option<Value>,
    #[schemars(description = "Name of a configured cookie profile to merge in")]
    pub cookie_profile: Option<String>,
    #[schemars(description = "Basic auth as a JSON object with 'username' and 'password'")]
    pub auth: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateTargetRequest {
    #[schemars(description = "URL identifying the target's host, port, and protocol")]
    pub url: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetTargetRequest {
    pub target_id: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateTargetStatusRequest {
    pub target_id: Value,
    #[schemars(description = "active, inactive, blocked, or completed")]
    pub status: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateTargetRiskLevelRequest {
    pub target_id: Value,
    #[schemars(description = "low, medium, high, or critical")]
    pub risk_level: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchTargetsRequest {
    pub query: String,
    pub limit: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetTargetContextRequest {
    pub target_id: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateTargetContextRequest {
    pub target_id: Value,
    pub user_context: Option<String>,
    pub agent_context: Option<String>,
    #[schemars(description = "Who made this edit, e.g. a username or 'agent'")]
    pub created_by: String,
    #[schemars(description = "user_edit, agent_update, rollback, or system")]
    pub change_type: Option<String>,
    pub change_summary: Option<String>,
    pub parent_version_id: Option<Value>,
    pub is_major_version: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListContextVersionsRequest {
    pub target_id: Value,
    pub limit: Option<Value>,
    pub offset: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RollbackTargetContextRequest {
    pub target_id: Value,
    pub version_id: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchContextsRequest {
    pub query: String,
    pub target_ids: Option<Vec<i64>>,
    pub limit: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateMissionRequest {
    #[schemars(description = "URL of the target this mission is scoped to")]
    pub target_url: String,
    #[schemars(description = "prompt_injection, business_logic, auth_bypass, recon, or general")]
    pub mission_type: String,
    pub name: String,
    pub goal: String,
    pub hypothesis: Option<String>,
    #[schemars(description = "JSON object of scope constraints, or a JSON-encoded string of one")]
    pub scope: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetMissionContextRequest {
    pub mission_id: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetMissionContextRequest {
    #[schemars(description = "Defaults to the current mission set by set_mission_context")]
    pub mission_id: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CompleteMissionRequest {
    pub mission_id: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteMissionRequest {
    pub mission_id: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RecordActionRequest {
    pub mission_id: Value,
    #[schemars(description = "payload_test, recon, exploit, or analysis")]
    pub action_type: String,
    pub technique: String,
    pub payload: Option<String>,
    pub result: Option<String>,
    pub success: Option<Value>,
    pub learning: Option<String>,
    #[schemars(description = "Link this many of the mission's most recent requests to the new action")]
    pub link_recent_requests: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindSimilarActionsRequest {
    pub query: String,
    pub mission_id: Option<Value>,
    pub limit: Option<Value>,
    pub success_only: Option<Value>,
    #[schemars(description = "Minimum cosine similarity in [0, 1], default 0")]
    pub theta: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindSuccessfulPatternsRequest {
    pub technique: String,
    pub limit: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchTechniqueLibraryRequest {
    pub query: String,
    pub category: Option<String>,
    pub limit: Option<Value>,
    pub theta: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddToLibraryRequest {
    pub category: Option<String>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetLibraryStatsRequest {}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddRequestTagRequest {
    pub request_id: Value,
    pub tag: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListRequestTagsRequest {
    pub request_id: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CleanupOldRequestsRequest {
    #[schemars(description = "Delete logged requests older than this many days")]
    pub days: Option<Value>,
}

#[tool_router]
impl SentinelServer {
    #[tool(description = "Issue one outbound HTTP request through the configured proxy, logging the full request/response audit trail regardless of outcome.")]
    async fn http_request(
        &self,
        Parameters(req): Parameters<HttpRequestToolRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let follow_redirects = coerce_opt_bool("follow_redirects", &req.follow_redirects, true, &mut errors);
        let mission_id = coerce_opt_i64("mission_id", &req.mission_id, &mut errors);
        let headers = req
            .headers
            .as_ref()
            .and_then(|v| crate::validation::coerce_string_map("headers", v, &mut errors))
            .unwrap_or_default();
        let cookies = req
            .cookies
            .as_ref()
            .and_then(|v| crate::validation::coerce_string_map("cookies", v, &mut errors))
            .unwrap_or_default();
        let params = req
            .params
            .as_ref()
            .and_then(|v| crate::validation::coerce_string_map("params", v, &mut errors))
            .unwrap_or_default();
        let auth = req.auth.as_ref().and_then(|v| {
            let obj = coerce_object("auth", v, &mut errors)?;
            let username = obj.get("username").and_then(|u| u.as_str()).map(str::to_string);
            let password = obj.get("password").and_then(|p| p.as_str()).map(str::to_string);
            match (username, password) {
                (Some(username), Some(password)) => Some(crate::http_tool::BasicAuth { username, password }),
                _ => {
                    errors.push("auth", "must be an object with 'username' and 'password' strings", v);
                    None
                }
            }
        });
        if !errors.is_empty() {
            return Err(errors.render("http_request"));
        }

        let profile_cookies = match &req.cookie_profile {
            Some(name) => Some(self.resolve_cookie_profile(name).await?),
            None => None,
        };

        let input = HttpRequestInput {
            url: req.url,
            method: req.method.unwrap_or_else(|| "GET".to_string()),
            headers,
            cookies,
            params,
            data: req.data,
            follow_redirects,
            mission_id,
            cookie_profile: req.cookie_profile,
            auth,
        };

        let output = self
            .http_tool
            .execute(input, profile_cookies)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&output)
    }

    #[tool(description = "Upsert a target from a URL, keyed by (host, port, protocol). Idempotent; bumps last_activity on repeat calls.")]
    async fn create_target(
        &self,
        Parameters(req): Parameters<CreateTargetRequest>,
    ) -> Result<String, String> {
        let target = self
            .targets
            .get_or_create_from_url(&req.url)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&target)
    }

    #[tool(description = "Fetch a target by id.")]
    async fn get_target(&self, Parameters(req): Parameters<GetTargetRequest>) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let Some(id) = coerce_i64("target_id", &req.target_id, &mut errors) else {
            return Err(errors.render("get_target"));
        };
        let target = self.targets.get(id).await.map_err(|e| e.to_user_string())?;
        to_json(&target)
    }

    #[tool(description = "Update a target's status (active, inactive, blocked, completed).")]
    async fn update_target_status(
        &self,
        Parameters(req): Parameters<UpdateTargetStatusRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let id = coerce_i64("target_id", &req.target_id, &mut errors);
        let status: Option<TargetStatus> = req.status.parse().ok();
        if status.is_none() {
            errors.push("status", "must be one of active, inactive, blocked, completed", &Value::String(req.status.clone()));
        }
        let (Some(id), Some(status)) = (id, status) else {
            return Err(errors.render("update_target_status"));
        };
        self.targets
            .update_status(id, status)
            .await
            .map_err(|e| e.to_user_string())?;
        Ok("{}".to_string())
    }

    #[tool(description = "Update a target's risk level (low, medium, high, critical).")]
    async fn update_target_risk_level(
        &self,
        Parameters(req): Parameters<UpdateTargetRiskLevelRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let id = coerce_i64("target_id", &req.target_id, &mut errors);
        let risk_level: Option<RiskLevel> = req.risk_level.parse().ok();
        if risk_level.is_none() {
            errors.push("risk_level", "must be one of low, medium, high, critical", &Value::String(req.risk_level.clone()));
        }
        let (Some(id), Some(risk_level)) = (id, risk_level) else {
            return Err(errors.render("update_target_risk_level"));
        };
        self.targets
            .update_risk_level(id, risk_level)
            .await
            .map_err(|e| e.to_user_string())?;
        Ok("{}".to_string())
    }

    #[tool(description = "Substring search over target host and title.")]
    async fn search_targets(
        &self,
        Parameters(req): Parameters<SearchTargetsRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let limit = coerce_opt_i64("limit", &req.limit, &mut errors).unwrap_or(20);
        if !errors.is_empty() {
            return Err(errors.render("search_targets"));
        }
        let hits = self
            .targets
            .search(&req.query, limit)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&hits)
    }

    #[tool(description = "Get the current context version for a target.")]
    async fn get_target_context(
        &self,
        Parameters(req): Parameters<GetTargetContextRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let Some(id) = coerce_i64("target_id", &req.target_id, &mut errors) else {
            return Err(errors.render("get_target_context"));
        };
        let ctx = self.contexts.get_current(id).await.map_err(|e| e.to_user_string())?;
        to_json(&ctx)
    }

    #[tool(description = "Append a new immutable context version for a target. History is never mutated; this always inserts.")]
    async fn update_target_context(
        &self,
        Parameters(req): Parameters<UpdateTargetContextRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let target_id = coerce_i64("target_id", &req.target_id, &mut errors);
        let parent_version_id = coerce_opt_i64("parent_version_id", &req.parent_version_id, &mut errors);
        let is_major_version = coerce_opt_bool("is_major_version", &req.is_major_version, false, &mut errors);
        let change_type: ChangeType = req
            .change_type
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(ChangeType::UserEdit);
        let Some(target_id) = target_id else {
            return Err(errors.render("update_target_context"));
        };
        if !errors.is_empty() {
            return Err(errors.render("update_target_context"));
        }

        let version = self
            .contexts
            .create_version(
                target_id,
                req.user_context,
                req.agent_context,
                req.created_by,
                change_type,
                req.change_summary,
                parent_version_id,
                is_major_version,
            )
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&version)
    }

    #[tool(description = "List context versions for a target, newest first.")]
    async fn list_context_versions(
        &self,
        Parameters(req): Parameters<ListContextVersionsRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let target_id = coerce_i64("target_id", &req.target_id, &mut errors);
        let limit = coerce_opt_i64("limit", &req.limit, &mut errors).unwrap_or(20);
        let offset = coerce_opt_i64("offset", &req.offset, &mut errors).unwrap_or(0);
        let Some(target_id) = target_id else {
            return Err(errors.render("list_context_versions"));
        };
        if !errors.is_empty() {
            return Err(errors.render("list_context_versions"));
        }
        let versions = self
            .contexts
            .list_versions(target_id, limit, offset)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&versions)
    }

    #[tool(description = "Roll back a target's context to an earlier version by copying its body into a new version. History is preserved, never overwritten.")]
    async fn rollback_target_context(
        &self,
        Parameters(req): Parameters<RollbackTargetContextRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let target_id = coerce_i64("target_id", &req.target_id, &mut errors);
        let version_id = coerce_i64("version_id", &req.version_id, &mut errors);
        let (Some(target_id), Some(version_id)) = (target_id, version_id) else {
            return Err(errors.render("rollback_target_context"));
        };
        let version = self
            .contexts
            .rollback_to_version(target_id, version_id)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&version)
    }

    #[tool(description = "Substring search over context bodies across targets, each hit paired with its target.")]
    async fn search_contexts(
        &self,
        Parameters(req): Parameters<SearchContextsRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let limit = coerce_opt_i64("limit", &req.limit, &mut errors).unwrap_or(20);
        if !errors.is_empty() {
            return Err(errors.render("search_contexts"));
        }
        let hits = self
            .contexts
            .search_contexts(req.query, req.target_ids, limit)
            .await
            .map_err(|e| e.to_user_string())?
            .into_iter()
            .map(|(context, target)| ContextSearchHit { context, target })
            .collect::<Vec<_>>();
        to_json(&hits)
    }

    #[tool(description = "Create a mission (a named campaign with a goal and hypothesis) scoped to a target.")]
    async fn create_mission(
        &self,
        Parameters(req): Parameters<CreateMissionRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let mission_type: Option<MissionType> = req.mission_type.parse().ok();
        if mission_type.is_none() {
            errors.push(
                "mission_type",
                "must be one of prompt_injection, business_logic, auth_bypass, recon, general",
                &Value::String(req.mission_type.clone()),
            );
        }
        let scope = match &req.scope {
            Some(v) => coerce_object("scope", v, &mut errors).unwrap_or_default(),
            None => Default::default(),
        };
        if !errors.is_empty() {
            return Err(errors.render("create_mission"));
        }

        let target = self
            .missions
            .targets()
            .get_or_create_from_url(&req.target_url)
            .await
            .map_err(|e| e.to_user_string())?;

        let mission = self
            .missions
            .create_mission(
                target.id,
                mission_type.unwrap(),
                req.name,
                req.goal,
                req.hypothesis,
                scope.into_iter().collect(),
            )
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&mission)
    }

    #[tool(description = "Set the process-wide current mission, used by get_mission_context when no mission_id is given.")]
    async fn set_mission_context(
        &self,
        Parameters(req): Parameters<SetMissionContextRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let Some(id) = coerce_i64("mission_id", &req.mission_id, &mut errors) else {
            return Err(errors.render("set_mission_context"));
        };
        self.missions
            .set_mission_context(id)
            .await
            .map_err(|e| e.to_user_string())?;
        Ok("{}".to_string())
    }

    #[tool(description = "Get a mission's progress summary: the mission itself, action stats, and recent actions.")]
    async fn get_mission_context(
        &self,
        Parameters(req): Parameters<GetMissionContextRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let id = coerce_opt_i64("mission_id", &req.mission_id, &mut errors);
        if !errors.is_empty() {
            return Err(errors.render("get_mission_context"));
        }
        let summary = self
            .missions
            .get_mission_context(id)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&summary)
    }

    #[tool(description = "Mark a mission completed.")]
    async fn complete_mission(
        &self,
        Parameters(req): Parameters<CompleteMissionRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let Some(id) = coerce_i64("mission_id", &req.mission_id, &mut errors) else {
            return Err(errors.render("complete_mission"));
        };
        self.missions
            .complete_mission(id)
            .await
            .map_err(|e| e.to_user_string())?;
        Ok("{}".to_string())
    }

    #[tool(description = "Delete a mission and its actions. Clears the current-mission pointer if it pointed here.")]
    async fn delete_mission(
        &self,
        Parameters(req): Parameters<DeleteMissionRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let Some(id) = coerce_i64("mission_id", &req.mission_id, &mut errors) else {
            return Err(errors.render("delete_mission"));
        };
        self.missions
            .delete_mission(id)
            .await
            .map_err(|e| e.to_user_string())?;
        Ok("{}".to_string())
    }

    #[tool(description = "Record an attempted technique within a mission, embedding it for later similarity search.")]
    async fn record_action(
        &self,
        Parameters(req): Parameters<RecordActionRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let mission_id = coerce_i64("mission_id", &req.mission_id, &mut errors);
        let success = coerce_opt_bool("success", &req.success, false, &mut errors);
        let link_recent_requests = coerce_opt_i64("link_recent_requests", &req.link_recent_requests, &mut errors).unwrap_or(0);
        let action_type: Option<ActionType> = req.action_type.parse().ok();
        if action_type.is_none() {
            errors.push(
                "action_type",
                "must be one of payload_test, recon, exploit, analysis",
                &Value::String(req.action_type.clone()),
            );
        }
        let Some(mission_id) = mission_id else {
            return Err(errors.render("record_action"));
        };
        if !errors.is_empty() {
            return Err(errors.render("record_action"));
        }

        let action = self
            .missions
            .record_action(
                mission_id,
                action_type.unwrap(),
                req.technique,
                req.payload,
                req.result,
                success,
                req.learning,
                link_recent_requests,
            )
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&action)
    }

    #[tool(description = "Find past actions whose action/technique embedding is nearest to a query, optionally scoped to one mission and successful-only.")]
    async fn find_similar_techniques(
        &self,
        Parameters(req): Parameters<FindSimilarActionsRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let mission_id = coerce_opt_i64("mission_id", &req.mission_id, &mut errors);
        let limit = coerce_opt_i64("limit", &req.limit, &mut errors).unwrap_or(10);
        let success_only = coerce_opt_bool("success_only", &req.success_only, false, &mut errors);
        let theta = req
            .theta
            .as_ref()
            .and_then(|v| crate::validation::coerce_f64("theta", v, &mut errors))
            .unwrap_or(0.0) as f32;
        if !errors.is_empty() {
            return Err(errors.render("find_similar_techniques"));
        }
        let hits = self
            .vector
            .find_similar_actions(&req.query, mission_id, limit, success_only, theta)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&hits)
    }

    #[tool(description = "List successful past actions for an exact technique name, across all missions.")]
    async fn search_techniques(
        &self,
        Parameters(req): Parameters<FindSuccessfulPatternsRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let limit = coerce_opt_i64("limit", &req.limit, &mut errors).unwrap_or(10);
        if !errors.is_empty() {
            return Err(errors.render("search_techniques"));
        }
        let hits = self
            .vector
            .find_successful_patterns_by_technique(&req.technique, limit)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&hits)
    }

    #[tool(description = "Semantic search over the curated technique library, optionally filtered by category.")]
    async fn search_library(
        &self,
        Parameters(req): Parameters<SearchTechniqueLibraryRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let limit = coerce_opt_i64("limit", &req.limit, &mut errors).unwrap_or(10);
        let theta = req
            .theta
            .as_ref()
            .and_then(|v| crate::validation::coerce_f64("theta", v, &mut errors))
            .unwrap_or(0.0) as f32;
        if !errors.is_empty() {
            return Err(errors.render("search_library"));
        }
        let hits = self
            .vector
            .search_technique_library(&req.query, req.category, limit, theta)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&hits)
    }

    #[tool(description = "Add a new entry to the technique library, embedding its content for future semantic search.")]
    async fn add_to_library(
        &self,
        Parameters(req): Parameters<AddToLibraryRequest>,
    ) -> Result<String, String> {
        let entry = self
            .vector
            .add_to_library(req.category, req.title, req.content)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&entry)
    }

    #[tool(description = "Count of technique library entries, broken down by category.")]
    async fn get_library_stats(
        &self,
        Parameters(_req): Parameters<GetLibraryStatsRequest>,
    ) -> Result<String, String> {
        let stats = self.vector.library_stats().await.map_err(|e| e.to_user_string())?;
        to_json(&stats)
    }

    #[tool(description = "Count of technique library entries, broken down by category (alias of get_library_stats).")]
    async fn get_technique_stats(
        &self,
        Parameters(_req): Parameters<GetLibraryStatsRequest>,
    ) -> Result<String, String> {
        let stats = self.vector.library_stats().await.map_err(|e| e.to_user_string())?;
        to_json(&stats)
    }

    #[tool(description = "Tag a logged request with a free-form label. Idempotent per (request, tag).")]
    async fn add_request_tag(
        &self,
        Parameters(req): Parameters<AddRequestTagRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let Some(request_id) = coerce_i64("request_id", &req.request_id, &mut errors) else {
            return Err(errors.render("add_request_tag"));
        };
        self.tags.add(request_id, &req.tag).await.map_err(|e| e.to_user_string())?;
        Ok("{}".to_string())
    }

    #[tool(description = "List tags on a logged request.")]
    async fn list_request_tags(
        &self,
        Parameters(req): Parameters<ListRequestTagsRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let Some(request_id) = coerce_i64("request_id", &req.request_id, &mut errors) else {
            return Err(errors.render("list_request_tags"));
        };
        let tags = self
            .tags
            .list_for_request(request_id)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&tags)
    }

    #[tool(description = "Delete logged requests older than a retention window, cascading to their tags and links. Returns the number deleted.")]
    async fn cleanup_old_requests(
        &self,
        Parameters(req): Parameters<CleanupOldRequestsRequest>,
    ) -> Result<String, String> {
        let mut errors = ValidationErrors::new();
        let days = coerce_opt_i64("days", &req.days, &mut errors).unwrap_or(30);
        if !errors.is_empty() {
            return Err(errors.render("cleanup_old_requests"));
        }
        let deleted = self
            .requests
            .cleanup_old_requests(days)
            .await
            .map_err(|e| e.to_user_string())?;
        to_json(&serde_json::json!({ "deleted": deleted }))
    }
}

impl ServerHandler for SentinelServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            server_info: rmcp::model::Implementation {
                name: self.http_config.server_name.clone(),
                title: Some("Sentinel - security research HTTP tooling over MCP".into()),
                version: self.http_config.server_version.clone(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Sentinel issues HTTP requests through a proxy, tracks targets/missions/actions, \
                 and exposes cookie sessions and the technique library for security research."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let ctx = rmcp::handler::server::tool::ToolCallContext::new(self, request, context);
            self.tool_router.call(ctx).await
        }
    }

    fn list_resources(
        &self,
        request: Option<rmcp::model::PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ListResourcesResult, ErrorData>> + Send + '_ {
        self.handle_list_resources(request, context)
    }

    fn list_resource_templates(
        &self,
        request: Option<rmcp::model::PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ListResourceTemplatesResult, ErrorData>> + Send + '_
    {
        self.handle_list_resource_templates(request, context)
    }

    fn read_resource(
        &self,
        request: rmcp::model::ReadResourceRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ReadResourceResult, ErrorData>> + Send + '_ {
        self.handle_read_resource(request, context)
    }
}
