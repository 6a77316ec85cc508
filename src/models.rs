// src/models.rs
// Domain entities shared by the repositories, the HTTP tool, and the MCP
// tool surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

macro_rules! text_enum {
    ($name:ident, $case:literal, { $($variant:ident),+ $(,)? }) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
            strum::IntoStaticStr, strum::EnumString, strum::Display,
        )]
        #[strum(serialize_all = $case)]
        #[serde(rename_all = $case)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                self.into()
            }
        }
    };
}

text_enum!(Protocol, "lowercase", { Http, Https, Tcp, Udp });
text_enum!(TargetStatus, "lowercase", { Active, Inactive, Blocked, Completed });
text_enum!(RiskLevel, "lowercase", { Low, Medium, High, Critical });
text_enum!(ChangeType, "snake_case", { UserEdit, AgentUpdate, Rollback, System });
text_enum!(MissionType, "snake_case", { PromptInjection, BusinessLogic, AuthBypass, Recon, General });
text_enum!(MissionStatus, "lowercase", { Active, Paused, Completed, Failed });
text_enum!(ActionType, "snake_case", { PayloadTest, Recon, Exploit, Analysis });

/// A host+port+protocol endpoint under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub host: String,
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub title: String,
    pub status: TargetStatus,
    pub risk_level: RiskLevel,
    pub discovery_date: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub extra_data: HashMap<String, serde_json::Value>,
    pub current_context_id: Option<i64>,
}

/// One immutable version of a target's notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetContext {
    pub id: i64,
    pub target_id: i64,
    pub version: i64,
    pub user_context: Option<String>,
    pub agent_context: Option<String>,
    pub parent_version_id: Option<i64>,
    pub change_type: ChangeType,
    pub change_summary: Option<String>,
    pub created_by: String,
    pub is_major_version: bool,
    pub tokens_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A named campaign (hypothesis + goal) against one or more targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub mission_type: MissionType,
    pub hypothesis: Option<String>,
    pub goal: String,
    pub scope: HashMap<String, serde_json::Value>,
    pub findings: Option<String>,
    pub patterns: Option<String>,
    pub successful_techniques: Vec<String>,
    pub confidence_score: f64,
    pub status: MissionStatus,
    pub extra_data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Fixed-dimension embedding, absent until computed by the vector subsystem.
    pub goal_embedding: Option<Vec<f32>>,
    pub hypothesis_embedding: Option<Vec<f32>>,
}

/// One attempted technique within a mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionAction {
    pub id: i64,
    pub mission_id: i64,
    pub action_type: ActionType,
    pub technique: String,
    pub payload: Option<String>,
    pub result: Option<String>,
    pub success: bool,
    pub learning: Option<String>,
    pub action_embedding: Option<Vec<f32>>,
    pub result_embedding: Option<Vec<f32>>,
    pub meta_data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// One logged outbound request/response pair (or request with error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestRecord {
    pub id: i64,
    pub mission_id: Option<i64>,
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub request_body: Option<String>,
    pub status_code: Option<u16>,
    pub response_headers: Option<HashMap<String, String>>,
    pub response_body: Option<String>,
    pub response_size: Option<i64>,
    pub elapsed_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HttpRequestRecord {
    /// Exactly one of `status_code`/`error_message` is set once terminal.
    pub fn is_terminal(&self) -> bool {
        self.status_code.is_some() ^ self.error_message.is_some()
    }
}

/// A curated, searchable technique entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechniqueLibraryEntry {
    pub id: i64,
    pub category: Option<String>,
    pub title: String,
    pub content: String,
    pub content_embedding: Option<Vec<f32>>,
    pub meta_data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A free-form tag on a request, unique per `(request_id, tag)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTag {
    pub request_id: i64,
    pub tag: String,
    pub created_at: DateTime<Utc>,
}
