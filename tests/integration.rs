// End-to-end scenarios against the public service/repository layer: each
// test exercises the same path a tool handler takes, without going through
// the MCP wire protocol itself.

use async_trait::async_trait;
use sentinel_mcp::config::database::DatabaseConfig;
use sentinel_mcp::config::http_server::HttpServerConfig;
use sentinel_mcp::context_versioning::ContextVersioner;
use sentinel_mcp::cookies::CookieProvider;
use sentinel_mcp::db::pool::DatabasePool;
use sentinel_mcp::http_tool::{HttpRequestInput, HttpTool};
use sentinel_mcp::missions::MissionService;
use sentinel_mcp::models::{ActionType, ChangeType, MissionType};
use sentinel_mcp::repositories::target::TargetRepository;
use sentinel_mcp::vector::embeddings::{EmbeddingProvider, NullEmbeddingProvider};
use sentinel_mcp::vector::VectorSearch;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_pool() -> Arc<DatabasePool> {
    let config = DatabaseConfig {
        path: "test.db".to_string(),
        pool_size: 1,
        max_overflow: 0,
        pool_timeout_s: 5,
    };
    sentinel_mcp::db::open(&config).await.unwrap()
}

fn http_server_config() -> Arc<HttpServerConfig> {
    let mut errors = Vec::new();
    Arc::new(HttpServerConfig::from_env(&mut errors))
}

/// A simple keyword-bucket embedding provider: distinct from
/// `NullEmbeddingProvider`, whose all-zero vectors can't discriminate
/// between techniques. Each known keyword owns a fixed dimension; cosine
/// similarity then tracks shared vocabulary.
struct KeywordEmbeddingProvider;

const KEYWORDS: &[&str] = &["sql", "injection", "xss", "script", "traversal", "path"];

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddingProvider {
    fn dimensions(&self) -> usize {
        KEYWORDS.len()
    }

    async fn encode_text(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
            .collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[tokio::test]
async fn http_request_logs_target_and_audit_trail_for_a_successful_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"users": []})))
        .mount(&server)
        .await;

    let pool = test_pool().await;
    let tool = HttpTool::new(http_server_config(), pool.clone()).unwrap();
    let url = format!("{}/users", server.uri());

    let output = tool
        .execute(
            HttpRequestInput {
                url: url.clone(),
                method: "GET".to_string(),
                follow_redirects: true,
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(output.status_code, Some(200));
    assert_eq!(output.json, Some(serde_json::json!({"users": []})));

    let targets = TargetRepository::new(pool.clone());
    let target = targets.get_or_create_from_url(&url).await.unwrap();

    let join_count: i64 = pool
        .run(move |conn| {
            conn.query_row(
                "SELECT count(*) FROM target_http_requests WHERE target_id = ?1",
                [target.id],
                |row| row.get(0),
            )
        })
        .await
        .unwrap();
    assert_eq!(join_count, 1);
}

#[tokio::test]
async fn http_request_merges_cookie_profile_under_caller_supplied_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let pool = test_pool().await;
    let tool = HttpTool::new(http_server_config(), pool).unwrap();

    let mut profile_cookies = HashMap::new();
    profile_cookies.insert("session_id".to_string(), "A".to_string());
    profile_cookies.insert("theme".to_string(), "dark".to_string());

    let mut request_cookies = HashMap::new();
    request_cookies.insert("session_id".to_string(), "B".to_string());
    request_cookies.insert("lang".to_string(), "en".to_string());

    let output = tool
        .execute(
            HttpRequestInput {
                url: server.uri(),
                method: "GET".to_string(),
                cookies: request_cookies,
                follow_redirects: true,
                ..Default::default()
            },
            Some(profile_cookies),
        )
        .await
        .unwrap();

    assert_eq!(output.cookies.get("session_id"), Some(&"B".to_string()));
    assert_eq!(output.cookies.get("theme"), Some(&"dark".to_string()));
    assert_eq!(output.cookies.get("lang"), Some(&"en".to_string()));
}

#[tokio::test]
async fn rollback_creates_a_new_version_and_never_mutates_history() {
    let pool = test_pool().await;
    let targets = TargetRepository::new(pool.clone());
    let target = targets.get_or_create_from_url("https://example.com/").await.unwrap();
    let versioner = ContextVersioner::new(pool);

    let v1 = versioner
        .create_version(target.id, Some("A".to_string()), None, "user".to_string(), ChangeType::UserEdit, None, None, false)
        .await
        .unwrap();
    versioner
        .create_version(target.id, Some("B".to_string()), None, "user".to_string(), ChangeType::UserEdit, None, None, false)
        .await
        .unwrap();
    versioner
        .create_version(target.id, Some("C".to_string()), None, "user".to_string(), ChangeType::UserEdit, None, None, false)
        .await
        .unwrap();

    let rolled_back = versioner.rollback_to_version(target.id, v1.id).await.unwrap();

    assert_eq!(rolled_back.version, 4);
    assert_eq!(rolled_back.user_context, Some("A".to_string()));
    assert_eq!(rolled_back.change_type, ChangeType::Rollback);
    assert_eq!(rolled_back.parent_version_id, Some(v1.id));

    let current = versioner.get_current(target.id).await.unwrap().unwrap();
    assert_eq!(current.id, rolled_back.id);

    // v1 itself is untouched.
    let v1_reread = versioner.get_version(v1.id).await.unwrap().unwrap();
    assert_eq!(v1_reread.user_context, Some("A".to_string()));
    assert_eq!(v1_reread.version, 1);
}

#[tokio::test]
async fn find_similar_actions_ranks_matching_technique_family_first() {
    let pool = test_pool().await;
    let targets = TargetRepository::new(pool.clone());
    let target = targets.get_or_create_from_url("https://example.com/").await.unwrap();

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbeddingProvider);
    let missions = MissionService::new(pool.clone(), embeddings.clone());
    let search = VectorSearch::new(pool.clone(), embeddings);

    let mission = missions
        .create_mission(
            target.id,
            MissionType::General,
            "recall-test".to_string(),
            "rank sqli above unrelated techniques".to_string(),
            None,
            HashMap::new(),
        )
        .await
        .unwrap();

    let seeds = [
        ("boolean-based SQL injection", true),
        ("union-based SQL injection", true),
        ("error-based SQL injection", true),
        ("reflected XSS via script tag", false),
        ("directory traversal / path disclosure", false),
    ];

    for (technique, success) in seeds {
        let action = missions
            .record_action(
                mission.id,
                ActionType::PayloadTest,
                technique.to_string(),
                None,
                None,
                success,
                None,
                0,
            )
            .await
            .unwrap();
        search
            .add_action_embeddings(action.id, "payload_test", technique, None)
            .await
            .unwrap();
    }

    let hits = search
        .find_similar_actions("boolean-based SQL injection", Some(mission.id), 10, false, 0.0)
        .await
        .unwrap();

    assert_eq!(hits.len(), 5);
    let top_three: Vec<&str> = hits[..3].iter().map(|h| h.action.technique.as_str()).collect();
    assert!(top_three.iter().all(|t| t.to_lowercase().contains("sql")));
    for sqli in &hits[..3] {
        for other in &hits[3..] {
            assert!(sqli.similarity > other.similarity);
        }
    }
}

#[tokio::test]
async fn reading_an_insecure_cookie_file_yields_an_error_response_not_a_panic() {
    use std::io::Write;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let cookie_path = dir.path().join("admin.json");
    {
        let mut f = std::fs::File::create(&cookie_path).unwrap();
        writeln!(f, r#"{{"session_id": "abc123"}}"#).unwrap();
    }
    #[cfg(unix)]
    std::fs::set_permissions(&cookie_path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let manifest_path = dir.path().join("sessions.yaml");
    std::fs::write(
        &manifest_path,
        "version: \"1.0\"\nsessions:\n  admin:\n    cookie_file: admin.json\n",
    )
    .unwrap();

    let provider = CookieProvider::new(manifest_path, dir.path().to_path_buf());
    let response = provider.read("admin").await;

    assert!(response.cookies.is_empty());
    #[cfg(unix)]
    assert!(response.error.unwrap().contains("insecure permissions"));
}

#[tokio::test]
async fn aggregated_validation_errors_report_every_bad_field_at_once() {
    use sentinel_mcp::validation::{coerce_bool, coerce_object, ValidationErrors};
    use serde_json::json;

    let mut errors = ValidationErrors::new();

    let follow_redirects = json!("maybe");
    coerce_bool("follow_redirects", &follow_redirects, &mut errors);

    let headers = json!(["not", "an", "object"]);
    coerce_object("headers", &headers, &mut errors);

    let cookies = json!("{not json");
    coerce_object("cookies", &cookies, &mut errors);

    assert!(!errors.is_empty());
    let rendered = errors.render("HTTP request");
    assert!(rendered.starts_with("Invalid HTTP request - 3 errors:"));
    assert!(rendered.contains("follow_redirects"));
    assert!(rendered.contains("headers"));
    assert!(rendered.contains("cookies"));
}

/// Sanity check that the repository layer never returns a target row with
/// no backing path, independent of `Path` import above staying used.
#[tokio::test]
async fn data_dir_parent_is_created_for_file_backed_pools() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("sentinel.db");
    let config = DatabaseConfig {
        path: db_path.to_string_lossy().into_owned(),
        pool_size: 1,
        max_overflow: 1,
        pool_timeout_s: 5,
    };
    let pool = sentinel_mcp::db::open(&config).await.unwrap();
    assert!(Path::new(&db_path).exists());
    drop(pool);
}

#[tokio::test]
async fn null_embedding_provider_never_blocks_the_recall_pipeline() {
    let pool = test_pool().await;
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(NullEmbeddingProvider::new());
    let search = VectorSearch::new(pool, embeddings);
    let stats = search.library_stats().await.unwrap();
    assert_eq!(stats.total_entries, 0);
}
