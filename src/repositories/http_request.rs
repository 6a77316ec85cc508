// src/repositories/http_request.rs
// HttpRequest aggregate: create/update/link/cleanup.

use crate::db::codec::{decode_string_map, encode_string_map, parse_rfc3339, to_rfc3339};
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::HttpRequestRecord;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::Arc;

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<HttpRequestRecord> {
    Ok(HttpRequestRecord {
        id: row.get("id")?,
        mission_id: row.get("mission_id")?,
        method: row.get("method")?,
        url: row.get("url")?,
        host: row.get("host")?,
        path: row.get("path")?,
        query_params: decode_string_map(&row.get::<_, String>("query_params")?),
        headers: decode_string_map(&row.get::<_, String>("headers")?),
        cookies: decode_string_map(&row.get::<_, String>("cookies")?),
        request_body: row.get("request_body")?,
        status_code: row.get::<_, Option<i64>>("status_code")?.map(|c| c as u16),
        response_headers: row
            .get::<_, Option<String>>("response_headers")?
            .map(|s| decode_string_map(&s)),
        response_body: row.get("response_body")?,
        response_size: row.get("response_size")?,
        elapsed_ms: row.get("elapsed_ms")?,
        error_message: row.get("error_message")?,
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
    })
}

const SELECT_COLUMNS: &str = "id, mission_id, method, url, host, path, query_params, headers, \
     cookies, request_body, status_code, response_headers, response_body, response_size, \
     elapsed_ms, error_message, created_at";

#[derive(Debug, Clone, Default)]
pub struct NewHttpRequest {
    pub mission_id: Option<i64>,
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub request_body: Option<String>,
}

/// Insert with response fields null; returns the new row's id.
pub fn create_sync(conn: &Connection, req: &NewHttpRequest) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO http_requests \
            (mission_id, method, url, host, path, query_params, headers, cookies, \
             request_body, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            req.mission_id,
            req.method,
            req.url,
            req.host,
            req.path,
            encode_string_map(&req.query_params),
            encode_string_map(&req.headers),
            encode_string_map(&req.cookies),
            req.request_body,
            to_rfc3339(&Utc::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone, Default)]
pub struct HttpRequestPatch {
    pub status_code: Option<u16>,
    pub response_headers: Option<HashMap<String, String>>,
    pub response_body: Option<String>,
    pub response_size: Option<i64>,
    pub elapsed_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl HttpRequestPatch {
    pub fn is_empty(&self) -> bool {
        self.status_code.is_none()
            && self.response_headers.is_none()
            && self.response_body.is_none()
            && self.response_size.is_none()
            && self.elapsed_ms.is_none()
            && self.error_message.is_none()
    }
}

/// Patch response fields. No-op (no UPDATE issued) if `patch` is empty.
pub fn update_sync(conn: &Connection, id: i64, patch: &HttpRequestPatch) -> rusqlite::Result<()> {
    if patch.is_empty() {
        return Ok(());
    }
    conn.execute(
        "UPDATE http_requests SET \
            status_code = COALESCE(?1, status_code), \
            response_headers = COALESCE(?2, response_headers), \
            response_body = COALESCE(?3, response_body), \
            response_size = COALESCE(?4, response_size), \
            elapsed_ms = COALESCE(?5, elapsed_ms), \
            error_message = COALESCE(?6, error_message) \
         WHERE id = ?7",
        params![
            patch.status_code.map(|c| c as i64),
            patch.response_headers.as_ref().map(encode_string_map),
            patch.response_body,
            patch.response_size,
            patch.elapsed_ms,
            patch.error_message,
            id,
        ],
    )?;
    Ok(())
}

pub fn get_sync(conn: &Connection, id: i64) -> rusqlite::Result<Option<HttpRequestRecord>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM http_requests WHERE id = ?1"),
        params![id],
        row_to_request,
    )
    .optional()
}

/// Idempotent insert into the target<->request join table.
pub fn link_to_target_sync(conn: &Connection, request_id: i64, target_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO target_http_requests (target_id, request_id, created_at) \
         VALUES (?1, ?2, ?3)",
        params![target_id, request_id, to_rfc3339(&Utc::now())],
    )?;
    Ok(())
}

/// Most recent N requests for `mission_id`, newest first.
pub fn recent_for_mission_sync(
    conn: &Connection,
    mission_id: i64,
    limit: i64,
) -> rusqlite::Result<Vec<HttpRequestRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM http_requests \
         WHERE mission_id = ?1 ORDER BY created_at DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![mission_id, limit], row_to_request)?;
    rows.collect()
}

/// Delete requests older than `days`. Returns the number of rows deleted.
/// Cascades to join-table rows via `ON DELETE CASCADE`.
pub fn cleanup_old_requests_sync(conn: &Connection, days: i64) -> rusqlite::Result<usize> {
    let cutoff = to_rfc3339(&(Utc::now() - Duration::days(days)));
    conn.execute("DELETE FROM http_requests WHERE created_at < ?1", params![cutoff])
}

/// Session-factory wrapper: each method opens its own pool scope, so a
/// later network failure does not abort the insert already committed.
pub struct HttpRequestRepository {
    pool: Arc<DatabasePool>,
}

impl HttpRequestRepository {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, req: NewHttpRequest) -> Result<i64, ServerError> {
        self.pool.run(move |conn| create_sync(conn, &req)).await
    }

    pub async fn update(&self, id: i64, patch: HttpRequestPatch) -> Result<(), ServerError> {
        self.pool.run(move |conn| update_sync(conn, id, &patch)).await
    }

    pub async fn link_to_target(&self, request_id: i64, target_id: i64) -> Result<(), ServerError> {
        self.pool
            .run(move |conn| link_to_target_sync(conn, request_id, target_id))
            .await
    }

    pub async fn recent_for_mission(
        &self,
        mission_id: i64,
        limit: i64,
    ) -> Result<Vec<HttpRequestRecord>, ServerError> {
        self.pool
            .run(move |conn| recent_for_mission_sync(conn, mission_id, limit))
            .await
    }

    pub async fn cleanup_old_requests(&self, days: i64) -> Result<usize, ServerError> {
        self.pool.run(move |conn| cleanup_old_requests_sync(conn, days)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn update_is_noop_on_empty_patch() {
        let conn = setup();
        let id = create_sync(
            &conn,
            &NewHttpRequest {
                method: "GET".into(),
                url: "https://x/".into(),
                host: "x".into(),
                path: "/".into(),
                ..Default::default()
            },
        )
        .unwrap();
        update_sync(&conn, id, &HttpRequestPatch::default()).unwrap();
        let row = get_sync(&conn, id).unwrap().unwrap();
        assert!(row.status_code.is_none());
        assert!(row.error_message.is_none());
    }

    #[test]
    fn link_to_target_is_idempotent() {
        let conn = setup();
        let target = crate::repositories::target::get_or_create_from_url_sync(&conn, "https://x/").unwrap();
        let id = create_sync(
            &conn,
            &NewHttpRequest {
                method: "GET".into(),
                url: "https://x/".into(),
                host: "x".into(),
                path: "/".into(),
                ..Default::default()
            },
        )
        .unwrap();
        link_to_target_sync(&conn, id, target.id).unwrap();
        link_to_target_sync(&conn, id, target.id).unwrap();

        let count: i64 = conn
            .query_row("SELECT count(*) FROM target_http_requests", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn terminal_request_has_exactly_one_of_status_or_error() {
        let conn = setup();
        let id = create_sync(
            &conn,
            &NewHttpRequest {
                method: "GET".into(),
                url: "https://x/".into(),
                host: "x".into(),
                path: "/".into(),
                ..Default::default()
            },
        )
        .unwrap();
        update_sync(
            &conn,
            id,
            &HttpRequestPatch {
                status_code: Some(200),
                elapsed_ms: Some(12),
                ..Default::default()
            },
        )
        .unwrap();
        let row = get_sync(&conn, id).unwrap().unwrap();
        assert!(row.is_terminal());
    }
}
