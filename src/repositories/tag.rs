// src/repositories/tag.rs
// RequestTag aggregate: free-form tags on requests, unique per (request_id, tag).

use crate::db::codec::{parse_rfc3339, to_rfc3339};
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::RequestTag;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::Arc;

pub fn add_sync(conn: &Connection, request_id: i64, tag: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO request_tags (request_id, tag, created_at) VALUES (?1, ?2, ?3)",
        params![request_id, tag, to_rfc3339(&Utc::now())],
    )?;
    Ok(())
}

pub fn list_for_request_sync(conn: &Connection, request_id: i64) -> rusqlite::Result<Vec<RequestTag>> {
    let mut stmt = conn.prepare(
        "SELECT request_id, tag, created_at FROM request_tags WHERE request_id = ?1 ORDER BY tag",
    )?;
    let rows = stmt.query_map(params![request_id], |row| {
        Ok(RequestTag {
            request_id: row.get(0)?,
            tag: row.get(1)?,
            created_at: parse_rfc3339(&row.get::<_, String>(2)?),
        })
    })?;
    rows.collect()
}

pub fn remove_sync(conn: &Connection, request_id: i64, tag: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM request_tags WHERE request_id = ?1 AND tag = ?2",
        params![request_id, tag],
    )?;
    Ok(())
}

/// Session-factory wrapper.
pub struct RequestTagRepository {
    pool: Arc<DatabasePool>,
}

impl RequestTagRepository {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    pub async fn add(&self, request_id: i64, tag: &str) -> Result<(), ServerError> {
        let tag = tag.to_string();
        self.pool.run(move |conn| add_sync(conn, request_id, &tag)).await
    }

    pub async fn list_for_request(&self, request_id: i64) -> Result<Vec<RequestTag>, ServerError> {
        self.pool.run(move |conn| list_for_request_sync(conn, request_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_per_request_and_tag() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        let id = crate::repositories::http_request::create_sync(
            &conn,
            &crate::repositories::http_request::NewHttpRequest {
                method: "GET".into(),
                url: "https://x/".into(),
                host: "x".into(),
                path: "/".into(),
                ..Default::default()
            },
        )
        .unwrap();
        add_sync(&conn, id, "sqli").unwrap();
        add_sync(&conn, id, "sqli").unwrap();
        let tags = list_for_request_sync(&conn, id).unwrap();
        assert_eq!(tags.len(), 1);
    }
}
