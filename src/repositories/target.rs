// src/repositories/target.rs
// Target aggregate: upsert-by-endpoint, status/risk updates, search.

use crate::db::codec::{decode_json_map, encode_json_map, parse_rfc3339, to_rfc3339};
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::{RiskLevel, Target, TargetStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use url::Url;

fn row_to_target(row: &Row<'_>) -> rusqlite::Result<Target> {
    let protocol_raw: String = row.get("protocol")?;
    let status_raw: String = row.get("status")?;
    let risk_raw: String = row.get("risk_level")?;
    let extra_data_raw: String = row.get("extra_data")?;

    Ok(Target {
        id: row.get("id")?,
        host: row.get("host")?,
        port: row.get::<_, Option<i64>>("port")?.map(|p| p as u16),
        protocol: protocol_raw.parse().unwrap_or(crate::models::Protocol::Http),
        title: row.get("title")?,
        status: status_raw.parse().unwrap_or(TargetStatus::Active),
        risk_level: risk_raw.parse().unwrap_or(RiskLevel::Low),
        discovery_date: parse_rfc3339(&row.get::<_, String>("discovery_date")?),
        last_activity: parse_rfc3339(&row.get::<_, String>("last_activity")?),
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
        updated_at: parse_rfc3339(&row.get::<_, String>("updated_at")?),
        extra_data: decode_json_map(&extra_data_raw),
        current_context_id: row.get("current_context_id")?,
    })
}

const SELECT_COLUMNS: &str = "id, host, port, protocol, title, status, risk_level, \
     discovery_date, last_activity, created_at, updated_at, extra_data, current_context_id";

/// Parse `url`, upsert the `(host, port, protocol)` target, and bump
/// `last_activity`. Title defaults to `host:port/protocol` on first insert.
pub fn get_or_create_from_url_sync(conn: &Connection, url: &str) -> rusqlite::Result<Target> {
    let parsed = Url::parse(url)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    let host = parsed.host_str().unwrap_or("").to_string();
    let port = parsed.port().map(|p| p as i64);
    let protocol = parsed.scheme().to_string();
    let now = to_rfc3339(&Utc::now());
    let title = format!(
        "{}:{}/{}",
        host,
        port.map(|p| p.to_string()).unwrap_or_else(|| "default".to_string()),
        protocol
    );

    conn.execute(
        &format!(
            "INSERT INTO targets (host, port, protocol, title, status, risk_level, \
                 discovery_date, last_activity, created_at, updated_at, extra_data) \
             VALUES (?1, ?2, ?3, ?4, 'active', 'low', ?5, ?5, ?5, ?5, '{{}}') \
             ON CONFLICT(host, port, protocol) DO UPDATE SET last_activity = ?5"
        ),
        params![host, port, protocol, title, now],
    )?;

    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM targets WHERE host = ?1 AND port IS ?2 AND protocol = ?3"),
        params![host, port, protocol],
        row_to_target,
    )
}

pub fn get_sync(conn: &Connection, id: i64) -> rusqlite::Result<Option<Target>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM targets WHERE id = ?1"),
        params![id],
        row_to_target,
    )
    .optional()
}

pub fn update_status_sync(
    conn: &Connection,
    id: i64,
    status: TargetStatus,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE targets SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), to_rfc3339(&Utc::now()), id],
    )?;
    Ok(())
}

pub fn update_risk_level_sync(
    conn: &Connection,
    id: i64,
    risk_level: RiskLevel,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE targets SET risk_level = ?1, updated_at = ?2 WHERE id = ?3",
        params![risk_level.as_str(), to_rfc3339(&Utc::now()), id],
    )?;
    Ok(())
}

/// Advance the current-context pointer. Called by the context versioner
/// after inserting a new version.
pub fn set_current_context_sync(
    conn: &Connection,
    target_id: i64,
    context_id: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE targets SET current_context_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![context_id, to_rfc3339(&Utc::now()), target_id],
    )?;
    Ok(())
}

pub fn search_sync(conn: &Connection, query: &str, limit: i64) -> rusqlite::Result<Vec<Target>> {
    let pattern = format!("%{query}%");
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM targets \
         WHERE host LIKE ?1 OR title LIKE ?1 \
         ORDER BY last_activity DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![pattern, limit], row_to_target)?;
    rows.collect()
}

pub fn update_extra_data_sync(
    conn: &Connection,
    id: i64,
    extra_data: &std::collections::HashMap<String, serde_json::Value>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE targets SET extra_data = ?1, updated_at = ?2 WHERE id = ?3",
        params![encode_json_map(extra_data), to_rfc3339(&Utc::now()), id],
    )?;
    Ok(())
}

/// Session-factory wrapper: each method opens its own pool scope.
pub struct TargetRepository {
    pool: Arc<DatabasePool>,
}

impl TargetRepository {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    pub async fn get_or_create_from_url(&self, url: &str) -> Result<Target, ServerError> {
        let url = url.to_string();
        self.pool.run(move |conn| get_or_create_from_url_sync(conn, &url)).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Target>, ServerError> {
        self.pool.run(move |conn| get_sync(conn, id)).await
    }

    pub async fn update_status(&self, id: i64, status: TargetStatus) -> Result<(), ServerError> {
        self.pool.run(move |conn| update_status_sync(conn, id, status)).await
    }

    pub async fn update_risk_level(&self, id: i64, risk_level: RiskLevel) -> Result<(), ServerError> {
        self.pool.run(move |conn| update_risk_level_sync(conn, id, risk_level)).await
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<Target>, ServerError> {
        let query = query.to_string();
        self.pool.run(move |conn| search_sync(conn, &query, limit)).await
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
    fn upsert_is_idempotent_and_bumps_activity() {
        let conn = setup();
        let first = get_or_create_from_url_sync(&conn, "https://api.example.com/v1/users").unwrap();
        assert_eq!(first.host, "api.example.com");
        assert_eq!(first.port, None);
        assert_eq!(first.protocol, crate::models::Protocol::Https);
        assert_eq!(first.status, TargetStatus::Active);
        assert_eq!(first.risk_level, RiskLevel::Low);

        let second = get_or_create_from_url_sync(&conn, "https://api.example.com/v2/orders").unwrap();
        assert_eq!(first.id, second.id);

        let count: i64 = conn.query_row("SELECT count(*) FROM targets", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
