// src/repositories/action.rs
// MissionAction aggregate: one attempted technique within a mission.

use crate::db::codec::{
    bytes_to_embedding, decode_json_map, embedding_to_bytes, encode_json_map, parse_rfc3339,
    to_rfc3339,
};
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::{ActionType, MissionAction};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::Arc;

fn row_to_action(row: &Row<'_>) -> rusqlite::Result<MissionAction> {
    let action_type_raw: String = row.get("action_type")?;
    Ok(MissionAction {
        id: row.get("id")?,
        mission_id: row.get("mission_id")?,
        action_type: action_type_raw.parse().unwrap_or(ActionType::Recon),
        technique: row.get("technique")?,
        payload: row.get("payload")?,
        result: row.get("result")?,
        success: row.get("success")?,
        learning: row.get("learning")?,
        action_embedding: row
            .get::<_, Option<Vec<u8>>>("action_embedding")?
            .map(|b| bytes_to_embedding(&b)),
        result_embedding: row
            .get::<_, Option<Vec<u8>>>("result_embedding")?
            .map(|b| bytes_to_embedding(&b)),
        meta_data: decode_json_map(&row.get::<_, String>("meta_data")?),
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
    })
}

const SELECT_COLUMNS: &str = "id, mission_id, action_type, technique, payload, result, success, \
     learning, action_embedding, result_embedding, meta_data, created_at";

impl Default for ActionType {
    fn default() -> Self {
        ActionType::Recon
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAction {
    pub mission_id: i64,
    pub action_type: ActionType,
    pub technique: String,
    pub payload: Option<String>,
    pub result: Option<String>,
    pub success: bool,
    pub learning: Option<String>,
}

pub fn create_sync(conn: &Connection, new: &NewAction) -> rusqlite::Result<MissionAction> {
    conn.execute(
        "INSERT INTO mission_actions \
            (mission_id, action_type, technique, payload, result, success, learning, \
             meta_data, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '{}', ?8)",
        params![
            new.mission_id,
            new.action_type.as_str(),
            new.technique,
            new.payload,
            new.result,
            new.success,
            new.learning,
            to_rfc3339(&Utc::now()),
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_sync(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_sync(conn: &Connection, id: i64) -> rusqlite::Result<Option<MissionAction>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM mission_actions WHERE id = ?1"),
        params![id],
        row_to_action,
    )
    .optional()
}

pub fn set_embeddings_sync(
    conn: &Connection,
    id: i64,
    action_embedding: Option<&[f32]>,
    result_embedding: Option<&[f32]>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE mission_actions SET \
            action_embedding = COALESCE(?1, action_embedding), \
            result_embedding = COALESCE(?2, result_embedding) \
         WHERE id = ?3",
        params![
            action_embedding.map(embedding_to_bytes),
            result_embedding.map(embedding_to_bytes),
            id,
        ],
    )?;
    Ok(())
}

/// Idempotent insert into the action<->request join table.
pub fn link_request_sync(conn: &Connection, action_id: i64, request_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO mission_action_http_requests (action_id, request_id, created_at) \
         VALUES (?1, ?2, ?3)",
        params![action_id, request_id, to_rfc3339(&Utc::now())],
    )?;
    Ok(())
}

#[derive(Serialize)]
pub struct MissionStats {
    pub total_actions: i64,
    pub successful_actions: i64,
    pub success_rate: f64,
    pub unique_techniques: i64,
}

pub fn stats_for_mission_sync(conn: &Connection, mission_id: i64) -> rusqlite::Result<MissionStats> {
    let (total, successful, unique): (i64, i64, i64) = conn.query_row(
        "SELECT count(*), \
                coalesce(sum(success), 0), \
                count(DISTINCT technique) \
         FROM mission_actions WHERE mission_id = ?1",
        params![mission_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let success_rate = if total > 0 {
        successful as f64 / total as f64
    } else {
        0.0
    };

    Ok(MissionStats {
        total_actions: total,
        successful_actions: successful,
        success_rate,
        unique_techniques: unique,
    })
}

pub fn recent_for_mission_sync(
    conn: &Connection,
    mission_id: i64,
    limit: i64,
) -> rusqlite::Result<Vec<MissionAction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM mission_actions \
         WHERE mission_id = ?1 ORDER BY created_at DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![mission_id, limit], row_to_action)?;
    rows.collect()
}

/// Session-factory wrapper.
pub struct MissionActionRepository {
    pool: Arc<DatabasePool>,
}

impl MissionActionRepository {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewAction) -> Result<MissionAction, ServerError> {
        self.pool.run(move |conn| create_sync(conn, &new)).await
    }

    pub async fn link_request(&self, action_id: i64, request_id: i64) -> Result<(), ServerError> {
        self.pool.run(move |conn| link_request_sync(conn, action_id, request_id)).await
    }

    pub async fn stats_for_mission(&self, mission_id: i64) -> Result<MissionStats, ServerError> {
        self.pool.run(move |conn| stats_for_mission_sync(conn, mission_id)).await
    }

    pub async fn recent_for_mission(
        &self,
        mission_id: i64,
        limit: i64,
    ) -> Result<Vec<MissionAction>, ServerError> {
        self.pool
            .run(move |conn| recent_for_mission_sync(conn, mission_id, limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        let mission = crate::repositories::mission::create_sync(
            &conn,
            &crate::repositories::mission::NewMission {
                name: "m".into(),
                goal: "g".into(),
                ..Default::default()
            },
        )
        .unwrap();
        (conn, mission.id)
    }

    #[test]
    fn record_action_increments_total_by_one() {
        let (conn, mission_id) = setup();
        let before = stats_for_mission_sync(&conn, mission_id).unwrap();
        create_sync(
            &conn,
            &NewAction {
                mission_id,
                technique: "SQLi".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let after = stats_for_mission_sync(&conn, mission_id).unwrap();
        assert_eq!(after.total_actions, before.total_actions + 1);
    }
}
