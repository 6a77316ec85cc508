// src/repositories/mission.rs
// Mission aggregate: CRUD plus the mission<->target join.

use crate::db::codec::{
    decode_json_map, decode_string_list, embedding_to_bytes, encode_json_map, encode_string_list,
    parse_rfc3339, parse_rfc3339_opt, to_rfc3339,
};
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::{Mission, MissionStatus, MissionType};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

fn row_to_mission(row: &Row<'_>) -> rusqlite::Result<Mission> {
    let mission_type_raw: String = row.get("mission_type")?;
    let status_raw: String = row.get("status")?;
    Ok(Mission {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        mission_type: mission_type_raw.parse().unwrap_or(MissionType::General),
        hypothesis: row.get("hypothesis")?,
        goal: row.get("goal")?,
        scope: decode_json_map(&row.get::<_, String>("scope")?),
        findings: row.get("findings")?,
        patterns: row.get("patterns")?,
        successful_techniques: decode_string_list(&row.get::<_, String>("successful_techniques")?),
        confidence_score: row.get("confidence_score")?,
        status: status_raw.parse().unwrap_or(MissionStatus::Active),
        extra_data: decode_json_map(&row.get::<_, String>("extra_data")?),
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
        completed_at: parse_rfc3339_opt(row.get("completed_at")?),
        goal_embedding: row
            .get::<_, Option<Vec<u8>>>("goal_embedding")?
            .map(|b| crate::db::codec::bytes_to_embedding(&b)),
        hypothesis_embedding: row
            .get::<_, Option<Vec<u8>>>("hypothesis_embedding")?
            .map(|b| crate::db::codec::bytes_to_embedding(&b)),
    })
}

const SELECT_COLUMNS: &str = "id, name, description, mission_type, hypothesis, goal, scope, \
     findings, patterns, successful_techniques, confidence_score, status, extra_data, \
     created_at, completed_at, goal_embedding, hypothesis_embedding";

#[derive(Debug, Clone, Default)]
pub struct NewMission {
    pub name: String,
    pub description: Option<String>,
    pub mission_type: MissionType,
    pub hypothesis: Option<String>,
    pub goal: String,
    pub scope: std::collections::HashMap<String, serde_json::Value>,
}

impl Default for MissionType {
    fn default() -> Self {
        MissionType::General
    }
}

pub fn create_sync(conn: &Connection, new: &NewMission) -> rusqlite::Result<Mission> {
    let now = to_rfc3339(&Utc::now());
    conn.execute(
        "INSERT INTO missions \
            (name, description, mission_type, hypothesis, goal, scope, successful_techniques, \
             confidence_score, status, extra_data, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', 0.0, 'active', '{}', ?7)",
        params![
            new.name,
            new.description,
            new.mission_type.as_str(),
            new.hypothesis,
            new.goal,
            encode_json_map(&new.scope),
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_sync(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_sync(conn: &Connection, id: i64) -> rusqlite::Result<Option<Mission>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM missions WHERE id = ?1"),
        params![id],
        row_to_mission,
    )
    .optional()
}

pub fn link_to_target_sync(conn: &Connection, mission_id: i64, target_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO mission_targets (mission_id, target_id, created_at) VALUES (?1, ?2, ?3)",
        params![mission_id, target_id, to_rfc3339(&Utc::now())],
    )?;
    Ok(())
}

pub fn set_embeddings_sync(
    conn: &Connection,
    id: i64,
    goal_embedding: Option<&[f32]>,
    hypothesis_embedding: Option<&[f32]>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE missions SET \
            goal_embedding = COALESCE(?1, goal_embedding), \
            hypothesis_embedding = COALESCE(?2, hypothesis_embedding) \
         WHERE id = ?3",
        params![
            goal_embedding.map(embedding_to_bytes),
            hypothesis_embedding.map(embedding_to_bytes),
            id,
        ],
    )?;
    Ok(())
}

pub fn complete_sync(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE missions SET status = 'completed', completed_at = ?1 WHERE id = ?2",
        params![to_rfc3339(&Utc::now()), id],
    )?;
    Ok(())
}

/// Cascades to mission_actions and the join tables via `ON DELETE CASCADE`.
pub fn delete_sync(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM missions WHERE id = ?1", params![id])?;
    Ok(())
}

/// Session-factory wrapper. The mission service batches writes inside an
/// outer scope, so most callers go through `src::missions` instead of this
/// type directly; it remains useful for isolated reads.
pub struct MissionRepository {
    pool: Arc<DatabasePool>,
}

impl MissionRepository {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewMission) -> Result<Mission, ServerError> {
        self.pool.run(move |conn| create_sync(conn, &new)).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Mission>, ServerError> {
        self.pool.run(move |conn| get_sync(conn, id)).await
    }

    pub async fn link_to_target(&self, mission_id: i64, target_id: i64) -> Result<(), ServerError> {
        self.pool
            .run(move |conn| link_to_target_sync(conn, mission_id, target_id))
            .await
    }

    pub async fn complete(&self, id: i64) -> Result<(), ServerError> {
        self.pool.run(move |conn| complete_sync(conn, id)).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServerError> {
        self.pool.run(move |conn| delete_sync(conn, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_requires_completed_at_consistent_with_status() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        let mission = create_sync(
            &conn,
            &NewMission {
                name: "recon".into(),
                goal: "map the surface".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(mission.completed_at.is_none());

        complete_sync(&conn, mission.id).unwrap();
        let reloaded = get_sync(&conn, mission.id).unwrap().unwrap();
        assert_eq!(reloaded.status, MissionStatus::Completed);
        assert!(reloaded.completed_at.is_some());
        assert!(reloaded.completed_at.unwrap() >= reloaded.created_at);
    }
}
