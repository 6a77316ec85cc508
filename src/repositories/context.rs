// src/repositories/context.rs
// Immutable Context Versioning: append-only versions per target, current
// pointer, rollback. The "compute next version + insert + advance pointer"
// sequence is wrapped in `BEGIN IMMEDIATE` so two concurrent writers on the
// same target cannot observe the same `max(version)` and collide.

use crate::db::codec::{parse_rfc3339, to_rfc3339};
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::{ChangeType, TargetContext};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

fn row_to_context(row: &Row<'_>) -> rusqlite::Result<TargetContext> {
    let change_type_raw: String = row.get("change_type")?;
    Ok(TargetContext {
        id: row.get("id")?,
        target_id: row.get("target_id")?,
        version: row.get("version")?,
        user_context: row.get("user_context")?,
        agent_context: row.get("agent_context")?,
        parent_version_id: row.get("parent_version_id")?,
        change_type: change_type_raw.parse().unwrap_or(ChangeType::System),
        change_summary: row.get("change_summary")?,
        created_by: row.get("created_by")?,
        is_major_version: row.get("is_major_version")?,
        tokens_count: row.get("tokens_count")?,
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
    })
}

const SELECT_COLUMNS: &str = "id, target_id, version, user_context, agent_context, \
     parent_version_id, change_type, change_summary, created_by, is_major_version, \
     tokens_count, created_at";

fn tokens_count(user_context: Option<&str>, agent_context: Option<&str>) -> i64 {
    let len = user_context.unwrap_or("").len() + agent_context.unwrap_or("").len();
    (len / 4) as i64
}

#[derive(Debug, Clone, Default)]
pub struct NewVersion {
    pub target_id: i64,
    pub user_context: Option<String>,
    pub agent_context: Option<String>,
    pub created_by: String,
    pub change_type: ChangeType,
    pub change_summary: Option<String>,
    pub parent_version_id: Option<i64>,
    pub is_major_version: bool,
}

impl Default for ChangeType {
    fn default() -> Self {
        ChangeType::System
    }
}

/// Create the next version for `new.target_id`, advancing the target's
/// current pointer atomically.
pub fn create_version_sync(conn: &Connection, new: &NewVersion) -> rusqlite::Result<TargetContext> {
    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = (|| {
        let next_version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM target_contexts WHERE target_id = ?1",
            params![new.target_id],
            |row| row.get(0),
        )?;

        let parent_version_id = match new.parent_version_id {
            Some(id) => Some(id),
            None => conn
                .query_row(
                    "SELECT current_context_id FROM targets WHERE id = ?1",
                    params![new.target_id],
                    |row| row.get::<_, Option<i64>>(0),
                )
                .optional()?
                .flatten(),
        };

        let tokens = tokens_count(new.user_context.as_deref(), new.agent_context.as_deref());
        let now = to_rfc3339(&Utc::now());

        conn.execute(
            "INSERT INTO target_contexts \
                (target_id, version, user_context, agent_context, parent_version_id, \
                 change_type, change_summary, created_by, is_major_version, tokens_count, \
                 created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new.target_id,
                next_version,
                new.user_context,
                new.agent_context,
                parent_version_id,
                new.change_type.as_str(),
                new.change_summary,
                new.created_by,
                new.is_major_version,
                tokens,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE targets SET current_context_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![id, now, new.target_id],
        )?;

        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM target_contexts WHERE id = ?1"),
            params![id],
            row_to_context,
        )
    })();

    match result {
        Ok(context) => {
            conn.execute_batch("COMMIT")?;
            Ok(context)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

pub fn get_current_sync(conn: &Connection, target_id: i64) -> rusqlite::Result<Option<TargetContext>> {
    conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM target_contexts \
             WHERE id = (SELECT current_context_id FROM targets WHERE id = ?1)"
        ),
        params![target_id],
        row_to_context,
    )
    .optional()
}

pub fn get_version_sync(conn: &Connection, id: i64) -> rusqlite::Result<Option<TargetContext>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM target_contexts WHERE id = ?1"),
        params![id],
        row_to_context,
    )
    .optional()
}

pub fn get_version_by_number_sync(
    conn: &Connection,
    target_id: i64,
    version: i64,
) -> rusqlite::Result<Option<TargetContext>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM target_contexts WHERE target_id = ?1 AND version = ?2"),
        params![target_id, version],
        row_to_context,
    )
    .optional()
}

pub fn list_versions_sync(
    conn: &Connection,
    target_id: i64,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<TargetContext>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM target_contexts WHERE target_id = ?1 \
         ORDER BY version DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![target_id, limit, offset], row_to_context)?;
    rows.collect()
}

/// Substring match over `user_context`, `agent_context`, `change_summary`.
pub fn search_contexts_sync(
    conn: &Connection,
    query: &str,
    target_ids: Option<&[i64]>,
    limit: i64,
) -> rusqlite::Result<Vec<TargetContext>> {
    let pattern = format!("%{query}%");
    let sql = if let Some(ids) = target_ids {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        format!(
            "SELECT {SELECT_COLUMNS} FROM target_contexts \
             WHERE (user_context LIKE ?1 OR agent_context LIKE ?1 OR change_summary LIKE ?1) \
               AND target_id IN ({placeholders}) \
             ORDER BY created_at DESC LIMIT ?2"
        )
    } else {
        format!(
            "SELECT {SELECT_COLUMNS} FROM target_contexts \
             WHERE user_context LIKE ?1 OR agent_context LIKE ?1 OR change_summary LIKE ?1 \
             ORDER BY created_at DESC LIMIT ?2"
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows = if let Some(ids) = target_ids {
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(pattern)];
        for id in ids {
            params.push(Box::new(*id));
        }
        params.push(Box::new(limit));
        let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        stmt.query_map(refs.as_slice(), row_to_context)?.collect()
    } else {
        stmt.query_map(params![pattern, limit], row_to_context)?.collect()
    };
    rows
}

/// Create a new version whose bodies are copied from `version_id`,
/// preserving append-only semantics (no mutation of history).
pub fn rollback_to_version_sync(
    conn: &Connection,
    target_id: i64,
    version_id: i64,
) -> rusqlite::Result<TargetContext> {
    let source = get_version_sync(conn, version_id)?.ok_or_else(|| {
        rusqlite::Error::QueryReturnedNoRows
    })?;

    create_version_sync(
        conn,
        &NewVersion {
            target_id,
            user_context: source.user_context.clone(),
            agent_context: source.agent_context.clone(),
            created_by: "system".to_string(),
            change_type: ChangeType::Rollback,
            change_summary: Some(format!("Rolled back to version {}", source.version)),
            parent_version_id: Some(version_id),
            is_major_version: false,
        },
    )
}

/// Session-factory wrapper.
pub struct ContextRepository {
    pool: Arc<DatabasePool>,
}

impl ContextRepository {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    pub async fn create_version(&self, new: NewVersion) -> Result<TargetContext, ServerError> {
        self.pool.run(move |conn| create_version_sync(conn, &new)).await
    }

    pub async fn get_current(&self, target_id: i64) -> Result<Option<TargetContext>, ServerError> {
        self.pool.run(move |conn| get_current_sync(conn, target_id)).await
    }

    pub async fn get_version(&self, id: i64) -> Result<Option<TargetContext>, ServerError> {
        self.pool.run(move |conn| get_version_sync(conn, id)).await
    }

    pub async fn get_version_by_number(
        &self,
        target_id: i64,
        version: i64,
    ) -> Result<Option<TargetContext>, ServerError> {
        self.pool
            .run(move |conn| get_version_by_number_sync(conn, target_id, version))
            .await
    }

    pub async fn list_versions(
        &self,
        target_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TargetContext>, ServerError> {
        self.pool
            .run(move |conn| list_versions_sync(conn, target_id, limit, offset))
            .await
    }

    pub async fn rollback_to_version(
        &self,
        target_id: i64,
        version_id: i64,
    ) -> Result<TargetContext, ServerError> {
        self.pool
            .run(move |conn| rollback_to_version_sync(conn, target_id, version_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_all_migrations(&conn).unwrap();
        let target =
            crate::repositories::target::get_or_create_from_url_sync(&conn, "https://x/").unwrap();
        (conn, target.id)
    }

    #[test]
    fn versions_chain_via_parent_pointer() {
        let (conn, target_id) = setup();
        let v1 = create_version_sync(
            &conn,
            &NewVersion {
                target_id,
                user_context: Some("A".into()),
                created_by: "user".into(),
                change_type: ChangeType::UserEdit,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(v1.version, 1);
        assert!(v1.parent_version_id.is_none());

        let v2 = create_version_sync(
            &conn,
            &NewVersion {
                target_id,
                user_context: Some("B".into()),
                created_by: "user".into(),
                change_type: ChangeType::UserEdit,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.parent_version_id, Some(v1.id));
    }

    #[test]
    fn rollback_preserves_history_and_copies_body() {
        let (conn, target_id) = setup();
        let v1 = create_version_sync(
            &conn,
            &NewVersion {
                target_id,
                user_context: Some("A".into()),
                created_by: "user".into(),
                ..Default::default()
            },
        )
        .unwrap();
        create_version_sync(
            &conn,
            &NewVersion {
                target_id,
                user_context: Some("B".into()),
                created_by: "user".into(),
                ..Default::default()
            },
        )
        .unwrap();
        create_version_sync(
            &conn,
            &NewVersion {
                target_id,
                user_context: Some("C".into()),
                created_by: "user".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let rolled = rollback_to_version_sync(&conn, target_id, v1.id).unwrap();
        assert_eq!(rolled.version, 4);
        assert_eq!(rolled.user_context, Some("A".into()));
        assert_eq!(rolled.change_type, ChangeType::Rollback);
        assert_eq!(rolled.parent_version_id, Some(v1.id));

        let still_a = get_version_sync(&conn, v1.id).unwrap().unwrap();
        assert_eq!(still_a.user_context, Some("A".into()));

        let current = get_current_sync(&conn, target_id).unwrap().unwrap();
        assert_eq!(current.id, rolled.id);
    }

    #[test]
    fn tokens_count_is_quarter_of_combined_length() {
        let (conn, target_id) = setup();
        let v = create_version_sync(
            &conn,
            &NewVersion {
                target_id,
                user_context: Some("abcd".into()),
                agent_context: Some("wxyz".into()),
                created_by: "user".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(v.tokens_count, 2);
    }
}
