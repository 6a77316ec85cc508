// src/db/schema.rs
// Base schema for all entities in the data model.

use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS targets (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    host                TEXT NOT NULL,
    port                INTEGER,
    protocol            TEXT NOT NULL,
    title               TEXT NOT NULL,
    status              TEXT NOT NULL DEFAULT 'active',
    risk_level          TEXT NOT NULL DEFAULT 'low',
    discovery_date      TEXT NOT NULL,
    last_activity       TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    extra_data          TEXT NOT NULL DEFAULT '{}',
    current_context_id  INTEGER REFERENCES target_contexts(id),
    UNIQUE (host, port, protocol)
);

CREATE TABLE IF NOT EXISTS target_contexts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id           INTEGER NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
    version             INTEGER NOT NULL,
    user_context        TEXT,
    agent_context       TEXT,
    parent_version_id   INTEGER REFERENCES target_contexts(id),
    change_type         TEXT NOT NULL,
    change_summary       TEXT,
    created_by          TEXT NOT NULL,
    is_major_version     INTEGER NOT NULL DEFAULT 0,
    tokens_count         INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    UNIQUE (target_id, version)
);

CREATE INDEX IF NOT EXISTS idx_target_contexts_target ON target_contexts(target_id, version DESC);

CREATE TABLE IF NOT EXISTS missions (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    name                    TEXT NOT NULL,
    description             TEXT,
    mission_type            TEXT NOT NULL,
    hypothesis              TEXT,
    goal                    TEXT NOT NULL,
    scope                   TEXT NOT NULL DEFAULT '{}',
    findings                TEXT,
    patterns                TEXT,
    successful_techniques   TEXT NOT NULL DEFAULT '[]',
    confidence_score        REAL NOT NULL DEFAULT 0.0,
    status                  TEXT NOT NULL DEFAULT 'active',
    extra_data              TEXT NOT NULL DEFAULT '{}',
    created_at              TEXT NOT NULL,
    completed_at            TEXT,
    goal_embedding          BLOB,
    hypothesis_embedding    BLOB
);

CREATE TABLE IF NOT EXISTS mission_actions (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    mission_id          INTEGER NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
    action_type         TEXT NOT NULL,
    technique           TEXT NOT NULL,
    payload             TEXT,
    result              TEXT,
    success             INTEGER NOT NULL DEFAULT 0,
    learning            TEXT,
    action_embedding    BLOB,
    result_embedding    BLOB,
    meta_data           TEXT NOT NULL DEFAULT '{}',
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mission_actions_mission ON mission_actions(mission_id, created_at DESC);

CREATE TABLE IF NOT EXISTS http_requests (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    mission_id          INTEGER REFERENCES missions(id) ON DELETE SET NULL,
    method              TEXT NOT NULL,
    url                 TEXT NOT NULL,
    host                TEXT NOT NULL,
    path                TEXT NOT NULL,
    query_params        TEXT NOT NULL DEFAULT '{}',
    headers             TEXT NOT NULL DEFAULT '{}',
    cookies             TEXT NOT NULL DEFAULT '{}',
    request_body        TEXT,
    status_code         INTEGER,
    response_headers    TEXT,
    response_body       TEXT,
    response_size       INTEGER,
    elapsed_ms          INTEGER,
    error_message       TEXT,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_http_requests_mission ON http_requests(mission_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_http_requests_created_at ON http_requests(created_at);

CREATE TABLE IF NOT EXISTS target_http_requests (
    target_id       INTEGER NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
    request_id      INTEGER NOT NULL REFERENCES http_requests(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (target_id, request_id)
);

CREATE TABLE IF NOT EXISTS mission_targets (
    mission_id      INTEGER NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
    target_id       INTEGER NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (mission_id, target_id)
);

CREATE TABLE IF NOT EXISTS mission_action_http_requests (
    action_id       INTEGER NOT NULL REFERENCES mission_actions(id) ON DELETE CASCADE,
    request_id      INTEGER NOT NULL REFERENCES http_requests(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (action_id, request_id)
);

CREATE TABLE IF NOT EXISTS technique_library (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    category            TEXT,
    title               TEXT NOT NULL,
    content             TEXT NOT NULL,
    content_embedding   BLOB,
    meta_data           TEXT NOT NULL DEFAULT '{}',
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS request_tags (
    request_id      INTEGER NOT NULL REFERENCES http_requests(id) ON DELETE CASCADE,
    tag             TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (request_id, tag)
);
"#;

/// Create every table and index if absent. Idempotent; safe to run on every
/// pool open.
pub fn run_all_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        run_all_migrations(&conn).unwrap();

        let table_count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='targets'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 1);
    }
}
