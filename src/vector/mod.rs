// src/vector/mod.rs
// Vector search: nearest-neighbor queries over the embedding BLOB columns
// via sqlite-vec's `vec_distance_cosine`, run against mission actions and
// the technique library.

pub mod embeddings;

use crate::db::codec::{distance_to_score, embedding_to_bytes};
use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::{MissionAction, TechniqueLibraryEntry};
use embeddings::EmbeddingProvider;
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct SimilarAction {
    pub action: MissionAction,
    pub similarity: f32,
}

#[derive(Serialize)]
pub struct TechniqueMatch {
    pub entry: TechniqueLibraryEntry,
    pub similarity: f32,
}

#[derive(Serialize)]
pub struct LibraryStats {
    pub total_entries: i64,
    pub categories: Vec<(Option<String>, i64)>,
}

pub struct VectorSearch {
    pool: Arc<DatabasePool>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

fn max_distance(theta: f32) -> f32 {
    (1.0 - theta.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

impl VectorSearch {
    pub fn new(pool: Arc<DatabasePool>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { pool, embeddings }
    }

    pub async fn encode_text(&self, text: &str) -> Vec<f32> {
        self.embeddings.encode_text(text).await
    }

    pub async fn encode_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        self.embeddings.encode_batch(texts).await
    }

    /// Nearest neighbors in `action_embedding` space, filtered by mission
    /// and success, ordered by distance ascending (most similar first).
    pub async fn find_similar_actions(
        &self,
        query: &str,
        mission_id: Option<i64>,
        limit: i64,
        success_only: bool,
        theta: f32,
    ) -> Result<Vec<SimilarAction>, ServerError> {
        let query_vec = embedding_to_bytes(&self.embeddings.encode_text(query).await);
        let max_dist = max_distance(theta);

        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, mission_id, action_type, technique, payload, result, success, \
                            learning, action_embedding, result_embedding, meta_data, created_at, \
                            vec_distance_cosine(action_embedding, ?1) as distance \
                     FROM mission_actions \
                     WHERE action_embedding IS NOT NULL \
                       AND (?2 IS NULL OR mission_id = ?2) \
                       AND (?3 = 0 OR success = 1) \
                       AND vec_distance_cosine(action_embedding, ?1) <= ?4 \
                     ORDER BY distance ASC LIMIT ?5",
                )?;

                let rows = stmt.query_map(
                    params![query_vec, mission_id, success_only as i64, max_dist, limit],
                    |row| {
                        let distance: f32 = row.get("distance")?;
                        Ok((row_to_action(row)?, distance))
                    },
                )?;

                let mut results = Vec::new();
                for row in rows {
                    let (action, distance) = row?;
                    results.push(SimilarAction {
                        action,
                        similarity: distance_to_score(distance),
                    });
                }
                Ok(results)
            })
            .await
    }

    /// Successful actions for `technique`, across all missions.
    pub async fn find_successful_patterns_by_technique(
        &self,
        technique: &str,
        limit: i64,
    ) -> Result<Vec<MissionAction>, ServerError> {
        let technique = technique.to_string();
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, mission_id, action_type, technique, payload, result, success, \
                            learning, action_embedding, result_embedding, meta_data, created_at \
                     FROM mission_actions \
                     WHERE technique = ?1 AND success = 1 \
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![technique, limit], row_to_action)?;
                rows.collect()
            })
            .await
    }

    pub async fn search_technique_library(
        &self,
        query: &str,
        category: Option<String>,
        limit: i64,
        theta: f32,
    ) -> Result<Vec<TechniqueMatch>, ServerError> {
        let query_vec = embedding_to_bytes(&self.embeddings.encode_text(query).await);
        let max_dist = max_distance(theta);

        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, category, title, content, content_embedding, meta_data, created_at, \
                            vec_distance_cosine(content_embedding, ?1) as distance \
                     FROM technique_library \
                     WHERE content_embedding IS NOT NULL \
                       AND (?2 IS NULL OR category = ?2) \
                       AND vec_distance_cosine(content_embedding, ?1) <= ?3 \
                     ORDER BY distance ASC LIMIT ?4",
                )?;

                let rows = stmt.query_map(params![query_vec, category, max_dist, limit], |row| {
                    let distance: f32 = row.get("distance")?;
                    Ok((row_to_technique(row)?, distance))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    let (entry, distance) = row?;
                    results.push(TechniqueMatch {
                        entry,
                        similarity: distance_to_score(distance),
                    });
                }
                Ok(results)
            })
            .await
    }

    pub async fn add_action_embeddings(
        &self,
        action_id: i64,
        action_type: &str,
        technique: &str,
        result: Option<&str>,
    ) -> Result<(), ServerError> {
        let action_embedding = self
            .embeddings
            .encode_text(&format!("{action_type}: {technique}"))
            .await;
        let result_embedding = match result {
            Some(r) if !r.is_empty() => Some(self.embeddings.encode_text(r).await),
            _ => None,
        };

        self.pool
            .run(move |conn| {
                crate::repositories::action::set_embeddings_sync(
                    conn,
                    action_id,
                    Some(&action_embedding),
                    result_embedding.as_deref(),
                )
            })
            .await
    }

    pub async fn add_technique_embedding(&self, technique_id: i64, content: &str) -> Result<(), ServerError> {
        let embedding = self.embeddings.encode_text(content).await;
        self.pool
            .run(move |conn| {
                conn.execute(
                    "UPDATE technique_library SET content_embedding = ?1 WHERE id = ?2",
                    params![embedding_to_bytes(&embedding), technique_id],
                )
            })
            .await?;
        Ok(())
    }

    /// Insert a new technique library entry and embed its content in one step.
    pub async fn add_to_library(
        &self,
        category: Option<String>,
        title: String,
        content: String,
    ) -> Result<TechniqueLibraryEntry, ServerError> {
        let embedding = embedding_to_bytes(&self.embeddings.encode_text(&content).await);
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO technique_library \
                        (category, title, content, content_embedding, meta_data, created_at) \
                     VALUES (?1, ?2, ?3, ?4, '{}', ?5)",
                    params![
                        category,
                        title,
                        content,
                        embedding,
                        crate::db::codec::to_rfc3339(&chrono::Utc::now()),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                conn.query_row(
                    "SELECT id, category, title, content, content_embedding, meta_data, created_at \
                     FROM technique_library WHERE id = ?1",
                    params![id],
                    row_to_technique,
                )
            })
            .await
    }

    pub async fn library_stats(&self) -> Result<LibraryStats, ServerError> {
        self.pool
            .run(|conn| {
                let total: i64 =
                    conn.query_row("SELECT count(*) FROM technique_library", [], |r| r.get(0))?;
                let mut stmt = conn.prepare(
                    "SELECT category, count(*) FROM technique_library GROUP BY category ORDER BY category",
                )?;
                let categories = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(LibraryStats {
                    total_entries: total,
                    categories,
                })
            })
            .await
    }
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<MissionAction> {
    use crate::db::codec::{bytes_to_embedding, decode_json_map, parse_rfc3339};
    let action_type_raw: String = row.get("action_type")?;
    Ok(MissionAction {
        id: row.get("id")?,
        mission_id: row.get("mission_id")?,
        action_type: action_type_raw.parse().unwrap_or(crate::models::ActionType::Recon),
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

fn row_to_technique(row: &rusqlite::Row<'_>) -> rusqlite::Result<TechniqueLibraryEntry> {
    use crate::db::codec::{bytes_to_embedding, decode_json_map, parse_rfc3339};
    Ok(TechniqueLibraryEntry {
        id: row.get("id")?,
        category: row.get("category")?,
        title: row.get("title")?,
        content: row.get("content")?,
        content_embedding: row
            .get::<_, Option<Vec<u8>>>("content_embedding")?
            .map(|b| bytes_to_embedding(&b)),
        meta_data: decode_json_map(&row.get::<_, String>("meta_data")?),
        created_at: parse_rfc3339(&row.get::<_, String>("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use embeddings::NullEmbeddingProvider;

    async fn pool() -> Arc<DatabasePool> {
        let db_config = crate::config::database::DatabaseConfig {
            path: "test.db".to_string(),
            pool_size: 1,
            max_overflow: 0,
            pool_timeout_s: 5,
        };
        crate::db::open(&db_config).await.unwrap()
    }

    #[tokio::test]
    async fn zero_vector_query_still_returns_zero_distance_matches() {
        let pool = pool().await;
        let search = VectorSearch::new(pool.clone(), Arc::new(NullEmbeddingProvider::new()));

        let mission = pool
            .run(|conn| {
                crate::repositories::mission::create_sync(
                    conn,
                    &crate::repositories::mission::NewMission {
                        name: "m".into(),
                        goal: "g".into(),
                        ..Default::default()
                    },
                )
            })
            .await
            .unwrap();

        search
            .add_action_embeddings(
                pool
                    .run(move |conn| {
                        crate::repositories::action::create_sync(
                            conn,
                            &crate::repositories::action::NewAction {
                                mission_id: mission.id,
                                technique: "sqli".into(),
                                ..Default::default()
                            },
                        )
                    })
                    .await
                    .unwrap()
                    .id,
                "recon",
                "sqli",
                None,
            )
            .await
            .unwrap();

        let hits = search
            .find_similar_actions("anything", Some(mission.id), 10, false, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].similarity >= 0.99);
    }
}
