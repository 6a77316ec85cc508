// src/context_versioning/mod.rs
// Thin façade over `repositories::context`, matching the operation names
// tool handlers call by. The append-only/serializability guarantees live
// in the repository; this layer adds only what needs a second repository
// (target lookups for `search_contexts`).

use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::{ChangeType, Target, TargetContext};
use crate::repositories::context::{self, ContextRepository, NewVersion};
use crate::repositories::target::TargetRepository;
use std::sync::Arc;

pub struct ContextVersioner {
    pool: Arc<DatabasePool>,
    contexts: ContextRepository,
    targets: TargetRepository,
}

impl ContextVersioner {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self {
            contexts: ContextRepository::new(pool.clone()),
            targets: TargetRepository::new(pool.clone()),
            pool,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_version(
        &self,
        target_id: i64,
        user_context: Option<String>,
        agent_context: Option<String>,
        created_by: String,
        change_type: ChangeType,
        change_summary: Option<String>,
        parent_version_id: Option<i64>,
        is_major_version: bool,
    ) -> Result<TargetContext, ServerError> {
        self.contexts
            .create_version(NewVersion {
                target_id,
                user_context,
                agent_context,
                created_by,
                change_type,
                change_summary,
                parent_version_id,
                is_major_version,
            })
            .await
    }

    pub async fn get_current(&self, target_id: i64) -> Result<Option<TargetContext>, ServerError> {
        self.contexts.get_current(target_id).await
    }

    pub async fn get_version(&self, id: i64) -> Result<Option<TargetContext>, ServerError> {
        self.contexts.get_version(id).await
    }

    pub async fn get_version_by_number(
        &self,
        target_id: i64,
        version: i64,
    ) -> Result<Option<TargetContext>, ServerError> {
        self.contexts.get_version_by_number(target_id, version).await
    }

    pub async fn list_versions(
        &self,
        target_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TargetContext>, ServerError> {
        self.contexts.list_versions(target_id, limit, offset).await
    }

    /// Substring match over context bodies, each hit paired with its target.
    pub async fn search_contexts(
        &self,
        query: String,
        target_ids: Option<Vec<i64>>,
        limit: i64,
    ) -> Result<Vec<(TargetContext, Target)>, ServerError> {
        let contexts = self
            .pool
            .run(move |conn| {
                context::search_contexts_sync(conn, &query, target_ids.as_deref(), limit)
            })
            .await?;

        let mut pairs = Vec::with_capacity(contexts.len());
        for ctx in contexts {
            if let Some(target) = self.targets.get(ctx.target_id).await? {
                pairs.push((ctx, target));
            }
        }
        Ok(pairs)
    }

    pub async fn rollback_to_version(
        &self,
        target_id: i64,
        version_id: i64,
    ) -> Result<TargetContext, ServerError> {
        self.contexts.rollback_to_version(target_id, version_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn versioner() -> (ContextVersioner, i64) {
        let db_config = crate::config::database::DatabaseConfig {
            path: "test.db".to_string(),
            pool_size: 1,
            max_overflow: 0,
            pool_timeout_s: 5,
        };
        let pool = crate::db::open(&db_config).await.unwrap();
        let targets = TargetRepository::new(pool.clone());
        let target = targets.get_or_create_from_url("https://x/").await.unwrap();
        (ContextVersioner::new(pool), target.id)
    }

    #[tokio::test]
    async fn search_contexts_pairs_each_hit_with_its_target() {
        let (versioner, target_id) = versioner().await;
        versioner
            .create_version(
                target_id,
                Some("found the login form at /admin".to_string()),
                None,
                "user".to_string(),
                ChangeType::UserEdit,
                None,
                None,
                false,
            )
            .await
            .unwrap();

        let hits = versioner
            .search_contexts("login form".to_string(), None, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.id, target_id);
    }
}
