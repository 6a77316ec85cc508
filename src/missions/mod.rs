// src/missions/mod.rs
// Mission / Action Surface: mission lifecycle plus the "current mission"
// process-wide pointer.
//
// NOTE: `current_mission` is global to the server process, not
// per-session. A multi-tenant deployment needs this keyed by connection
// or auth principal instead; kept global here because this server is
// single-tenant (one stdio client per process).

use crate::db::pool::DatabasePool;
use crate::error::ServerError;
use crate::models::{Mission, MissionAction, MissionType};
use crate::repositories::action::{self, MissionActionRepository, MissionStats, NewAction};
use crate::repositories::mission::{MissionRepository, NewMission};
use crate::repositories::target::TargetRepository;
use crate::vector::embeddings::EmbeddingProvider;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Serialize)]
pub struct MissionContextSummary {
    pub mission: Mission,
    pub stats: MissionStats,
    pub recent_actions: Vec<MissionAction>,
}

pub struct MissionService {
    pool: Arc<DatabasePool>,
    missions: MissionRepository,
    actions: MissionActionRepository,
    targets: TargetRepository,
    embeddings: Arc<dyn EmbeddingProvider>,
    current_mission: RwLock<Option<i64>>,
}

impl MissionService {
    pub fn new(pool: Arc<DatabasePool>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            missions: MissionRepository::new(pool.clone()),
            actions: MissionActionRepository::new(pool.clone()),
            targets: TargetRepository::new(pool.clone()),
            pool,
            embeddings,
            current_mission: RwLock::new(None),
        }
    }

    pub async fn create_mission(
        &self,
        target_id: i64,
        mission_type: MissionType,
        name: String,
        goal: String,
        hypothesis: Option<String>,
        scope: HashMap<String, serde_json::Value>,
    ) -> Result<Mission, ServerError> {
        let goal_embedding = self.embeddings.encode_text(&goal).await;
        let hypothesis_embedding = match &hypothesis {
            Some(h) if !h.is_empty() => Some(self.embeddings.encode_text(h).await),
            _ => None,
        };

        let mission = self
            .missions
            .create(NewMission {
                name,
                description: None,
                mission_type,
                hypothesis,
                goal,
                scope,
            })
            .await?;

        self.missions.link_to_target(mission.id, target_id).await?;

        let id = mission.id;
        self.pool
            .run(move |conn| {
                crate::repositories::mission::set_embeddings_sync(
                    conn,
                    id,
                    Some(&goal_embedding),
                    hypothesis_embedding.as_deref(),
                )
            })
            .await?;

        self.missions.get(mission.id).await?.ok_or_else(|| {
            ServerError::NotFound(format!("mission {} disappeared after creation", mission.id))
        })
    }

    pub async fn set_mission_context(&self, mission_id: i64) -> Result<(), ServerError> {
        if self.missions.get(mission_id).await?.is_none() {
            return Err(ServerError::NotFound(format!("mission {mission_id}")));
        }
        *self.current_mission.write().await = Some(mission_id);
        Ok(())
    }

    pub async fn clear_mission_context(&self) {
        *self.current_mission.write().await = None;
    }

    /// Resolves `mission_id` if given, else the process-wide current
    /// mission, and returns it together with a progress summary.
    pub async fn get_mission_context(
        &self,
        mission_id: Option<i64>,
    ) -> Result<Option<MissionContextSummary>, ServerError> {
        let resolved = match mission_id {
            Some(id) => Some(id),
            None => *self.current_mission.read().await,
        };

        let Some(id) = resolved else {
            return Ok(None);
        };

        let Some(mission) = self.missions.get(id).await? else {
            return Ok(None);
        };

        let stats = self.actions.stats_for_mission(id).await?;
        let recent_actions = self.actions.recent_for_mission(id, 5).await?;

        Ok(Some(MissionContextSummary {
            mission,
            stats,
            recent_actions,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_action(
        &self,
        mission_id: i64,
        action_type: crate::models::ActionType,
        technique: String,
        payload: Option<String>,
        result: Option<String>,
        success: bool,
        learning: Option<String>,
        link_recent_requests: i64,
    ) -> Result<MissionAction, ServerError> {
        let new_action = self
            .actions
            .create(NewAction {
                mission_id,
                action_type,
                technique: technique.clone(),
                payload,
                result: result.clone(),
                success,
                learning,
            })
            .await?;

        let action_embedding = self
            .embeddings
            .encode_text(&format!("{}: {}", action_type.as_str(), technique))
            .await;
        let result_embedding = match &result {
            Some(r) if !r.is_empty() => Some(self.embeddings.encode_text(r).await),
            _ => None,
        };

        let action_id = new_action.id;
        self.pool
            .run(move |conn| {
                action::set_embeddings_sync(conn, action_id, Some(&action_embedding), result_embedding.as_deref())
            })
            .await?;

        if link_recent_requests > 0 {
            let requests = self
                .pool
                .run(move |conn| {
                    crate::repositories::http_request::recent_for_mission_sync(
                        conn,
                        mission_id,
                        link_recent_requests,
                    )
                })
                .await?;
            for req in requests {
                self.actions.link_request(action_id, req.id).await?;
            }
        }

        self.actions.get(action_id).await?.ok_or_else(|| {
            ServerError::NotFound(format!("mission action {action_id} disappeared after creation"))
        })
    }

    pub async fn complete_mission(&self, id: i64) -> Result<(), ServerError> {
        self.missions.complete(id).await
    }

    /// Cascades to actions and join-table rows; clears the current-mission
    /// pointer if it pointed at the deleted mission.
    pub async fn delete_mission(&self, id: i64) -> Result<(), ServerError> {
        self.missions.delete(id).await?;
        let mut current = self.current_mission.write().await;
        if *current == Some(id) {
            *current = None;
        }
        Ok(())
    }

    /// Exposed so a caller that already has a target id handy (e.g. the
    /// `create_mission` tool handler) doesn't need a second repository.
    pub fn targets(&self) -> &TargetRepository {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::embeddings::NullEmbeddingProvider;

    async fn service() -> (MissionService, i64) {
        let db_config = crate::config::database::DatabaseConfig {
            path: "test.db".to_string(),
            pool_size: 1,
            max_overflow: 0,
            pool_timeout_s: 5,
        };
        let pool = crate::db::open(&db_config).await.unwrap();
        let targets = TargetRepository::new(pool.clone());
        let target = targets.get_or_create_from_url("https://x/").await.unwrap();
        (
            MissionService::new(pool, Arc::new(NullEmbeddingProvider::new())),
            target.id,
        )
    }

    #[tokio::test]
    async fn current_mission_pointer_clears_when_its_mission_is_deleted() {
        let (service, target_id) = service().await;
        let mission = service
            .create_mission(
                target_id,
                MissionType::Recon,
                "sweep".to_string(),
                "map the attack surface".to_string(),
                None,
                HashMap::new(),
            )
            .await
            .unwrap();

        service.set_mission_context(mission.id).await.unwrap();
        assert!(service.get_mission_context(None).await.unwrap().is_some());

        service.delete_mission(mission.id).await.unwrap();
        assert!(service.get_mission_context(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_action_links_recent_requests_idempotently() {
        let (service, target_id) = service().await;
        let mission = service
            .create_mission(
                target_id,
                MissionType::General,
                "m".to_string(),
                "g".to_string(),
                None,
                HashMap::new(),
            )
            .await
            .unwrap();

        let action = service
            .record_action(
                mission.id,
                crate::models::ActionType::Recon,
                "nmap".to_string(),
                None,
                Some("open ports: 80, 443".to_string()),
                true,
                None,
                5,
            )
            .await
            .unwrap();
        assert_eq!(action.technique, "nmap");

        let stats = service.actions.stats_for_mission(mission.id).await.unwrap();
        assert_eq!(stats.total_actions, 1);
        assert_eq!(stats.successful_actions, 1);
    }
}
