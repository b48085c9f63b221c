use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use colony_types::{Event, ProjectState};

use crate::config::GraphConfig;
use crate::store::{default_state, project_event, stamp, StateError, StateStore};

const CHANGE_CHANNEL_SIZE: usize = 64;

/// Graph database backend. The full snapshot lives as a JSON property on
/// the project node; task and event nodes are recreated on every write so
/// graph queries can traverse them. When the database becomes unreachable
/// the store degrades to an in-memory snapshot instead of failing the
/// caller, and keeps serving that snapshot until restart.
pub struct GraphStateStore {
    graph: Graph,
    project: String,
    degraded: RwLock<Option<ProjectState>>,
    changes: broadcast::Sender<ProjectState>,
}

fn backend(err: neo4rs::Error) -> StateError {
    StateError::Backend(err.to_string())
}

impl GraphStateStore {
    /// Connect and probe the database; a store is only handed out once a
    /// round trip has succeeded.
    pub async fn connect(config: &GraphConfig, project: impl Into<String>) -> Result<Self, StateError> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(backend)?;
        graph.run(query("RETURN 1")).await.map_err(backend)?;
        info!(uri = %config.uri, "connected to graph state backend");
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Ok(Self {
            graph,
            project: project.into(),
            degraded: RwLock::new(None),
            changes,
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
            .try_read()
            .map(|snapshot| snapshot.is_some())
            .unwrap_or(false)
    }

    async fn enter_degraded(&self, snapshot: ProjectState) {
        warn!("graph backend unreachable, continuing with in-memory state");
        *self.degraded.write().await = Some(snapshot);
    }

    async fn read_graph_state(&self) -> Result<ProjectState, StateError> {
        let mut rows = self
            .graph
            .execute(
                query("MATCH (p:Project {name: $name}) RETURN p.snapshot AS snapshot")
                    .param("name", self.project.clone()),
            )
            .await
            .map_err(backend)?;
        match rows.next().await.map_err(backend)? {
            Some(row) => {
                let snapshot: String = row
                    .get("snapshot")
                    .map_err(|err| StateError::Backend(err.to_string()))?;
                serde_json::from_str(&snapshot)
                    .map_err(|err| StateError::InvalidState(err.to_string()))
            }
            None => Ok(default_state()),
        }
    }

    fn replace_queries(&self, state: &ProjectState) -> Result<Vec<Query>, StateError> {
        let name = self.project.clone();
        let mut queries = vec![
            query("MATCH (p:Project {name: $name})-[:HAS_TASK]->(t:Task) DETACH DELETE t")
                .param("name", name.clone()),
            query("MATCH (p:Project {name: $name})-[:HAS_EVENT]->(e:Event) DETACH DELETE e")
                .param("name", name.clone()),
            query(
                "MERGE (p:Project {name: $name}) \
                 SET p.project_name = $project_name, \
                     p.project_status = $project_status, \
                     p.goal = $goal, \
                     p.snapshot = $snapshot",
            )
            .param("name", name.clone())
            .param("project_name", state.project_name.clone())
            .param("project_status", state.project_status.as_str())
            .param("goal", state.goal.clone().unwrap_or_default())
            .param("snapshot", serde_json::to_string(state)?),
        ];
        for (position, task) in state.project_manifest.tasks.iter().enumerate() {
            queries.push(
                query(
                    "MATCH (p:Project {name: $name}) \
                     CREATE (p)-[:HAS_TASK]->(t:Task { \
                         id: $id, status: $status, description: $description, \
                         position: $position })",
                )
                .param("name", name.clone())
                .param("id", task.id.clone())
                .param("status", task.status.as_str())
                .param("description", task.description.clone())
                .param("position", position as i64),
            );
        }
        for (position, event) in state.history.iter().enumerate() {
            queries.push(
                query(
                    "MATCH (p:Project {name: $name}) \
                     CREATE (p)-[:HAS_EVENT]->(e:Event { \
                         id: $id, type: $type, source: $source, \
                         message: $message, timestamp: $timestamp, \
                         position: $position })",
                )
                .param("name", name.clone())
                .param("id", event.id.to_string())
                .param("type", event.event_type.clone())
                .param("source", event.source.as_str())
                .param("message", event.message.clone())
                .param("timestamp", event.timestamp.to_rfc3339())
                .param("position", position as i64),
            );
        }
        Ok(queries)
    }

    async fn write_graph_state(&self, state: &ProjectState) -> Result<(), StateError> {
        let queries = self.replace_queries(state)?;
        let mut txn = self.graph.start_txn().await.map_err(backend)?;
        match txn.run_queries(queries).await {
            Ok(()) => txn.commit().await.map_err(backend),
            Err(err) => {
                let _ = txn.rollback().await;
                Err(backend(err))
            }
        }
    }

    async fn current(&self) -> Result<ProjectState, StateError> {
        if let Some(snapshot) = self.degraded.read().await.clone() {
            return Ok(snapshot);
        }
        match self.read_graph_state().await {
            Ok(state) => Ok(state),
            Err(StateError::Backend(message)) => {
                error!(error = %message, "graph read failed");
                let fallback = default_state();
                self.enter_degraded(fallback.clone()).await;
                Ok(fallback)
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl StateStore for GraphStateStore {
    async fn get_state(&self) -> Result<ProjectState, StateError> {
        self.current().await
    }

    async fn update_state(&self, mut event: Event) -> Result<ProjectState, StateError> {
        stamp(&mut event);
        let current = self.current().await?;
        let next = project_event(&current, &event)?;

        if self.degraded.read().await.is_some() {
            *self.degraded.write().await = Some(next.clone());
        } else if let Err(err) = self.write_graph_state(&next).await {
            error!(error = %err, "graph write failed");
            self.enter_degraded(next.clone()).await;
        }

        let _ = self.changes.send(next.clone());
        Ok(next)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProjectState> {
        self.changes.subscribe()
    }

    fn fails_hard_on_unavailable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colony_types::{event, EventSource, ProjectStatus};
    use serde_json::json;

    fn live_config() -> GraphConfig {
        GraphConfig {
            uri: std::env::var("NEO4J_URI").unwrap_or_else(|_| "127.0.0.1:7687".to_string()),
            user: std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "neo4j".to_string()),
        }
    }

    #[tokio::test]
    #[ignore = "requires a running neo4j"]
    async fn round_trips_a_snapshot_through_the_graph() {
        let store = GraphStateStore::connect(&live_config(), "colony-store-test")
            .await
            .unwrap();
        let event = Event::new(event::STATUS_UPDATE, EventSource::System, "system", "probe")
            .with_field("project_status", json!("EXECUTION_IN_PROGRESS"))
            .with_field("goal", json!("graph round trip"));
        let written = store.update_state(event).await.unwrap();
        assert_eq!(written.project_status, ProjectStatus::ExecutionInProgress);
        assert!(!store.is_degraded());

        let read = store.get_state().await.unwrap();
        assert_eq!(read.goal.as_deref(), Some("graph round trip"));
    }
}
