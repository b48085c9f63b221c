use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::file_store::FileStateStore;
use crate::graph_store::GraphStateStore;
use crate::store::StateStore;

/// How hard to try to reach the graph database before falling back to the
/// filesystem backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphMode {
    /// Fail startup if the graph database is unreachable.
    Required,
    /// Try the graph database, fall back to the file store.
    #[default]
    Auto,
    /// Skip the graph database entirely.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default)]
    pub graph_mode: GraphMode,
    #[serde(default)]
    pub graph: Option<GraphConfig>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".colony/state")
}

fn default_project_name() -> String {
    "default".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            project_name: default_project_name(),
            graph_mode: GraphMode::default(),
            graph: None,
        }
    }
}

impl StateConfig {
    /// Environment layer: `COLONY_STATE_DIR`, `COLONY_GRAPH_MODE`, and the
    /// conventional `NEO4J_*` trio.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("COLONY_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = std::env::var("COLONY_GRAPH_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "required" => config.graph_mode = GraphMode::Required,
                "auto" => config.graph_mode = GraphMode::Auto,
                "file" => config.graph_mode = GraphMode::File,
                other => warn!(mode = other, "unknown graph mode, keeping auto"),
            }
        }
        if let Ok(uri) = std::env::var("NEO4J_URI") {
            config.graph = Some(GraphConfig {
                uri,
                user: std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
                password: std::env::var("NEO4J_PASSWORD").unwrap_or_default(),
            });
        }
        config
    }
}

/// Pick and construct the backend for this configuration.
pub async fn build_store(config: &StateConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    match config.graph_mode {
        GraphMode::File => {
            info!(dir = %config.state_dir.display(), "using file state backend");
            Ok(Arc::new(FileStateStore::new(&config.state_dir)))
        }
        GraphMode::Required => {
            let graph = config
                .graph
                .as_ref()
                .context("graph mode is required but no graph connection is configured")?;
            let store = GraphStateStore::connect(graph, config.project_name.clone())
                .await
                .context("graph mode is required but the database is unreachable")?;
            Ok(Arc::new(store))
        }
        GraphMode::Auto => {
            if let Some(graph) = &config.graph {
                match GraphStateStore::connect(graph, config.project_name.clone()).await {
                    Ok(store) => return Ok(Arc::new(store)),
                    Err(err) => {
                        warn!(error = %err, "graph backend unavailable, using file store");
                    }
                }
            }
            Ok(Arc::new(FileStateStore::new(&config.state_dir)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_file_friendly() {
        let config = StateConfig::default();
        assert_eq!(config.graph_mode, GraphMode::Auto);
        assert_eq!(config.state_dir, PathBuf::from(".colony/state"));
        assert!(config.graph.is_none());
    }

    #[tokio::test]
    async fn required_mode_without_graph_config_fails() {
        let config = StateConfig {
            graph_mode: GraphMode::Required,
            ..StateConfig::default()
        };
        let err = build_store(&config).await.unwrap_err();
        assert!(err.to_string().contains("no graph connection"));
    }

    #[tokio::test]
    async fn auto_mode_without_graph_config_uses_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateConfig {
            state_dir: dir.path().join("state"),
            ..StateConfig::default()
        };
        let store = build_store(&config).await.unwrap();
        assert!(store.fails_hard_on_unavailable());
    }
}
