use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use colony_types::{event, Event, ProjectState, ProjectStatus};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid state after projection: {0}")]
    InvalidState(String),
    #[error("state store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("state backend unavailable: {0}")]
    Backend(String),
}

/// The public facade over the two interchangeable persistence backends.
///
/// `fails_hard_on_unavailable` documents the backend's failure philosophy:
/// the file store surfaces lock/validation errors immediately, while the
/// graph store degrades to best-effort in-memory writes when the database
/// is unreachable. Callers deciding whether a "successful" write is a real
/// durability guarantee should consult it.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self) -> Result<ProjectState, StateError>;
    async fn update_state(&self, event: Event) -> Result<ProjectState, StateError>;
    fn subscribe(&self) -> broadcast::Receiver<ProjectState>;
    fn fails_hard_on_unavailable(&self) -> bool;
}

impl std::fmt::Debug for dyn StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StateStore")
    }
}

/// The documented default snapshot served before anything was persisted.
pub fn default_state() -> ProjectState {
    ProjectState {
        schema_version: colony_types::default_schema_version(),
        project_name: "New Colony Project".to_string(),
        goal: None,
        project_status: ProjectStatus::NeedsInitialization,
        status_before_pause: None,
        project_manifest: Default::default(),
        history: Vec::new(),
        artifacts_created: Default::default(),
        failure_reason: None,
        last_updated: None,
        extra: Map::new(),
    }
}

/// Give the event its durable identity before it hits the log.
pub(crate) fn stamp(event: &mut Event) {
    event.id = Uuid::new_v4();
    event.timestamp = Utc::now();
}

/// Derive the next snapshot from the previous one plus a single event.
///
/// Two event types apply narrow projections; every other event is a full
/// shallow merge of its serialized fields onto the snapshot (the update
/// event doubles as a state patch). The final re-deserialization is the
/// invariant check: a snapshot that lost `project_status`, or whose
/// `project_manifest.tasks` is not a sequence, aborts the write here.
pub fn project_event(current: &ProjectState, event: &Event) -> Result<ProjectState, StateError> {
    let mut merged = as_object(serde_json::to_value(current)?)?;

    match event.event_type.as_str() {
        event::AGENT_COMPLETED => {
            if let Some(status) = event.payload.get("newStatus") {
                merged.insert("project_status".to_string(), status.clone());
            }
        }
        event::TASK_FAILED => {
            merged.insert(
                "project_status".to_string(),
                Value::String(ProjectStatus::ExecutionFailed.as_str().to_string()),
            );
            if let Some(reason) = event.payload.get("reason") {
                merged.insert("failureReason".to_string(), reason.clone());
            }
        }
        _ => {
            let patch = as_object(serde_json::to_value(event)?)?;
            for (key, value) in patch {
                merged.insert(key, value);
            }
        }
    }

    merged.insert("lastUpdated".to_string(), serde_json::to_value(Utc::now())?);

    if !merged
        .get("project_status")
        .map(Value::is_string)
        .unwrap_or(false)
    {
        return Err(StateError::InvalidState(
            "project_status missing after merge".to_string(),
        ));
    }
    if let Some(tasks) = merged.get("project_manifest").and_then(|m| m.get("tasks")) {
        if !tasks.is_array() {
            return Err(StateError::InvalidState(
                "project_manifest.tasks must be a sequence".to_string(),
            ));
        }
    }

    serde_json::from_value(Value::Object(merged))
        .map_err(|err| StateError::InvalidState(err.to_string()))
}

fn as_object(value: Value) -> Result<Map<String, Value>, StateError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StateError::InvalidState(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
