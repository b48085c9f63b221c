use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const PROJECT_INITIALIZED: &str = "PROJECT_INITIALIZED";
pub const STATUS_UPDATE: &str = "STATUS_UPDATE";
pub const AGENT_COMPLETED: &str = "AGENT_COMPLETED";
pub const TASK_FAILED: &str = "TASK_FAILED";
pub const TASK_STATUS_CHANGED: &str = "TASK_STATUS_CHANGED";
pub const PROJECT_PAUSED: &str = "PROJECT_PAUSED";
pub const PROJECT_RESUMED: &str = "PROJECT_RESUMED";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    User,
    System,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::User => "user",
            EventSource::System => "system",
        }
    }
}

/// One immutable entry of the append-only log.
///
/// The flattened `payload` carries the type-specific fields, and for update
/// events it doubles as a state patch: top-level ProjectState field names in
/// the payload are shallow-merged onto the snapshot by the projector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: EventSource,
    pub agent_id: String,
    pub message: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        source: EventSource,
        agent_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            source,
            agent_id: agent_id.into(),
            message: message.into(),
            payload: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// A copy suitable for embedding in `history`: same identity and message,
    /// but without the state-patch payload (which would otherwise nest the
    /// whole history inside each history entry).
    pub fn as_history_entry(&self) -> Event {
        Event {
            payload: Map::new(),
            ..self.clone()
        }
    }
}
