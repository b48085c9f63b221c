use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::Event;

/// Project-level lifecycle status. Serialized in the wire spelling used by
/// the persisted snapshots (`GRAND_BLUEPRINT_PHASE` etc.).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    NeedsInitialization,
    GrandBlueprintPhase,
    AwaitingExecutionApproval,
    ExecutionInProgress,
    ExecutionComplete,
    ExecutionFailed,
    ExecutionHalted,
    PausedByUser,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::NeedsInitialization => "NEEDS_INITIALIZATION",
            ProjectStatus::GrandBlueprintPhase => "GRAND_BLUEPRINT_PHASE",
            ProjectStatus::AwaitingExecutionApproval => "AWAITING_EXECUTION_APPROVAL",
            ProjectStatus::ExecutionInProgress => "EXECUTION_IN_PROGRESS",
            ProjectStatus::ExecutionComplete => "EXECUTION_COMPLETE",
            ProjectStatus::ExecutionFailed => "EXECUTION_FAILED",
            ProjectStatus::ExecutionHalted => "EXECUTION_HALTED",
            ProjectStatus::PausedByUser => "PAUSED_BY_USER",
        }
    }

    /// True while the engine is expected to keep picking up work.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            ProjectStatus::GrandBlueprintPhase
                | ProjectStatus::AwaitingExecutionApproval
                | ProjectStatus::ExecutionInProgress
        )
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub description: String,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// The ordered task list; insertion order carries dependency and display
/// order, so tasks are only ever replaced as a whole list.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProjectManifest {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// The derived current snapshot of a project.
///
/// `project_status` intentionally has no serde default: a merged snapshot
/// that lost its status fails deserialization, which is how the store
/// rejects the write before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectState {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub project_status: ProjectStatus,
    #[serde(default)]
    pub status_before_pause: Option<ProjectStatus>,
    #[serde(default)]
    pub project_manifest: ProjectManifest,
    #[serde(default)]
    pub history: Vec<Event>,
    #[serde(default)]
    pub artifacts_created: BTreeMap<String, bool>,
    #[serde(
        default,
        rename = "failureReason",
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_reason: Option<String>,
    #[serde(default, rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Fields carried along by shallow event merges that the typed model
    /// does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn default_schema_version() -> String {
    "3.1".to_string()
}

/// Derive a project name from the initializing goal text: first 30 chars,
/// every non-alphanumeric replaced with `-`.
pub fn project_name_from_goal(goal: &str) -> String {
    goal.chars()
        .take(30)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_name_replaces_non_alphanumerics() {
        assert_eq!(
            project_name_from_goal("Build a new world"),
            "Build-a-new-world"
        );
        assert!(project_name_from_goal("Build a URL shortener").starts_with("Build-a-URL-sh"));
    }

    #[test]
    fn project_name_truncates_to_thirty_chars() {
        let goal = "a very long goal that keeps going well past the cutoff point";
        assert_eq!(project_name_from_goal(goal).chars().count(), 30);
    }

    #[test]
    fn status_serializes_in_wire_spelling() {
        let value = serde_json::to_value(ProjectStatus::GrandBlueprintPhase).unwrap();
        assert_eq!(value, serde_json::json!("GRAND_BLUEPRINT_PHASE"));
        let parsed: ProjectStatus = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, ProjectStatus::GrandBlueprintPhase);
    }

    #[test]
    fn snapshot_without_status_fails_to_parse() {
        let raw = serde_json::json!({ "project_name": "demo" });
        assert!(serde_json::from_value::<ProjectState>(raw).is_err());
    }

    #[test]
    fn unknown_snapshot_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "project_status": "EXECUTION_IN_PROGRESS",
            "fallback_mode": true,
        });
        let state: ProjectState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.extra.get("fallback_mode"), Some(&serde_json::json!(true)));
        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back.get("fallback_mode"), Some(&serde_json::json!(true)));
    }
}
