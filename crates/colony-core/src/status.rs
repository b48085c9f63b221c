use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use colony_state::{StateError, StateStore};
use colony_types::{
    event, project_name_from_goal, Event, EventSource, ProjectState, ProjectStatus, TaskStatus,
};

use crate::telemetry::{TaskOutcomeRecord, TelemetrySink};

/// Something worth remembering from a refused transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub milestone: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneOutcome {
    pub passed: bool,
    pub detail: String,
}

/// External collaborator deciding whether a milestone has been met.
#[async_trait]
pub trait MilestoneVerifier: Send + Sync {
    async fn verify(&self, milestone: &str, state: &ProjectState)
        -> anyhow::Result<MilestoneOutcome>;
}

/// External collaborator persisting lessons across projects.
#[async_trait]
pub trait SwarmMemory: Send + Sync {
    async fn record_lesson(&self, lesson: &Lesson) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub enum TransitionOutcome {
    Applied(ProjectState),
    Refused { milestone: String, detail: String },
}

/// Domain operations over the state store facade. Every operation reads
/// the current snapshot, builds one patch event that carries the full
/// appended history list, and writes it through `update_state`.
pub struct StatusTransitions {
    store: Arc<dyn StateStore>,
    telemetry: Option<Arc<TelemetrySink>>,
}

impl StatusTransitions {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, sink: Arc<TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub async fn initialize_project(&self, goal: &str) -> Result<ProjectState, StateError> {
        let state = self.store.get_state().await?;
        let event = Event::new(
            event::PROJECT_INITIALIZED,
            EventSource::User,
            "user",
            format!("Project initialized: {goal}"),
        );
        let event = event
            .with_field("goal", json!(goal))
            .with_field("project_name", json!(project_name_from_goal(goal)))
            .with_field(
                "project_status",
                json!(ProjectStatus::GrandBlueprintPhase.as_str()),
            );
        let event = with_history(event, &state);
        info!(goal, "initializing project");
        self.store.update_state(event).await
    }

    pub async fn update_status(
        &self,
        new_status: ProjectStatus,
        message: &str,
        artifact_created: Option<&str>,
    ) -> Result<ProjectState, StateError> {
        let state = self.store.get_state().await?;
        let mut event = Event::new(event::STATUS_UPDATE, EventSource::System, "system", message)
            .with_field("project_status", json!(new_status.as_str()));
        if let Some(artifact) = artifact_created {
            let mut artifacts = state.artifacts_created.clone();
            artifacts.insert(artifact.to_string(), true);
            event = event.with_field("artifacts_created", json!(artifacts));
        }
        let event = with_history(event, &state);
        self.store.update_state(event).await
    }

    /// Freeze the project, remembering where it was so resume can return
    /// there.
    pub async fn pause_project(&self) -> Result<ProjectState, StateError> {
        let state = self.store.get_state().await?;
        let event = Event::new(
            event::PROJECT_PAUSED,
            EventSource::User,
            "user",
            "Project paused by user.",
        )
        .with_field(
            "project_status",
            json!(ProjectStatus::PausedByUser.as_str()),
        )
        .with_field("status_before_pause", json!(state.project_status.as_str()));
        let event = with_history(event, &state);
        self.store.update_state(event).await
    }

    /// Return to the pre-pause status, or to the blueprint phase when no
    /// saved status exists.
    pub async fn resume_project(&self) -> Result<ProjectState, StateError> {
        let state = self.store.get_state().await?;
        let restored = state
            .status_before_pause
            .unwrap_or(ProjectStatus::GrandBlueprintPhase);
        let event = Event::new(
            event::PROJECT_RESUMED,
            EventSource::User,
            "user",
            "Project resumed by user.",
        )
        .with_field("project_status", json!(restored.as_str()))
        .with_field("status_before_pause", Value::Null);
        let event = with_history(event, &state);
        self.store.update_state(event).await
    }

    /// Replace exactly one task's status, preserving task order. An
    /// unknown id is a logged no-op returning the unchanged snapshot.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        new_status: TaskStatus,
        agent_id: Option<&str>,
    ) -> Result<ProjectState, StateError> {
        let state = self.store.get_state().await?;
        if !state
            .project_manifest
            .tasks
            .iter()
            .any(|task| task.id == task_id)
        {
            warn!(task_id, "task status update for unknown task, ignoring");
            return Ok(state);
        }

        let mut manifest = state.project_manifest.clone();
        for task in &mut manifest.tasks {
            if task.id == task_id {
                task.status = new_status;
            }
        }

        let event = Event::new(
            event::TASK_STATUS_CHANGED,
            EventSource::System,
            agent_id.unwrap_or("system"),
            format!("Task '{task_id}' is now {new_status}"),
        )
        .with_field("project_manifest", json!(manifest));
        let event = with_history(event, &state);
        let next = self.store.update_state(event).await?;

        if let Some(telemetry) = &self.telemetry {
            telemetry
                .record_task_outcome(&TaskOutcomeRecord {
                    task_id,
                    status: new_status.as_str(),
                    agent_id,
                })
                .await;
        }
        Ok(next)
    }

    /// Milestone-gated transition. The verifier decides; a refusal records
    /// a lesson and leaves the state untouched, with no automatic retry.
    pub async fn transition_to_state(
        &self,
        new_status: ProjectStatus,
        milestone: &str,
        verifier: &dyn MilestoneVerifier,
        memory: &dyn SwarmMemory,
    ) -> anyhow::Result<TransitionOutcome> {
        let state = self.store.get_state().await?;
        let outcome = verifier.verify(milestone, &state).await?;
        if !outcome.passed {
            warn!(milestone, detail = %outcome.detail, "milestone verification refused transition");
            memory
                .record_lesson(&Lesson {
                    milestone: milestone.to_string(),
                    detail: outcome.detail.clone(),
                })
                .await?;
            return Ok(TransitionOutcome::Refused {
                milestone: milestone.to_string(),
                detail: outcome.detail,
            });
        }

        let next = self
            .update_status(
                new_status,
                &format!("Milestone '{milestone}' verified, moving to {new_status}"),
                Some(milestone),
            )
            .await?;
        Ok(TransitionOutcome::Applied(next))
    }
}

/// The graph backend replaces the whole node set on every write, so each
/// patch event must carry the complete history list, not just the new
/// entry.
fn with_history(event: Event, state: &ProjectState) -> Event {
    let mut history: Vec<Event> = state.history.clone();
    history.push(event.as_history_entry());
    let history = json!(history);
    event.with_field("history", history)
}
