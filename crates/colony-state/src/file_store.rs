use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use colony_types::{Event, ProjectState};

use crate::lock::LockManager;
use crate::store::{default_state, project_event, stamp, StateError, StateStore};

const STATE_FILE: &str = "current.json";
const EVENTS_FILE: &str = "events.jsonl";
const CHANGE_CHANNEL_SIZE: usize = 64;

/// Filesystem backend: an append-only event log plus a materialized
/// snapshot, both under one state directory. Writers serialize on the
/// advisory lock; the snapshot is replaced atomically via temp-and-rename
/// so readers never observe a torn file.
pub struct FileStateStore {
    dir: PathBuf,
    state_file: PathBuf,
    events_file: PathBuf,
    lock: LockManager,
    changes: broadcast::Sender<ProjectState>,
}

impl FileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            state_file: dir.join(STATE_FILE),
            events_file: dir.join(EVENTS_FILE),
            lock: LockManager::new(&dir),
            dir,
            changes,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    async fn read_snapshot(&self) -> Result<ProjectState, StateError> {
        let bytes = match tokio::fs::read(&self.state_file).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.state_file.display(), "no snapshot yet, serving defaults");
                return Ok(default_state());
            }
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!(
                    path = %self.state_file.display(),
                    error = %err,
                    "snapshot unreadable, serving defaults"
                );
                Ok(default_state())
            }
        }
    }

    async fn append_event(&self, event: &Event) -> Result<(), StateError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut log = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.events_file)
            .await?;
        log.write_all(&line).await?;
        log.flush().await?;
        Ok(())
    }

    async fn write_snapshot(&self, state: &ProjectState) -> Result<(), StateError> {
        let tmp = self.dir.join(format!("{STATE_FILE}.tmp"));
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.state_file).await?;
        Ok(())
    }

    async fn update_locked(&self, event: &Event) -> Result<ProjectState, StateError> {
        self.append_event(event).await?;
        let current = self.read_snapshot().await?;
        let next = project_event(&current, event)?;
        self.write_snapshot(&next).await?;
        Ok(next)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_state(&self) -> Result<ProjectState, StateError> {
        self.read_snapshot().await
    }

    async fn update_state(&self, mut event: Event) -> Result<ProjectState, StateError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        stamp(&mut event);

        let guard = self.lock.acquire().await?;
        let result = self.update_locked(&event).await;
        guard.release().await?;

        let next = result?;
        let _ = self.changes.send(next.clone());
        Ok(next)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProjectState> {
        self.changes.subscribe()
    }

    fn fails_hard_on_unavailable(&self) -> bool {
        true
    }
}
