use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::store::StateError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Advisory file lock serializing writers on a shared state directory.
///
/// Acquisition creates the lock file with `create_new`, so exactly one
/// process wins; everyone else polls until the holder releases. The guard
/// removes the file on release, and best-effort on drop if the holder
/// forgot.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    poll: Duration,
}

impl LockManager {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join("state.lock"),
            poll: POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub async fn acquire(&self) -> Result<LockGuard, StateError> {
        let attempt = Uuid::new_v4();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
                .await
            {
                Ok(mut file) => {
                    let marker = format!("{attempt} {}\n", std::process::id());
                    file.write_all(marker.as_bytes()).await?;
                    file.flush().await?;
                    return Ok(LockGuard {
                        path: self.path.clone(),
                        armed: true,
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    tokio::time::sleep(self.poll).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    armed: bool,
}

impl LockGuard {
    pub async fn release(mut self) -> Result<(), StateError> {
        self.armed = false;
        tokio::fs::remove_file(&self.path).await?;
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(dir.path()).with_poll(Duration::from_millis(5));

        let guard = manager.acquire().await.unwrap();

        let contender = manager.clone();
        let pending = tokio::spawn(async move { contender.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        guard.release().await.unwrap();
        let second = pending.await.unwrap().unwrap();
        second.release().await.unwrap();
    }

    #[tokio::test]
    async fn drop_removes_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(dir.path());
        {
            let _guard = manager.acquire().await.unwrap();
            assert!(dir.path().join("state.lock").exists());
        }
        assert!(!dir.path().join("state.lock").exists());
    }
}
