use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use colony_types::{pattern_allows, AgentManifestEntry, ErrorKind, Manifest, OperationalError};

/// Loads agent definitions from `<core_path>/agents/*.md`, aggregates them
/// into one manifest, and answers permission queries against it. The scan
/// result is cached for the life of the registry.
pub struct ManifestRegistry {
    core_path: PathBuf,
    cache: RwLock<Option<Arc<Manifest>>>,
}

#[derive(Deserialize)]
struct AgentBlock {
    agent: AgentManifestEntry,
}

impl ManifestRegistry {
    pub fn new(core_path: impl AsRef<Path>) -> Self {
        Self {
            core_path: core_path.as_ref().to_path_buf(),
            cache: RwLock::new(None),
        }
    }

    pub async fn get_manifest(&self) -> Result<Arc<Manifest>, OperationalError> {
        if let Some(manifest) = self.cache.read().await.clone() {
            return Ok(manifest);
        }
        let manifest = Arc::new(self.scan().await?);
        *self.cache.write().await = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Drop the cached manifest so the next query rescans the directory.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn reset(&self) {
        *self.cache.write().await = None;
    }

    pub async fn agent(&self, agent_id: &str) -> Result<AgentManifestEntry, OperationalError> {
        let manifest = self.get_manifest().await?;
        manifest.agent(agent_id).cloned().ok_or_else(|| {
            OperationalError::new(
                ErrorKind::PermissionDenied,
                format!("Agent '{agent_id}' not found."),
            )
        })
    }

    /// Whether the agent's manifest entry allows this tool, by exact name
    /// or wildcard pattern. Unknown agents are an error, not a denial.
    pub async fn is_permitted(
        &self,
        agent_id: &str,
        tool_name: &str,
    ) -> Result<bool, OperationalError> {
        let agent = self.agent(agent_id).await?;
        Ok(agent
            .patterns()
            .iter()
            .any(|pattern| pattern_allows(pattern, tool_name)))
    }

    async fn scan(&self) -> Result<Manifest, OperationalError> {
        let agents_dir = self.core_path.join("agents");
        let mut entries = match tokio::fs::read_dir(&agents_dir).await {
            Ok(entries) => entries,
            Err(err) => {
                return Err(OperationalError::new(
                    ErrorKind::ToolExecution,
                    format!(
                        "cannot read agent definitions in '{}': {err}",
                        agents_dir.display()
                    ),
                ))
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|err| {
            OperationalError::new(ErrorKind::ToolExecution, format!("agent scan failed: {err}"))
        })? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("md") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut agents = Vec::new();
        for path in paths {
            let text = tokio::fs::read_to_string(&path).await.map_err(|err| {
                OperationalError::new(
                    ErrorKind::ToolExecution,
                    format!("cannot read '{}': {err}", path.display()),
                )
            })?;
            match parse_agent_definition(&text) {
                Ok(Some(agent)) => {
                    if !valid_agent_id(&agent.id) {
                        return Err(OperationalError::new(
                            ErrorKind::ToolExecution,
                            format!("invalid agent id '{}' in '{}'", agent.id, path.display()),
                        ));
                    }
                    debug!(agent = %agent.id, path = %path.display(), "loaded agent definition");
                    agents.push(agent);
                }
                Ok(None) => {
                    return Err(OperationalError::new(
                        ErrorKind::ToolExecution,
                        format!("agent definition '{}' has no yaml block", path.display()),
                    ));
                }
                Err(err) => {
                    return Err(OperationalError::new(
                        ErrorKind::ToolExecution,
                        format!("malformed agent definition '{}': {err}", path.display()),
                    ));
                }
            }
        }
        Ok(Manifest { agents })
    }
}

fn valid_agent_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Agent definitions are markdown files carrying one fenced yaml block with
/// a top-level `agent:` mapping.
fn parse_agent_definition(text: &str) -> Result<Option<AgentManifestEntry>, serde_yaml::Error> {
    let Some(block) = extract_fenced_yaml(text) else {
        return Ok(None);
    };
    let parsed: AgentBlock = serde_yaml::from_str(&block)?;
    Ok(Some(parsed.agent))
}

fn extract_fenced_yaml(text: &str) -> Option<String> {
    let mut lines = text.lines();
    loop {
        let line = lines.next()?;
        let fence = line.trim();
        if fence == "```yaml" || fence == "```yml" {
            break;
        }
    }
    let mut block = String::new();
    for line in lines {
        if line.trim() == "```" {
            return Some(block);
        }
        block.push_str(line);
        block.push('\n');
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_agent(dir: &Path, file: &str, body: &str) {
        let agents = dir.join("agents");
        tokio::fs::create_dir_all(&agents).await.unwrap();
        tokio::fs::write(agents.join(file), body).await.unwrap();
    }

    fn qa_agent() -> &'static str {
        "# QA\n\n```yaml\nagent:\n  id: qa\n  engine_tools:\n    - file_system.readFile\n    - research.*\n```\n"
    }

    #[tokio::test]
    async fn loads_agents_and_answers_permission_queries() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "qa.md", qa_agent()).await;
        let registry = ManifestRegistry::new(dir.path());

        assert!(registry.is_permitted("qa", "file_system.readFile").await.unwrap());
        assert!(registry.is_permitted("qa", "research.deep_dig").await.unwrap());
        assert!(!registry.is_permitted("qa", "file_system.writeFile").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_agent_is_an_error_not_a_denial() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "qa.md", qa_agent()).await;
        let registry = ManifestRegistry::new(dir.path());

        let err = registry.is_permitted("ghost", "file_system.readFile").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert_eq!(err.message, "Agent 'ghost' not found.");
    }

    #[tokio::test]
    async fn file_without_a_yaml_block_fails_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "notes.md", "# just prose, no definition\n").await;
        write_agent(dir.path(), "qa.md", qa_agent()).await;
        let registry = ManifestRegistry::new(dir.path());

        let err = registry.get_manifest().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ToolExecution);
        assert!(err.message.contains("no yaml block"));
    }

    #[tokio::test]
    async fn malformed_yaml_fails_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "bad.md", "```yaml\nagent: [not, a, mapping\n```\n").await;
        let registry = ManifestRegistry::new(dir.path());

        let err = registry.get_manifest().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ToolExecution);
    }

    #[tokio::test]
    async fn reset_forces_a_rescan() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "qa.md", qa_agent()).await;
        let registry = ManifestRegistry::new(dir.path());
        assert_eq!(registry.get_manifest().await.unwrap().agents.len(), 1);

        write_agent(
            dir.path(),
            "dev.md",
            "```yaml\nagent:\n  id: dev\n  engine_tools:\n    - file_system.*\n```\n",
        )
        .await;
        assert_eq!(registry.get_manifest().await.unwrap().agents.len(), 1);

        registry.reset().await;
        assert_eq!(registry.get_manifest().await.unwrap().agents.len(), 2);
    }

    #[tokio::test]
    async fn upper_case_agent_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "bad.md", "```yaml\nagent:\n  id: QA\n```\n").await;
        let registry = ManifestRegistry::new(dir.path());
        let err = registry.get_manifest().await.unwrap_err();
        assert!(err.message.contains("invalid agent id"));
    }
}
