use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Strategic,
    Reasoning,
    #[default]
    Execution,
    Utility,
}

/// One agent's entry in the aggregated manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentManifestEntry {
    pub id: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub engine_tools: Option<Vec<String>>,
    #[serde(default)]
    pub model_tier: ModelTier,
}

impl AgentManifestEntry {
    /// `engine_tools` is the current field; `tools` is kept for legacy agent
    /// definitions.
    pub fn patterns(&self) -> &[String] {
        match &self.engine_tools {
            Some(patterns) => patterns,
            None => &self.tools,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub agents: Vec<AgentManifestEntry>,
}

impl Manifest {
    pub fn agent(&self, id: &str) -> Option<&AgentManifestEntry> {
        self.agents.iter().find(|agent| agent.id == id)
    }
}

/// Permission pattern match: exact tool name, or a trailing-`*` pattern
/// compared as a prefix up to (excluding) the wildcard, e.g. `file_system.*`
/// allows `file_system.readFile`.
pub fn pattern_allows(pattern: &str, tool_name: &str) -> bool {
    if pattern == tool_name {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => tool_name.starts_with(prefix),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        assert!(pattern_allows("file_system.readFile", "file_system.readFile"));
        assert!(!pattern_allows("file_system.readFile", "file_system.writeFile"));
    }

    #[test]
    fn wildcard_pattern_matches_namespace() {
        assert!(pattern_allows("system.*", "system.updateStatus"));
        assert!(pattern_allows("system.*", "system.pause_engine"));
        assert!(!pattern_allows("system.*", "shell.execute"));
    }

    #[test]
    fn engine_tools_take_precedence_over_legacy_tools() {
        let entry = AgentManifestEntry {
            id: "dev".to_string(),
            tools: vec!["shell.*".to_string()],
            engine_tools: Some(vec!["file_system.readFile".to_string()]),
            model_tier: ModelTier::Execution,
        };
        assert_eq!(entry.patterns(), ["file_system.readFile".to_string()]);
    }

    #[test]
    fn legacy_tools_are_used_when_engine_tools_absent() {
        let entry: AgentManifestEntry = serde_yaml_like();
        assert_eq!(entry.patterns(), ["research.*".to_string()]);
    }

    fn serde_yaml_like() -> AgentManifestEntry {
        serde_json::from_value(serde_json::json!({
            "id": "analyst",
            "tools": ["research.*"],
        }))
        .unwrap()
    }
}
