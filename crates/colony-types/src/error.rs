use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of an operational failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DbConnection,
    ToolExecution,
    AgentFailure,
    PermissionDenied,
    Security,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DbConnection => "DB_CONNECTION",
            ErrorKind::ToolExecution => "TOOL_EXECUTION",
            ErrorKind::AgentFailure => "AGENT_FAILURE",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::Security => "SECURITY",
        }
    }

    /// Whether the retry policy may re-attempt a call that failed with this
    /// kind. Permission and sanitization failures are terminal for the call.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::DbConnection | ErrorKind::ToolExecution)
    }

    /// Operator-facing remediation hint. Surfaced in logs and operator
    /// output, never into agent transcripts.
    pub fn remediation(self) -> Option<&'static str> {
        match self {
            ErrorKind::DbConnection => Some(
                "Check that the graph database is reachable and that \
                 NEO4J_URI / NEO4J_USER / NEO4J_PASSWORD are set correctly.",
            ),
            ErrorKind::ToolExecution => Some(
                "Verify the tool is registered with the dispatcher and that \
                 the agent manifest lists it.",
            ),
            ErrorKind::PermissionDenied => Some(
                "Add the tool pattern to the agent's engine_tools entry if \
                 this call should be allowed.",
            ),
            ErrorKind::Security => Some(
                "Inspect the engine log for the rejected arguments; schema \
                 details are not returned to agents.",
            ),
            ErrorKind::AgentFailure => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one typed error that crosses the dispatcher boundary. Raw errors are
/// always converted into this by the classifier before propagating.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct OperationalError {
    pub kind: ErrorKind,
    pub message: String,
    pub remediation: Option<&'static str>,
}

impl OperationalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remediation: kind.remediation(),
        }
    }

    pub const fn is_operational(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::DbConnection.is_retryable());
        assert!(ErrorKind::ToolExecution.is_retryable());
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(!ErrorKind::Security.is_retryable());
        assert!(!ErrorKind::AgentFailure.is_retryable());
    }

    #[test]
    fn new_fills_in_the_remediation_hint() {
        let err = OperationalError::new(ErrorKind::DbConnection, "bolt refused");
        assert!(err.remediation.unwrap().contains("NEO4J_URI"));
        assert_eq!(err.to_string(), "DB_CONNECTION: bolt refused");
    }
}
