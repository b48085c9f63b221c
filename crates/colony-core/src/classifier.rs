use tracing::debug;

use colony_types::{ErrorKind, OperationalError};

/// Where a failure happened, for classification and logging.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub agent_id: &'a str,
    pub tool_name: &'a str,
}

/// Convert any raw error into the one typed error that crosses the
/// dispatcher boundary. An error that already is an `OperationalError`
/// passes through untouched so upstream classification is never
/// second-guessed; everything else is classified by message signature,
/// defaulting to `AGENT_FAILURE`.
pub fn classify(err: anyhow::Error, ctx: &ErrorContext<'_>) -> OperationalError {
    classify_with_default(err, ctx, ErrorKind::AgentFailure)
}

/// Like `classify`, but with the caller's fallback kind for errors no
/// signature matches. A failure raised by a tool handler is the tool's own
/// failure (`TOOL_EXECUTION`), not an agent failure, so the dispatcher
/// passes that as the fallback.
pub fn classify_with_default(
    err: anyhow::Error,
    ctx: &ErrorContext<'_>,
    fallback: ErrorKind,
) -> OperationalError {
    let err = match err.downcast::<OperationalError>() {
        Ok(operational) => return operational,
        Err(err) => err,
    };

    let message = format!("{err:#}");
    let signature = message.to_ascii_lowercase();

    let kind = if signature.contains("connection refused")
        || signature.contains("econnrefused")
        || signature.contains("timed out")
        || signature.contains("timeout")
        || signature.contains("authentication")
    {
        ErrorKind::DbConnection
    } else if signature.contains("not permitted") {
        ErrorKind::PermissionDenied
    } else if signature.contains("sanitization") {
        ErrorKind::Security
    } else if signature.contains("not found")
        && (signature.contains("tool") || signature.contains("manifest"))
    {
        ErrorKind::ToolExecution
    } else {
        fallback
    };

    debug!(
        agent = ctx.agent_id,
        tool = ctx.tool_name,
        kind = %kind,
        "classified raw error"
    );
    OperationalError::new(
        kind,
        format!(
            "agent '{}' tool '{}' failed: {message}",
            ctx.agent_id, ctx.tool_name
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    const CTX: ErrorContext<'static> = ErrorContext {
        agent_id: "dev",
        tool_name: "research.deep_dig",
    };

    #[test]
    fn operational_errors_pass_through_untouched() {
        let original = OperationalError::new(ErrorKind::Security, "input_sanitization_failed");
        let classified = classify(anyhow::Error::new(original.clone()), &CTX);
        assert_eq!(classified.kind, ErrorKind::Security);
        assert_eq!(classified.message, original.message);
    }

    #[test]
    fn connection_signatures_map_to_db_connection() {
        for raw in [
            "connection refused by bolt://localhost",
            "ECONNREFUSED 127.0.0.1:7687",
            "request timed out after 30s",
            "authentication failure for user neo4j",
        ] {
            let classified = classify(anyhow!("{raw}"), &CTX);
            assert_eq!(classified.kind, ErrorKind::DbConnection, "for {raw:?}");
        }
    }

    #[test]
    fn permission_signature_maps_to_permission_denied() {
        let classified = classify(anyhow!("Agent 'qa' not permitted for tool 'x'."), &CTX);
        assert_eq!(classified.kind, ErrorKind::PermissionDenied);
    }

    #[test]
    fn missing_tool_signature_maps_to_tool_execution() {
        let classified = classify(anyhow!("Tool 'shell.execute' not found."), &CTX);
        assert_eq!(classified.kind, ErrorKind::ToolExecution);
    }

    #[test]
    fn everything_else_is_an_agent_failure() {
        let classified = classify(anyhow!("the model produced malformed output"), &CTX);
        assert_eq!(classified.kind, ErrorKind::AgentFailure);
        assert!(classified.message.contains("dev"));
        assert!(classified.message.contains("research.deep_dig"));
    }

    #[test]
    fn the_fallback_kind_applies_only_to_unmatched_signatures() {
        let classified = classify_with_default(
            anyhow!("upstream service returned HTTP 500"),
            &CTX,
            ErrorKind::ToolExecution,
        );
        assert_eq!(classified.kind, ErrorKind::ToolExecution);

        let classified = classify_with_default(
            anyhow!("connection refused"),
            &CTX,
            ErrorKind::ToolExecution,
        );
        assert_eq!(classified.kind, ErrorKind::DbConnection);
    }

    #[test]
    fn context_chains_are_part_of_the_signature() {
        let err = anyhow!("socket closed").context("connection refused");
        let classified = classify(err, &CTX);
        assert_eq!(classified.kind, ErrorKind::DbConnection);
    }
}
