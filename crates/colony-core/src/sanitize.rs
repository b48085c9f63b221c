use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::{json, Value};
use tracing::warn;

use colony_types::{ErrorKind, OperationalError};

/// Validates tool arguments against a static per-tool schema table.
///
/// Unknown tool names pass through unchanged so new tools work before a
/// schema ships for them. Violation details go to the log only; the caller
/// sees a flat `SECURITY` error that never echoes schema internals.
pub struct SchemaValidator {
    validators: HashMap<&'static str, Validator>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        let mut validators = HashMap::new();
        for (tool, schema) in tool_schemas() {
            // the schema table is static, a compile failure is a programming error
            let validator = jsonschema::validator_for(&schema)
                .expect("static tool schema must compile");
            validators.insert(tool, validator);
        }
        Self { validators }
    }

    pub fn has_schema(&self, tool_name: &str) -> bool {
        self.validators.contains_key(tool_name)
    }

    pub fn sanitize(&self, tool_name: &str, args: &Value) -> Result<Value, OperationalError> {
        let Some(validator) = self.validators.get(tool_name) else {
            return Ok(args.clone());
        };
        let violations: Vec<String> = validator
            .iter_errors(args)
            .map(|err| err.to_string())
            .collect();
        if violations.is_empty() {
            return Ok(args.clone());
        }
        warn!(
            tool = tool_name,
            violations = ?violations,
            "tool arguments rejected by schema"
        );
        Err(OperationalError::new(
            ErrorKind::Security,
            format!("input_sanitization_failed for tool '{tool_name}'"),
        ))
    }
}

fn tool_schemas() -> Vec<(&'static str, Value)> {
    vec![
        (
            "file_system.readFile",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "minLength": 1 }
                },
                "required": ["path"]
            }),
        ),
        (
            "file_system.writeFile",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "minLength": 1 },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            }),
        ),
        (
            "shell.execute",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "minLength": 1 }
                },
                "required": ["command"]
            }),
        ),
        (
            "research.deep_dig",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "minLength": 3 }
                },
                "required": ["query"]
            }),
        ),
        (
            "colony.createBlueprint",
            json!({
                "type": "object",
                "properties": {
                    "goal": { "type": "string", "minLength": 1 }
                },
                "required": ["goal"]
            }),
        ),
        (
            "system.updateStatus",
            json!({
                "type": "object",
                "properties": {
                    "newStatus": { "type": "string", "minLength": 1 },
                    "message": { "type": "string" }
                },
                "required": ["newStatus"]
            }),
        ),
        (
            "code_intelligence.findUsages",
            json!({
                "type": "object",
                "properties": {
                    "symbolName": { "type": "string", "minLength": 1 }
                },
                "required": ["symbolName"]
            }),
        ),
        (
            "git.commit",
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "minLength": 1 }
                },
                "required": ["message"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_arguments_pass_through() {
        let validator = SchemaValidator::new();
        let args = json!({ "path": "src/main.rs" });
        let safe = validator.sanitize("file_system.readFile", &args).unwrap();
        assert_eq!(safe, args);
    }

    #[test]
    fn missing_required_field_is_a_security_error() {
        let validator = SchemaValidator::new();
        let err = validator
            .sanitize("file_system.writeFile", &json!({ "path": "a.txt" }))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Security);
        assert_eq!(
            err.message,
            "input_sanitization_failed for tool 'file_system.writeFile'"
        );
        // the schema detail must not leak into the message
        assert!(!err.message.contains("content"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let validator = SchemaValidator::new();
        let err = validator
            .sanitize("shell.execute", &json!({ "command": 7 }))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Security);
    }

    #[test]
    fn unknown_tools_pass_through_unchanged() {
        let validator = SchemaValidator::new();
        let args = json!({ "anything": ["goes", 1, null] });
        let safe = validator.sanitize("future.newTool", &args).unwrap();
        assert_eq!(safe, args);
        assert!(!validator.has_schema("future.newTool"));
    }

    #[test]
    fn short_research_queries_are_rejected() {
        let validator = SchemaValidator::new();
        let err = validator
            .sanitize("research.deep_dig", &json!({ "query": "ab" }))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Security);
    }
}
