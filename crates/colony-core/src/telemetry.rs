use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// One dispatcher call, success or failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsageRecord<'a> {
    pub tool_name: &'a str,
    pub success: bool,
    pub agent_id: &'a str,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A task reaching a terminal-ish status through the lifecycle helpers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcomeRecord<'a> {
    pub task_id: &'a str,
    pub status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<&'a str>,
}

/// Append-only JSONL metrics file. Telemetry is a side channel: a write
/// failure is logged and swallowed, it never fails the operation that
/// produced the record.
pub struct TelemetrySink {
    path: PathBuf,
}

impl TelemetrySink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record_tool_usage(&self, record: &ToolUsageRecord<'_>) {
        self.append("tool_usage", record).await;
    }

    pub async fn record_task_outcome(&self, record: &TaskOutcomeRecord<'_>) {
        self.append("task_outcome", record).await;
    }

    async fn append<T: Serialize>(&self, metric: &str, payload: &T) {
        if let Err(err) = self.try_append(metric, payload).await {
            warn!(metric, error = %err, "telemetry write failed");
        }
    }

    async fn try_append<T: Serialize>(&self, metric: &str, payload: &T) -> anyhow::Result<()> {
        let mut record = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        record.insert("metric".to_string(), Value::String(metric.to_string()));
        record.insert(
            "timestamp".to_string(),
            serde_json::to_value(Utc::now())?,
        );

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_vec(&Value::Object(record))?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_land_as_one_json_line_each() {
        let dir = tempfile::tempdir().unwrap();
        let sink = TelemetrySink::new(dir.path().join("metrics/usage.jsonl"));
        sink.record_tool_usage(&ToolUsageRecord {
            tool_name: "file_system.readFile",
            success: true,
            agent_id: "qa",
            execution_time_ms: 12,
            error: None,
        })
        .await;
        sink.record_tool_usage(&ToolUsageRecord {
            tool_name: "shell.execute",
            success: false,
            agent_id: "dev",
            execution_time_ms: 340,
            error: Some("AGENT_FAILURE: boom".to_string()),
        })
        .await;

        let text = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["metric"], "tool_usage");
        assert_eq!(lines[0]["toolName"], "file_system.readFile");
        assert_eq!(lines[0]["success"], true);
        assert!(lines[0].get("error").is_none());
        assert_eq!(lines[1]["error"], "AGENT_FAILURE: boom");
        assert!(lines[1]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unwritable_sink_does_not_panic() {
        let sink = TelemetrySink::new("/dev/null/not-a-dir/usage.jsonl");
        sink.record_task_outcome(&TaskOutcomeRecord {
            task_id: "t1",
            status: "COMPLETED",
            agent_id: Some("dev"),
        })
        .await;
    }
}
