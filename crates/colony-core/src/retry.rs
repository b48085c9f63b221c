use std::future::Future;
use std::time::Duration;

use tracing::warn;

use colony_types::OperationalError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Tools the dispatcher may transparently re-attempt. Idempotent reads
/// only; a retried mutation would double-apply, so mutating tools must
/// never be listed here.
pub const RETRYABLE_TOOLS: &[&str] = &[
    "research.deep_dig",
    "research.evaluate_sources",
    "code_intelligence.findUsages",
    "code_intelligence.getDefinition",
];

pub fn is_retryable_tool(tool_name: &str) -> bool {
    RETRYABLE_TOOLS.contains(&tool_name)
}

/// Run `op` up to `max_retries` times with exponential backoff
/// (`base_delay * 2^(attempt-1)` after attempt `attempt` fails). An error
/// whose kind is not retryable propagates immediately.
pub async fn with_retry<F, Fut, T>(
    mut op: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, OperationalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationalError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_retries || !err.kind.is_retryable() {
                    return Err(err);
                }
                let delay = base_delay * 2u32.pow(attempt - 1);
                warn!(
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
