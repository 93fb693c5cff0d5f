//! Bounded-retry execution loop with a correction oracle.
//!
//! Independent of the execution engine: this loop runs an opaque operation
//! (e.g. a SQL query) through an injected executor and, on failure, asks an
//! injected correction oracle for a replacement operation, bounded by a
//! maximum retry count. Every attempt produces exactly one durable record
//! through an [`AttemptSink`], except a first-attempt success which records
//! nothing.
//!
//! Failure semantics: exhausting the retry budget re-raises the last
//! execution error unchanged, and a failure of the oracle itself re-raises
//! the *original* execution error so callers always see the domain failure,
//! never an infrastructure failure of the correction path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::OrchestratorResult;
use crate::models::LogEntry;
use crate::store::DocumentStore;

/// Executor collaborator: runs one operation, may fail for any transient or
/// permanent reason. The loop applies the same retry policy to both.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, operation: &str) -> OrchestratorResult<serde_json::Value>;
}

/// Correction oracle: given a failing operation and its error, proposes a
/// replacement operation. Treated as opaque and fallible.
#[async_trait]
pub trait CorrectionOracle: Send + Sync {
    async fn propose_correction(
        &self,
        id: &str,
        question: &str,
        context: &str,
        previous_operation: &str,
        error_message: &str,
    ) -> OrchestratorResult<String>;
}

/// One durable attempt record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Caller-supplied run id
    pub id: String,

    /// 1-based attempt number
    pub attempt: u32,

    /// Operation text as attempted
    pub operation: String,

    /// The attempt's error, or the prior error on a recovered success
    pub error: Option<String>,

    pub success: bool,

    pub timestamp: DateTime<Utc>,
}

/// Sink for durable attempt records
pub trait AttemptSink: Send + Sync {
    fn record(&self, record: &AttemptRecord) -> OrchestratorResult<()>;
}

/// Store-backed sink: attempt records become log entries in the shared
/// capped audit trail, keyed by the caller-supplied run id.
pub struct StoreAttemptSink {
    store: Arc<dyn DocumentStore>,
}

impl StoreAttemptSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl AttemptSink for StoreAttemptSink {
    fn record(&self, record: &AttemptRecord) -> OrchestratorResult<()> {
        let mut doc = self.store.load()?;
        let mut entry = LogEntry::new(
            &record.id,
            &format!("attempt_{}", record.attempt),
            if record.success { "success" } else { "failure" },
            record.operation.clone(),
        );
        if let Some(error) = &record.error {
            entry = entry.with_metadata("error", serde_json::json!(error));
        }
        doc.push_log(entry);
        self.store.save(&doc)
    }
}

/// Drives `execute -> correct -> re-execute` up to the retry budget.
pub struct CorrectionRunner {
    executor: Arc<dyn OperationExecutor>,
    oracle: Arc<dyn CorrectionOracle>,
    sink: Arc<dyn AttemptSink>,
}

impl CorrectionRunner {
    pub fn new(
        executor: Arc<dyn OperationExecutor>,
        oracle: Arc<dyn CorrectionOracle>,
        sink: Arc<dyn AttemptSink>,
    ) -> Self {
        Self {
            executor,
            oracle,
            sink,
        }
    }

    /// Execute `operation`, correcting and re-attempting on failure.
    ///
    /// For `max_retries = N` the executor runs at most `N + 1` times and the
    /// oracle at most `N` times. Returns the operation that finally
    /// succeeded together with its result.
    pub async fn execute_with_correction(
        &self,
        id: &str,
        operation: &str,
        question: &str,
        context: &str,
        max_retries: u32,
    ) -> OrchestratorResult<(String, serde_json::Value)> {
        let mut operation = operation.to_string();
        let mut previous_error: Option<String> = None;
        let mut attempt: u32 = 1;

        loop {
            match self.executor.execute(&operation).await {
                Ok(value) => {
                    if attempt > 1 {
                        self.sink.record(&AttemptRecord {
                            id: id.to_string(),
                            attempt,
                            operation: operation.clone(),
                            error: previous_error.clone(),
                            success: true,
                            timestamp: Utc::now(),
                        })?;
                    }
                    debug!(id, attempt, "operation succeeded");
                    return Ok((operation, value));
                }
                Err(err) => {
                    let message = err.to_string();
                    self.sink.record(&AttemptRecord {
                        id: id.to_string(),
                        attempt,
                        operation: operation.clone(),
                        error: Some(message.clone()),
                        success: false,
                        timestamp: Utc::now(),
                    })?;

                    if attempt > max_retries {
                        warn!(id, attempt, "retry budget exhausted");
                        return Err(err);
                    }

                    let replacement = match self
                        .oracle
                        .propose_correction(id, question, context, &operation, &message)
                        .await
                    {
                        Ok(replacement) => replacement,
                        Err(oracle_err) => {
                            // The correction failure must not mask the real
                            // failure; re-raise the original error.
                            warn!(id, %oracle_err, "correction oracle failed");
                            return Err(err);
                        }
                    };
                    operation = strip_code_fences(&replacement);
                    previous_error = Some(message);
                    attempt += 1;
                }
            }
        }
    }
}

/// Strip surrounding markdown code-fence markup from a suggested operation.
///
/// Handles an optional language tag on the opening fence. Text without
/// fences is returned trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the language tag line on a multi-line fence
    let body = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    body.trim().to_string()
}
