//! Bounded-retry correction loop with scripted collaborators

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use task_orchestrator::{
    AttemptRecord, AttemptSink, CorrectionOracle, CorrectionRunner, DocumentStore, MemoryStore,
    OperationExecutor, OrchestratorError, OrchestratorResult, StoreAttemptSink,
};

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Executor that replays a scripted sequence of outcomes
struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<Result<serde_json::Value, String>>>,
    calls: AtomicU32,
}

impl ScriptedExecutor {
    fn new(outcomes: Vec<Result<serde_json::Value, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationExecutor for ScriptedExecutor {
    async fn execute(&self, _operation: &str) -> OrchestratorResult<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(OrchestratorError::execution(message)),
            None => Err(OrchestratorError::execution("script exhausted")),
        }
    }
}

/// Oracle that always proposes the same replacement, or always fails
struct ScriptedOracle {
    replacement: String,
    fail: bool,
    calls: AtomicU32,
}

impl ScriptedOracle {
    fn suggesting(replacement: &str) -> Self {
        Self {
            replacement: replacement.to_string(),
            fail: false,
            calls: AtomicU32::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            replacement: String::new(),
            fail: true,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorrectionOracle for ScriptedOracle {
    async fn propose_correction(
        &self,
        _id: &str,
        _question: &str,
        _context: &str,
        _previous_operation: &str,
        _error_message: &str,
    ) -> OrchestratorResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(OrchestratorError::internal("oracle unavailable"))
        } else {
            Ok(self.replacement.clone())
        }
    }
}

/// Sink that keeps records in memory for assertions
#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<AttemptRecord>>,
}

impl MemorySink {
    fn records(&self) -> Vec<AttemptRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AttemptSink for MemorySink {
    fn record(&self, record: &AttemptRecord) -> OrchestratorResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn runner(
    executor: Arc<ScriptedExecutor>,
    oracle: Arc<ScriptedOracle>,
    sink: Arc<MemorySink>,
) -> CorrectionRunner {
    CorrectionRunner::new(executor, oracle, sink)
}

// ============================================================================
// Loop behavior
// ============================================================================

#[tokio::test]
async fn test_recovers_after_two_corrections() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        Err("syntax error near FROM".to_string()),
        Err("unknown column qty".to_string()),
        Ok(serde_json::json!({"rows": 3})),
    ]));
    let oracle = Arc::new(ScriptedOracle::suggesting(
        "```sql\nSELECT quantity FROM orders\n```",
    ));
    let sink = Arc::new(MemorySink::default());

    let (operation, value) = runner(executor.clone(), oracle.clone(), sink.clone())
        .execute_with_correction("run-1", "SELCT quantity FRM orders", "how many orders", "", 2)
        .await
        .unwrap();

    assert_eq!(executor.calls(), 3);
    assert_eq!(oracle.calls(), 2);
    // Fences from the suggestion are stripped before re-execution
    assert_eq!(operation, "SELECT quantity FROM orders");
    assert_eq!(value, serde_json::json!({"rows": 3}));

    let records = sink.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].attempt, 1);
    assert!(!records[0].success);
    assert_eq!(records[0].error.as_deref(), Some("execution failed: syntax error near FROM"));
    assert!(!records[1].success);
    // Recovered success carries the error it recovered from
    assert!(records[2].success);
    assert_eq!(records[2].attempt, 3);
    assert!(records[2].error.is_some());
}

#[tokio::test]
async fn test_zero_retries_fails_without_consulting_oracle() {
    let executor = Arc::new(ScriptedExecutor::new(vec![Err("boom".to_string())]));
    let oracle = Arc::new(ScriptedOracle::suggesting("SELECT 1"));
    let sink = Arc::new(MemorySink::default());

    let err = runner(executor.clone(), oracle.clone(), sink.clone())
        .execute_with_correction("run-2", "SELECT nope", "q", "", 0)
        .await
        .unwrap_err();

    assert_eq!(executor.calls(), 1);
    assert_eq!(oracle.calls(), 0);
    assert!(matches!(err, OrchestratorError::Execution(_)));
    assert_eq!(err.to_string(), "execution failed: boom");
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test]
async fn test_first_attempt_success_records_nothing() {
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(serde_json::json!(42))]));
    let oracle = Arc::new(ScriptedOracle::suggesting("unused"));
    let sink = Arc::new(MemorySink::default());

    let (operation, value) = runner(executor.clone(), oracle.clone(), sink.clone())
        .execute_with_correction("run-3", "SELECT 42", "q", "", 3)
        .await
        .unwrap();

    assert_eq!(operation, "SELECT 42");
    assert_eq!(value, serde_json::json!(42));
    assert_eq!(oracle.calls(), 0);
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn test_oracle_failure_surfaces_original_error() {
    let executor = Arc::new(ScriptedExecutor::new(vec![Err(
        "relation missing".to_string()
    )]));
    let oracle = Arc::new(ScriptedOracle::failing());
    let sink = Arc::new(MemorySink::default());

    let err = runner(executor.clone(), oracle.clone(), sink.clone())
        .execute_with_correction("run-4", "SELECT * FROM ghosts", "q", "", 3)
        .await
        .unwrap_err();

    // Infrastructure failure of the correction path must not mask the
    // domain failure
    assert_eq!(executor.calls(), 1);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(err.to_string(), "execution failed: relation missing");
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test]
async fn test_budget_exhaustion_reraises_last_error() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        Err("first error".to_string()),
        Err("second error".to_string()),
    ]));
    let oracle = Arc::new(ScriptedOracle::suggesting("SELECT 1"));
    let sink = Arc::new(MemorySink::default());

    let err = runner(executor.clone(), oracle.clone(), sink.clone())
        .execute_with_correction("run-5", "SELECT bad", "q", "", 1)
        .await
        .unwrap_err();

    assert_eq!(executor.calls(), 2);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(err.to_string(), "execution failed: second error");
    assert_eq!(sink.records().len(), 2);
}

// ============================================================================
// Store-backed sink
// ============================================================================

#[tokio::test]
async fn test_store_sink_writes_audit_log_entries() {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(ScriptedExecutor::new(vec![Err("nope".to_string())]));
    let oracle = Arc::new(ScriptedOracle::suggesting("unused"));
    let sink = Arc::new(StoreAttemptSink::new(store.clone()));

    let _ = CorrectionRunner::new(executor, oracle, sink)
        .execute_with_correction("run-6", "SELECT bad", "q", "", 0)
        .await;

    let doc = store.load().unwrap();
    let entries: Vec<_> = doc
        .execution_logs
        .iter()
        .filter(|e| e.execution_id == "run-6")
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].step, "attempt_1");
    assert_eq!(entries[0].status, "failure");
    assert_eq!(entries[0].detail, "SELECT bad");
    assert!(entries[0].metadata.contains_key("error"));
}
