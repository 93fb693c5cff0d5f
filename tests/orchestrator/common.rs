//! Common test utilities for the orchestrator integration tests

use std::sync::Arc;
use task_orchestrator::{Execution, MemoryStore, Orchestrator, StartExecution};

/// Engine over a fresh in-memory store
pub fn memory_engine() -> Orchestrator {
    Orchestrator::new(Arc::new(MemoryStore::new()))
}

/// Start a 3-task execution from the built-in data-analysis rule.
///
/// "Analyze the quarterly data" hits the data-analysis keywords, whose split
/// template has three steps forming a linear chain.
pub fn three_task_execution(engine: &Orchestrator, auto_start: bool) -> Execution {
    engine
        .start_execution(StartExecution {
            plan_id: None,
            question: Some("Analyze the quarterly data".to_string()),
            scene: "default".to_string(),
            auto_start,
        })
        .unwrap()
}
