//! Pure state-machine helpers for the execution engine.
//!
//! Execution-level status is never stored independently of task states: it is
//! recomputed from them after every mutation, except once a terminal state is
//! reached. The helpers here are pure functions so the derivation rules can
//! be tested without a store.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{ExecutionStatus, ExecutionTask, TaskStatus};

/// Manual transitions accepted by `task_action`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Start,
    Complete,
    Fail,
    Retry,
    Skip,
}

impl TaskAction {
    /// Parse an action name; anything else is an invalid argument
    pub fn parse(action: &str) -> OrchestratorResult<Self> {
        match action {
            "start" => Ok(Self::Start),
            "complete" => Ok(Self::Complete),
            "fail" => Ok(Self::Fail),
            "retry" => Ok(Self::Retry),
            "skip" => Ok(Self::Skip),
            other => Err(OrchestratorError::invalid_argument(format!(
                "unknown task action '{}'",
                other
            ))),
        }
    }

    /// Stable name used in log entries (`task_start`, `task_retry`, ...)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Retry => "retry",
            Self::Skip => "skip",
        }
    }
}

/// Whether every dependency of `task` is completed.
///
/// A dependency id with no matching task can never be satisfied; the builder
/// only emits valid ids, but the check stays general for hand-edited data.
pub fn deps_completed(tasks: &[ExecutionTask], task: &ExecutionTask) -> bool {
    task.depends_on.iter().all(|dep| {
        tasks
            .iter()
            .any(|t| t.task_id == *dep && t.status == TaskStatus::Completed)
    })
}

/// Promote every pending task whose dependencies are all completed to ready.
/// Returns true when anything changed.
pub fn promote_ready(tasks: &mut Vec<ExecutionTask>) -> bool {
    let mut changed = false;
    for index in 0..tasks.len() {
        if tasks[index].status == TaskStatus::Pending && deps_completed(tasks, &tasks[index]) {
            tasks[index].status = TaskStatus::Ready;
            changed = true;
        }
    }
    changed
}

/// Derive the execution-level status from the task statuses.
///
/// Skipped tasks count as done; a single failed task fails the execution;
/// any ready or running task means the execution is in flight.
pub fn derive_status(tasks: &[ExecutionTask]) -> ExecutionStatus {
    if tasks.is_empty() {
        return ExecutionStatus::Pending;
    }
    if tasks
        .iter()
        .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Skipped))
    {
        return ExecutionStatus::Completed;
    }
    if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
        return ExecutionStatus::Failed;
    }
    if tasks
        .iter()
        .any(|t| matches!(t.status, TaskStatus::Running | TaskStatus::Ready))
    {
        return ExecutionStatus::Running;
    }
    ExecutionStatus::Pending
}
