//! Execution engine: the orchestrator's mutable state machine.
//!
//! The engine instantiates executions from plans and drives every task
//! through `pending -> ready -> running -> {completed | failed | skipped}`,
//! with `failed -> pending` via explicit retry. It exposes:
//!
//! - manual task transitions (`task_action`)
//! - one-step automatic advancement (`tick`)
//! - a bounded multi-tick driver (`run`)
//! - side-effecting reads that re-normalize derived state
//! - the rule/chain/plan/log surface around them
//!
//! Every mutating operation is one mutex-guarded load-modify-save cycle
//! against the document store; the whole document is the unit of
//! consistency.

pub mod state;

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{Chain, Execution, ExecutionStatus, LogEntry, Plan, Rule, TaskStatus};
use crate::planner;
use crate::store::{Document, DocumentStore};
use state::{deps_completed, derive_status, promote_ready, TaskAction};

/// Upper bound on automatic steps per `run` call
pub const MAX_RUN_STEPS: usize = 200;

/// Request to start a new execution: either an existing plan id or a
/// question to build a fresh plan from.
#[derive(Debug, Clone, Default)]
pub struct StartExecution {
    pub plan_id: Option<String>,
    pub question: Option<String>,
    pub scene: String,
    pub auto_start: bool,
}

/// The orchestration engine over a document store.
///
/// One mutex serializes every load-modify-save cycle, so each public
/// operation executes to completion without interleaving against the same
/// store.
pub struct Orchestrator {
    store: Arc<dyn DocumentStore>,
    cycle: Mutex<()>,
}

impl Orchestrator {
    /// Create an engine over the given store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            cycle: Mutex::new(()),
        }
    }

    /// One guarded load-modify-save cycle. A domain error from `f` leaves
    /// the store untouched.
    fn with_document<T>(
        &self,
        f: impl FnOnce(&mut Document) -> OrchestratorResult<T>,
    ) -> OrchestratorResult<T> {
        let _guard = self.cycle.lock().unwrap();
        let mut doc = self.store.load()?;
        let out = f(&mut doc)?;
        self.store.save(&doc)?;
        Ok(out)
    }

    // ========================================================================
    // Catalog surface
    // ========================================================================

    /// List catalog rules (seeding defaults into an empty document)
    pub fn list_rules(&self) -> OrchestratorResult<Vec<Rule>> {
        self.with_document(|doc| {
            doc.ensure_catalog_defaults();
            Ok(doc.rules.clone())
        })
    }

    /// Replace the whole rule catalog, returning the new rule count
    pub fn replace_rules(&self, rules: Vec<Rule>) -> OrchestratorResult<usize> {
        self.with_document(|doc| {
            doc.rules = rules;
            Ok(doc.rules.len())
        })
    }

    /// List catalog chains (seeding defaults into an empty document)
    pub fn list_chains(&self) -> OrchestratorResult<Vec<Chain>> {
        self.with_document(|doc| {
            doc.ensure_catalog_defaults();
            Ok(doc.chains.clone())
        })
    }

    /// Replace the whole chain catalog, returning the new chain count
    pub fn replace_chains(&self, chains: Vec<Chain>) -> OrchestratorResult<usize> {
        self.with_document(|doc| {
            doc.chains = chains;
            Ok(doc.chains.len())
        })
    }

    // ========================================================================
    // Plan surface
    // ========================================================================

    /// Build a plan from a question and append it to the capped history
    pub fn build_plan(
        &self,
        question: &str,
        scene: &str,
        category_hint: Option<&str>,
    ) -> OrchestratorResult<Plan> {
        self.with_document(|doc| {
            doc.ensure_catalog_defaults();
            let plan = planner::build_plan(doc, question, scene, category_hint)?;
            doc.push_plan(plan.clone());
            info!(plan_id = %plan.plan_id, category = %plan.category, "plan built");
            Ok(plan)
        })
    }

    /// Plan history, oldest first, newest appended
    pub fn list_plans(&self) -> OrchestratorResult<Vec<Plan>> {
        self.with_document(|doc| Ok(doc.plan_history.clone()))
    }

    // ========================================================================
    // Execution lifecycle
    // ========================================================================

    /// Start a new execution from an existing plan or a fresh question.
    ///
    /// Fails with `NotFound` when an explicit plan id does not resolve and
    /// with `InvalidArgument` when neither plan id nor question is supplied.
    /// With `auto_start` the top-level state is forced to `running` and
    /// `started_at` stamped immediately, even before any task is ready.
    pub fn start_execution(&self, request: StartExecution) -> OrchestratorResult<Execution> {
        self.with_document(|doc| {
            doc.ensure_catalog_defaults();

            let plan = match (&request.plan_id, &request.question) {
                (Some(plan_id), _) => doc
                    .plan_history
                    .iter()
                    .find(|p| p.plan_id == *plan_id)
                    .cloned()
                    .ok_or_else(|| {
                        OrchestratorError::not_found(format!("plan '{}'", plan_id))
                    })?,
                (None, Some(question)) => {
                    let plan = planner::build_plan(doc, question, &request.scene, None)?;
                    doc.push_plan(plan.clone());
                    plan
                }
                (None, None) => {
                    return Err(OrchestratorError::invalid_argument(
                        "either plan_id or question is required",
                    ))
                }
            };

            let mut execution = Execution::from_plan(&plan, request.auto_start);
            normalize(&mut execution);
            if request.auto_start {
                execution.status = ExecutionStatus::Running;
                execution.started_at = Some(Utc::now());
            }

            doc.push_log(
                LogEntry::new(
                    &execution.execution_id,
                    "execution_start",
                    execution.status.as_str(),
                    format!("execution created from plan {}", plan.plan_id),
                )
                .with_metadata("auto_start", serde_json::json!(request.auto_start))
                .with_metadata("tasks", serde_json::json!(execution.tasks.len())),
            );
            doc.push_execution(execution.clone());
            info!(execution_id = %execution.execution_id, plan_id = %plan.plan_id, "execution started");
            Ok(execution)
        })
    }

    /// Apply a manual task transition: start, complete, fail, retry, or skip.
    ///
    /// Appends a `task_<action>` log entry, re-normalizes, and persists.
    pub fn task_action(
        &self,
        execution_id: &str,
        task_id: &str,
        action: &str,
        note: Option<&str>,
    ) -> OrchestratorResult<Execution> {
        let action = TaskAction::parse(action)?;
        self.with_document(|doc| {
            let index = find_execution(doc, execution_id)?;
            let detail = {
                let execution = &mut doc.executions[index];
                apply_task_action(execution, task_id, action, note)?
            };
            normalize(&mut doc.executions[index]);

            let snapshot = doc.executions[index].clone();
            let attempts = snapshot.task(task_id).map(|t| t.attempts).unwrap_or(0);
            doc.push_log(
                LogEntry::new(
                    execution_id,
                    task_id,
                    &format!("task_{}", action.as_str()),
                    detail,
                )
                .with_metadata("attempts", serde_json::json!(attempts)),
            );
            debug!(execution_id, task_id, action = action.as_str(), "task action applied");
            Ok(snapshot)
        })
    }

    /// One automatic advancement step.
    ///
    /// A terminal execution is returned unchanged with no log entry and no
    /// mutation. Otherwise the running task (if any) is completed with a
    /// synthetic output summary; failing that, the first ready task is
    /// promoted and completed within the same call, so one tick retires
    /// exactly one task end to end. The automatic driver never fails a task
    /// on its own.
    pub fn tick(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        self.with_document(|doc| tick_in_document(doc, execution_id))
    }

    /// Tick repeatedly until the execution reaches a terminal state or the
    /// step budget (clamped to [1, 200]) is exhausted.
    pub fn run(&self, execution_id: &str, max_steps: usize) -> OrchestratorResult<Execution> {
        let steps = max_steps.clamp(1, MAX_RUN_STEPS);
        self.with_document(|doc| {
            let mut snapshot = tick_in_document(doc, execution_id)?;
            for _ in 1..steps {
                if snapshot.status.is_terminal() {
                    break;
                }
                snapshot = tick_in_document(doc, execution_id)?;
            }
            Ok(snapshot)
        })
    }

    /// Cancel a non-terminal execution. `cancelled` is sticky: later ticks
    /// and normalization leave it untouched.
    pub fn cancel_execution(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        self.with_document(|doc| {
            let index = find_execution(doc, execution_id)?;
            {
                let execution = &mut doc.executions[index];
                if execution.status.is_terminal() {
                    return Err(OrchestratorError::precondition_failed(format!(
                        "execution is already {}",
                        execution.status.as_str()
                    )));
                }
                execution.status = ExecutionStatus::Cancelled;
                execution.finished_at = Some(Utc::now());
            }
            let snapshot = doc.executions[index].clone();
            doc.push_log(LogEntry::new(
                execution_id,
                "execution_cancel",
                snapshot.status.as_str(),
                "execution cancelled by operator",
            ));
            warn!(execution_id, "execution cancelled");
            Ok(snapshot)
        })
    }

    /// Fetch one execution. Normalization runs before returning, so a read
    /// may persist newly derived state.
    pub fn get_execution(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        self.with_document(|doc| {
            let index = find_execution(doc, execution_id)?;
            normalize(&mut doc.executions[index]);
            Ok(doc.executions[index].clone())
        })
    }

    /// List all retained executions, normalizing each before returning
    pub fn list_executions(&self) -> OrchestratorResult<Vec<Execution>> {
        self.with_document(|doc| {
            for execution in doc.executions.iter_mut() {
                normalize(execution);
            }
            Ok(doc.executions.clone())
        })
    }

    // ========================================================================
    // Log surface
    // ========================================================================

    /// Append a free-form log entry to the capped audit trail
    pub fn append_log(&self, entry: LogEntry) -> OrchestratorResult<LogEntry> {
        self.with_document(|doc| {
            doc.push_log(entry.clone());
            Ok(entry)
        })
    }

    /// List log entries in insertion order, optionally filtered by execution
    /// id and truncated to the most recent `limit`
    pub fn list_logs(
        &self,
        execution_id: Option<&str>,
        limit: Option<usize>,
    ) -> OrchestratorResult<Vec<LogEntry>> {
        self.with_document(|doc| {
            let mut entries: Vec<LogEntry> = doc
                .execution_logs
                .iter()
                .filter(|e| execution_id.map_or(true, |id| e.execution_id == id))
                .cloned()
                .collect();
            if let Some(limit) = limit {
                if entries.len() > limit {
                    entries.drain(..entries.len() - limit);
                }
            }
            Ok(entries)
        })
    }
}

/// Locate an execution by id within the document
fn find_execution(doc: &Document, execution_id: &str) -> OrchestratorResult<usize> {
    doc.executions
        .iter()
        .position(|e| e.execution_id == execution_id)
        .ok_or_else(|| OrchestratorError::not_found(format!("execution '{}'", execution_id)))
}

/// Re-derive the execution's state from its task states.
///
/// Terminal executions are left untouched. On entering `completed` the
/// finish timestamp is stamped exactly once and a result summary recorded if
/// none exists; entering `failed` stamps the finish timestamp.
fn normalize(execution: &mut Execution) {
    if execution.status.is_terminal() {
        return;
    }
    promote_ready(&mut execution.tasks);
    execution.status = derive_status(&execution.tasks);
    match execution.status {
        ExecutionStatus::Completed => {
            if execution.finished_at.is_none() {
                execution.finished_at = Some(Utc::now());
            }
            if execution.result_summary.is_none() {
                let completed = execution
                    .tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Completed)
                    .count();
                let skipped = execution.tasks.len() - completed;
                execution.result_summary = Some(format!(
                    "{} tasks completed, {} skipped",
                    completed, skipped
                ));
            }
        }
        ExecutionStatus::Failed => {
            if execution.finished_at.is_none() {
                execution.finished_at = Some(Utc::now());
            }
        }
        _ => {}
    }
}

/// Apply one manual transition to a task, returning the log detail.
///
/// Guard matrix:
/// - `start` only from pending or ready, with all dependencies completed
/// - `complete` and `fail` are allowed from running, ready, or pending
/// - `retry` only from failed; attempts are preserved
/// - `skip` from anything not already completed or skipped; a skipped task
///   never satisfies its dependents' `depends_on`, so skipping a mid-chain
///   task strands its dependents for the automatic driver and they must be
///   completed or skipped manually
fn apply_task_action(
    execution: &mut Execution,
    task_id: &str,
    action: TaskAction,
    note: Option<&str>,
) -> OrchestratorResult<String> {
    let now = Utc::now();
    let position = execution
        .tasks
        .iter()
        .position(|t| t.task_id == task_id)
        .ok_or_else(|| OrchestratorError::not_found(format!("task '{}'", task_id)))?;

    match action {
        TaskAction::Start => {
            if !matches!(
                execution.tasks[position].status,
                TaskStatus::Pending | TaskStatus::Ready
            ) {
                return Err(OrchestratorError::precondition_failed(format!(
                    "task '{}' cannot be started from '{}'",
                    task_id,
                    execution.tasks[position].status.as_str()
                )));
            }
            if !deps_completed(&execution.tasks, &execution.tasks[position]) {
                return Err(OrchestratorError::precondition_failed(format!(
                    "task '{}' has incomplete dependencies",
                    task_id
                )));
            }
            let task = &mut execution.tasks[position];
            task.status = TaskStatus::Running;
            task.attempts += 1;
            task.error = None;
            if task.started_at.is_none() {
                task.started_at = Some(now);
            }
            execution.status = ExecutionStatus::Running;
            if execution.started_at.is_none() {
                execution.started_at = Some(now);
            }
            Ok(format!("task started (attempt {})", execution.tasks[position].attempts))
        }
        TaskAction::Complete => {
            let task = &mut execution.tasks[position];
            if !matches!(
                task.status,
                TaskStatus::Running | TaskStatus::Ready | TaskStatus::Pending
            ) {
                return Err(OrchestratorError::precondition_failed(format!(
                    "task '{}' cannot be completed from '{}'",
                    task_id,
                    task.status.as_str()
                )));
            }
            task.status = TaskStatus::Completed;
            task.finished_at = Some(now);
            task.output_summary = Some(
                note.map(|n| n.to_string())
                    .unwrap_or_else(|| "completed by operator".to_string()),
            );
            Ok("task completed".to_string())
        }
        TaskAction::Fail => {
            let task = &mut execution.tasks[position];
            if !matches!(
                task.status,
                TaskStatus::Running | TaskStatus::Ready | TaskStatus::Pending
            ) {
                return Err(OrchestratorError::precondition_failed(format!(
                    "task '{}' cannot be failed from '{}'",
                    task_id,
                    task.status.as_str()
                )));
            }
            task.status = TaskStatus::Failed;
            task.finished_at = Some(now);
            task.error = Some(
                note.map(|n| n.to_string())
                    .unwrap_or_else(|| "task failed".to_string()),
            );
            execution.status = ExecutionStatus::Failed;
            if execution.finished_at.is_none() {
                execution.finished_at = Some(now);
            }
            Ok("task failed".to_string())
        }
        TaskAction::Retry => {
            let task = &mut execution.tasks[position];
            if task.status != TaskStatus::Failed {
                return Err(OrchestratorError::precondition_failed(format!(
                    "task '{}' is '{}', only failed tasks can be retried",
                    task_id,
                    task.status.as_str()
                )));
            }
            task.status = TaskStatus::Pending;
            task.finished_at = None;
            task.error = None;
            // Un-stick the failed execution so normalization runs again;
            // attempts keep growing across retries.
            execution.status = ExecutionStatus::Running;
            execution.finished_at = None;
            Ok("task reset for retry".to_string())
        }
        TaskAction::Skip => {
            let task = &mut execution.tasks[position];
            if matches!(task.status, TaskStatus::Completed | TaskStatus::Skipped) {
                return Err(OrchestratorError::precondition_failed(format!(
                    "task '{}' is already '{}'",
                    task_id,
                    task.status.as_str()
                )));
            }
            task.status = TaskStatus::Skipped;
            task.finished_at = Some(now);
            task.output_summary = Some(
                note.map(|n| n.to_string())
                    .unwrap_or_else(|| "skipped by operator".to_string()),
            );
            Ok("task skipped".to_string())
        }
    }
}

/// One tick against an already-loaded document.
///
/// Shared by `tick` and `run` so the multi-step driver stays inside one
/// load-modify-save cycle.
fn tick_in_document(doc: &mut Document, execution_id: &str) -> OrchestratorResult<Execution> {
    let index = find_execution(doc, execution_id)?;
    if doc.executions[index].status.is_terminal() {
        // Idempotent no-op: no mutation, no log entry.
        return Ok(doc.executions[index].clone());
    }

    let now = Utc::now();
    let detail = {
        let execution = &mut doc.executions[index];
        if let Some(task) = execution
            .tasks
            .iter_mut()
            .find(|t| t.status == TaskStatus::Running)
        {
            task.status = TaskStatus::Completed;
            task.finished_at = Some(now);
            if task.output_summary.is_none() {
                task.output_summary = Some(format!("auto-completed by {}", task.assigned_agent));
            }
            format!("completed running task {}", task.task_id)
        } else {
            // Promote the first ready task and complete it within the same
            // call: one tick retires exactly one task.
            promote_ready(&mut execution.tasks);
            match execution
                .tasks
                .iter_mut()
                .find(|t| t.status == TaskStatus::Ready)
            {
                Some(task) => {
                    task.status = TaskStatus::Completed;
                    task.attempts += 1;
                    if task.started_at.is_none() {
                        task.started_at = Some(now);
                    }
                    task.finished_at = Some(now);
                    if task.output_summary.is_none() {
                        task.output_summary =
                            Some(format!("auto-completed by {}", task.assigned_agent));
                    }
                    if execution.started_at.is_none() {
                        execution.started_at = Some(now);
                    }
                    format!("started and completed task {}", task.task_id)
                }
                None => "no runnable task".to_string(),
            }
        }
    };

    normalize(&mut doc.executions[index]);
    let snapshot = doc.executions[index].clone();
    doc.push_log(LogEntry::new(
        execution_id,
        "tick",
        snapshot.status.as_str(),
        detail,
    ));
    debug!(execution_id, status = snapshot.status.as_str(), "tick");
    Ok(snapshot)
}
