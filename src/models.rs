//! Data models for the orchestration core.
//!
//! Three groups of types live here:
//!
//! 1. **Catalog** - `Rule` and `Chain`, immutable reference data consulted by
//!    the plan builder and never mutated by the engine.
//! 2. **Plan** - `Plan` and `PlannedTask`, the immutable decomposition of a
//!    request produced by the plan builder.
//! 3. **Execution** - `Execution`, `ExecutionTask`, and `LogEntry`, the
//!    mutable per-run state driven by the execution engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Catalog Types
// ============================================================================

/// Keyword-triggered decomposition rule.
///
/// A rule matches when any of its keywords appears (case-insensitive) as a
/// substring of the incoming question. Its split template provides the task
/// titles, its preferred agents the assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule id
    pub id: String,

    /// Human-readable rule name
    pub name: String,

    /// Disabled rules are skipped during matching
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Match keywords, probed as case-insensitive substrings
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Ordered decomposition-step titles
    #[serde(default)]
    pub split_template: Vec<String>,

    /// Preferred agent names, assigned by position (clamped to the last)
    #[serde(default)]
    pub preferred_agents: Vec<String>,

    /// Capability name -> enabled, copied onto every task
    #[serde(default)]
    pub toolset: BTreeMap<String, bool>,
}

/// One step in a workflow chain template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    /// Step name
    pub name: String,

    /// Role of the collaborating agent in this step
    pub role: String,

    /// Name of the step this one hands off to, if any
    #[serde(default)]
    pub handoff_to: Option<String>,
}

/// Named workflow template describing a sequence of collaborating roles.
///
/// The first enabled chain stamps the workflow mode on every plan; its steps
/// are descriptive reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    /// Unique chain id
    pub id: String,

    /// Human-readable chain name
    pub name: String,

    /// Disabled chains are skipped during selection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Workflow mode tag stamped onto plans
    pub mode: String,

    /// Ordered collaboration steps
    #[serde(default)]
    pub steps: Vec<ChainStep>,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Plan Types
// ============================================================================

/// A single plan-time task.
///
/// Task ids are sequential within the plan (`task_1`, `task_2`, ...).
/// `depends_on` holds task ids; the builder only ever produces a linear
/// chain, but the engine resolves dependencies generally so the schema
/// already permits branching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Sequential id, unique within the plan
    pub task_id: String,

    /// Step title from the matched rule's split template
    pub title: String,

    /// Templated objective embedding the category and step title
    pub objective: String,

    /// Agent name assigned from the rule's preferred-agent list
    pub assigned_agent: String,

    /// Ids of tasks that must complete before this one
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Toolset copied from the matched rule
    #[serde(default)]
    pub toolset: BTreeMap<String, bool>,
}

/// Immutable decomposition of a request into ordered, dependent tasks.
///
/// Created once by the plan builder and appended to a capped history; never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique plan id
    pub plan_id: String,

    /// Caller-supplied scene tag
    pub scene: String,

    /// Original natural-language question
    pub question: String,

    /// Inferred (or hinted) request category
    pub category: String,

    /// Workflow mode stamped from the selected chain
    pub mode: String,

    /// Ordered tasks forming a linear dependency chain
    pub tasks: Vec<PlannedTask>,

    /// Human-readable notes on how the plan was built
    #[serde(default)]
    pub rationale: Vec<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Execution Types
// ============================================================================

/// Task lifecycle states.
///
/// `ready` is derived: a normalization pass promotes any `pending` task whose
/// dependencies are all `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Terminal task states never transition again except `failed` via retry
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Stable string form, matching the serialized representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Execution-level states.
///
/// Recomputed from task states after every mutation, except the terminal
/// states which are sticky once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal execution states skip normalization entirely
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable string form, matching the serialized representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Live state of one task inside an execution. Owned exclusively by its
/// execution, 1:1 with a task in the originating plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTask {
    /// Task id, unique within the execution
    pub task_id: String,

    /// Task title
    pub title: String,

    /// Assigned agent name
    pub assigned_agent: String,

    /// Ids of tasks that must complete before this one may start
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Toolset copied from the plan task
    #[serde(default)]
    pub toolset: BTreeMap<String, bool>,

    /// Current lifecycle state
    pub status: TaskStatus,

    /// Start count; monotonically non-decreasing, +1 per `start`
    pub attempts: u32,

    /// First start timestamp
    pub started_at: Option<DateTime<Utc>>,

    /// Completion/failure/skip timestamp
    pub finished_at: Option<DateTime<Utc>>,

    /// Output summary recorded on completion or skip
    pub output_summary: Option<String>,

    /// Error recorded on failure, cleared on start/retry
    pub error: Option<String>,
}

impl ExecutionTask {
    /// Instantiate a fresh execution task from a plan task
    pub fn from_planned(task: &PlannedTask) -> Self {
        Self {
            task_id: task.task_id.clone(),
            title: task.title.clone(),
            assigned_agent: task.assigned_agent.clone(),
            depends_on: task.depends_on.clone(),
            toolset: task.toolset.clone(),
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            output_summary: None,
            error: None,
        }
    }
}

/// One mutable run of a plan, tracking live task status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution id
    pub execution_id: String,

    /// Id of the originating plan
    pub plan_id: String,

    /// Denormalized from the plan for standalone display
    pub question: String,
    pub scene: String,
    pub category: String,
    pub mode: String,

    /// Derived top-level state (sticky once terminal)
    pub status: ExecutionStatus,

    /// Whether the run was started in automatic mode
    pub auto_start: bool,

    /// Lifecycle timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Per-task live state, 1:1 with the plan's tasks
    pub tasks: Vec<ExecutionTask>,

    /// Result summary stamped when the execution completes
    pub result_summary: Option<String>,
}

impl Execution {
    /// Instantiate an execution from a plan, all tasks pending
    pub fn from_plan(plan: &Plan, auto_start: bool) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            plan_id: plan.plan_id.clone(),
            question: plan.question.clone(),
            scene: plan.scene.clone(),
            category: plan.category.clone(),
            mode: plan.mode.clone(),
            status: ExecutionStatus::Pending,
            auto_start,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            tasks: plan.tasks.iter().map(ExecutionTask::from_planned).collect(),
            result_summary: None,
        }
    }

    /// Find a task by id
    pub fn task(&self, task_id: &str) -> Option<&ExecutionTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }
}

/// Append-only audit record of an engine action or state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Execution this entry belongs to
    pub execution_id: String,

    /// Step name (task id, "tick", "execution_start", ...)
    pub step: String,

    /// Status or action tag ("task_start", "running", ...)
    pub status: String,

    /// Free-text detail
    #[serde(default)]
    pub detail: String,

    /// Structured extras
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Insertion timestamp
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Create an entry timestamped now, with empty metadata
    pub fn new(execution_id: &str, step: &str, status: &str, detail: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            step: step.to_string(),
            status: status.to_string(),
            detail: detail.into(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a metadata value
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}
