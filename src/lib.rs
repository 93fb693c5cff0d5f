//! Rule-driven task orchestration core.
//!
//! Turns a natural-language request into a dependency-ordered plan of
//! subtasks, assigns each to a named agent, and drives every subtask through
//! an explicit lifecycle with manual and automatic advancement, retry, and
//! skip semantics. A second, independent component runs opaque operations
//! through a bounded-retry loop with a correction oracle.
//!
//! Everything persists in a single JSON document behind the
//! [`store::DocumentStore`] trait; see the `orchestrator` binary for the CLI
//! surface.

// Rule/chain reference data and YAML catalog parsing
pub mod catalog;

// Error taxonomy
pub mod error;

// Execution engine and state machine
pub mod engine;

// Serde data models
pub mod models;

// Plan builder
pub mod planner;

// Bounded-retry correction loop
pub mod retry;

// Whole-document persistence
pub mod store;

pub use engine::{Orchestrator, StartExecution};
pub use error::{OrchestratorError, OrchestratorResult};
pub use models::{
    Chain, ChainStep, Execution, ExecutionStatus, ExecutionTask, LogEntry, Plan, PlannedTask,
    Rule, TaskStatus,
};
pub use retry::{
    AttemptRecord, AttemptSink, CorrectionOracle, CorrectionRunner, OperationExecutor,
    StoreAttemptSink,
};
pub use store::{Document, DocumentStore, JsonFileStore, MemoryStore};
