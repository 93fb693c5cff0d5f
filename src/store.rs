//! Whole-document persistence boundary.
//!
//! The orchestrator persists everything in a single JSON document holding the
//! rule/chain catalog, the capped plan history, the capped execution ring,
//! and the capped execution log. Any storage technology that offers
//! whole-document `load`/`save` satisfies the [`DocumentStore`] contract;
//! this module ships a file-backed store for the CLI and an in-memory store
//! for tests.
//!
//! The document is the unit of consistency: callers mutate a loaded copy and
//! write it back in full. The engine serializes that load-modify-save cycle
//! behind a mutex; see [`crate::engine`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::catalog;
use crate::error::OrchestratorResult;
use crate::models::{Chain, Execution, LogEntry, Plan, Rule};

/// Most recent plans retained in history
pub const PLAN_HISTORY_CAP: usize = 300;

/// Most recent executions retained
pub const EXECUTION_CAP: usize = 500;

/// Most recent log entries retained globally
pub const LOG_CAP: usize = 2000;

/// The persisted document: catalog plus capped history rings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default)]
    pub chains: Vec<Chain>,

    /// Capped ring of built plans, newest appended, oldest evicted
    #[serde(default)]
    pub plan_history: Vec<Plan>,

    /// Capped ring of executions, newest appended, oldest evicted
    #[serde(default)]
    pub executions: Vec<Execution>,

    /// Capped ring of audit log entries, insertion ordered
    #[serde(default)]
    pub execution_logs: Vec<LogEntry>,
}

impl Document {
    /// Seed the built-in catalog when the document carries none
    pub fn ensure_catalog_defaults(&mut self) {
        if self.rules.is_empty() {
            self.rules = catalog::default_rules();
        }
        if self.chains.is_empty() {
            self.chains = catalog::default_chains();
        }
    }

    /// Append a plan, evicting the oldest past the cap
    pub fn push_plan(&mut self, plan: Plan) {
        push_capped(&mut self.plan_history, plan, PLAN_HISTORY_CAP);
    }

    /// Append an execution, evicting the oldest past the cap
    pub fn push_execution(&mut self, execution: Execution) {
        push_capped(&mut self.executions, execution, EXECUTION_CAP);
    }

    /// Append a log entry, evicting the oldest past the cap
    pub fn push_log(&mut self, entry: LogEntry) {
        push_capped(&mut self.execution_logs, entry, LOG_CAP);
    }
}

/// FIFO capped append: newest at the back, oldest evicted from the front
fn push_capped<T>(items: &mut Vec<T>, item: T, cap: usize) {
    items.push(item);
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

/// Storage collaborator: whole-document load and save.
///
/// A durable backing store used under concurrency must provide at least a
/// critical section around each load-modify-save cycle; the engine supplies
/// one mutex-guarded cycle per operation.
pub trait DocumentStore: Send + Sync {
    /// Load the full document; an empty backing medium yields the default
    fn load(&self) -> OrchestratorResult<Document>;

    /// Replace the full document
    fn save(&self, doc: &Document) -> OrchestratorResult<()>;
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<Document>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a document
    pub fn with_document(doc: Document) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> OrchestratorResult<Document> {
        Ok(self.doc.lock().unwrap().clone())
    }

    fn save(&self, doc: &Document) -> OrchestratorResult<()> {
        *self.doc.lock().unwrap() = doc.clone();
        Ok(())
    }
}

/// JSON-file-backed store.
///
/// A missing file loads as the default document; `save` creates parent
/// directories and rewrites the file in full.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self) -> OrchestratorResult<Document> {
        if !self.path.exists() {
            return Ok(Document::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Document::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, doc: &Document) -> OrchestratorResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(doc)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}
