//! CLI for the task orchestration engine.
//!
//! Every subcommand maps 1:1 onto a public engine operation: build plans,
//! start executions, apply manual task actions, tick or run the automatic
//! driver, and inspect the catalog, history, and audit log. State lives in a
//! single JSON document (default `~/.task-orchestrator/store.json`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use task_orchestrator::{catalog, models::LogEntry, JsonFileStore, Orchestrator, StartExecution};

/// Rule-driven task orchestration engine
#[derive(Parser, Debug)]
#[command(name = "orchestrator")]
#[command(about = "Rule-driven task orchestration engine")]
#[command(version)]
struct Cli {
    /// Path to the JSON document store
    ///
    /// Defaults to ~/.task-orchestrator/store.json
    #[arg(long, value_name = "PATH", global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a plan from a question and append it to the plan history
    Plan {
        /// Natural-language request to decompose
        #[arg(long)]
        question: String,

        /// Scene tag stamped onto the plan
        #[arg(long, default_value = "default")]
        scene: String,

        /// Category hint; skips inference when given
        #[arg(long)]
        category: Option<String>,
    },

    /// Start an execution from an existing plan or a fresh question
    Start {
        /// Id of a plan from the history
        #[arg(long)]
        plan_id: Option<String>,

        /// Question to build a fresh plan from
        #[arg(long)]
        question: Option<String>,

        /// Scene tag for a freshly built plan
        #[arg(long, default_value = "default")]
        scene: String,

        /// Force the execution to running immediately
        #[arg(long)]
        auto_start: bool,
    },

    /// Apply a manual task transition (start, complete, fail, retry, skip)
    Action {
        execution_id: String,
        task_id: String,
        action: String,

        /// Free-text note recorded as output summary or error
        #[arg(long)]
        note: Option<String>,
    },

    /// Advance one automatic step
    Tick { execution_id: String },

    /// Tick until terminal or the step budget is exhausted
    Run {
        execution_id: String,

        /// Step budget, clamped to [1, 200]
        #[arg(long, default_value_t = 50)]
        max_steps: usize,
    },

    /// Cancel a non-terminal execution
    Cancel { execution_id: String },

    /// Show one execution
    Show { execution_id: String },

    /// List all retained executions
    List,

    /// List the plan history
    Plans,

    /// List audit log entries
    Logs {
        /// Only entries for this execution
        #[arg(long)]
        execution_id: Option<String>,

        /// Most recent entries to keep
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Append a free-form log entry
    Log {
        execution_id: String,
        step: String,
        status: String,

        #[arg(long, default_value = "")]
        detail: String,
    },

    /// List catalog rules
    Rules,

    /// Replace the rule catalog from a YAML file
    ReplaceRules {
        /// YAML file holding a sequence of rules
        #[arg(long)]
        file: PathBuf,
    },

    /// List catalog chains
    Chains,

    /// Replace the chain catalog from a YAML file
    ReplaceChains {
        /// YAML file holding a sequence of chains
        #[arg(long)]
        file: PathBuf,
    },
}

fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".task-orchestrator").join("store.json"))
        .unwrap_or_else(|| PathBuf::from("store.json"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let store_path = cli.store.unwrap_or_else(default_store_path);
    let engine = Orchestrator::new(Arc::new(JsonFileStore::new(store_path)));

    match cli.command {
        Command::Plan {
            question,
            scene,
            category,
        } => {
            let plan = engine
                .build_plan(&question, &scene, category.as_deref())
                .context("failed to build plan")?;
            print_json(&plan)?;
        }
        Command::Start {
            plan_id,
            question,
            scene,
            auto_start,
        } => {
            let execution = engine
                .start_execution(StartExecution {
                    plan_id,
                    question,
                    scene,
                    auto_start,
                })
                .context("failed to start execution")?;
            print_json(&execution)?;
        }
        Command::Action {
            execution_id,
            task_id,
            action,
            note,
        } => {
            let execution = engine
                .task_action(&execution_id, &task_id, &action, note.as_deref())
                .context("task action failed")?;
            print_json(&execution)?;
        }
        Command::Tick { execution_id } => {
            let execution = engine.tick(&execution_id).context("tick failed")?;
            print_json(&execution)?;
        }
        Command::Run {
            execution_id,
            max_steps,
        } => {
            let execution = engine.run(&execution_id, max_steps).context("run failed")?;
            print_json(&execution)?;
        }
        Command::Cancel { execution_id } => {
            let execution = engine
                .cancel_execution(&execution_id)
                .context("cancel failed")?;
            print_json(&execution)?;
        }
        Command::Show { execution_id } => {
            let execution = engine
                .get_execution(&execution_id)
                .context("execution lookup failed")?;
            print_json(&execution)?;
        }
        Command::List => {
            let executions = engine.list_executions()?;
            print_json(&executions)?;
        }
        Command::Plans => {
            let plans = engine.list_plans()?;
            print_json(&plans)?;
        }
        Command::Logs {
            execution_id,
            limit,
        } => {
            let entries = engine.list_logs(execution_id.as_deref(), limit)?;
            print_json(&entries)?;
        }
        Command::Log {
            execution_id,
            step,
            status,
            detail,
        } => {
            let entry = engine.append_log(LogEntry::new(&execution_id, &step, &status, detail))?;
            print_json(&entry)?;
        }
        Command::Rules => {
            let rules = engine.list_rules()?;
            print_json(&rules)?;
        }
        Command::ReplaceRules { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let rules = catalog::rules_from_yaml(&raw).context("invalid rule catalog")?;
            let count = engine.replace_rules(rules)?;
            println!("{} rules installed", count);
        }
        Command::Chains => {
            let chains = engine.list_chains()?;
            print_json(&chains)?;
        }
        Command::ReplaceChains { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let chains = catalog::chains_from_yaml(&raw).context("invalid chain catalog")?;
            let count = engine.replace_chains(chains)?;
            println!("{} chains installed", count);
        }
    }

    Ok(())
}
