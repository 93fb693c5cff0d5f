//! Built-in rule/chain catalog and YAML catalog loading.
//!
//! Rules and chains are static reference data: the engine looks them up but
//! never mutates them. A fresh document is seeded with the defaults below so
//! plan building works out of the box; operators replace them wholesale with
//! YAML catalogs through the CLI.

use std::collections::BTreeMap;

use crate::error::OrchestratorResult;
use crate::models::{Chain, ChainStep, Rule};

/// Workflow mode used when no enabled chain exists
pub const DEFAULT_MODE: &str = "sequential";

/// Hard-coded split template used when the catalog has no rules at all
pub const GENERIC_SPLIT_TEMPLATE: [&str; 3] = [
    "Clarify the request",
    "Carry out the core work",
    "Summarize and hand off",
];

/// Agent assigned when a rule names no preferred agents
pub const DEFAULT_AGENT: &str = "generalist";

fn toolset(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
    pairs
        .iter()
        .map(|(name, enabled)| (name.to_string(), *enabled))
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Built-in decomposition rules, probed in order
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "rule-data-analysis".to_string(),
            name: "Data Analysis".to_string(),
            enabled: true,
            keywords: strings(&["analyze", "analysis", "data", "metric", "report", "sql"]),
            split_template: strings(&[
                "Profile the relevant data",
                "Run the analysis",
                "Compile findings into a report",
            ]),
            preferred_agents: strings(&["data-analyst", "data-analyst", "report-writer"]),
            toolset: toolset(&[("sql", true), ("charts", true), ("web_search", false)]),
        },
        Rule {
            id: "rule-research".to_string(),
            name: "Research".to_string(),
            enabled: true,
            keywords: strings(&["research", "investigate", "compare", "survey"]),
            split_template: strings(&[
                "Scope the research question",
                "Gather and evaluate sources",
                "Synthesize conclusions",
            ]),
            preferred_agents: strings(&["researcher", "researcher", "editor"]),
            toolset: toolset(&[("web_search", true), ("documents", true)]),
        },
        Rule {
            id: "rule-engineering".to_string(),
            name: "Engineering".to_string(),
            enabled: true,
            keywords: strings(&["implement", "build", "code", "fix", "deploy"]),
            split_template: strings(&[
                "Design the change",
                "Implement and test",
                "Review and release",
            ]),
            preferred_agents: strings(&["architect", "engineer", "reviewer"]),
            toolset: toolset(&[("code", true), ("shell", true)]),
        },
    ]
}

/// Built-in workflow chains, probed in order
pub fn default_chains() -> Vec<Chain> {
    vec![
        Chain {
            id: "chain-relay".to_string(),
            name: "Sequential Relay".to_string(),
            enabled: true,
            mode: "sequential".to_string(),
            steps: vec![
                ChainStep {
                    name: "plan".to_string(),
                    role: "planner".to_string(),
                    handoff_to: Some("execute".to_string()),
                },
                ChainStep {
                    name: "execute".to_string(),
                    role: "worker".to_string(),
                    handoff_to: Some("review".to_string()),
                },
                ChainStep {
                    name: "review".to_string(),
                    role: "reviewer".to_string(),
                    handoff_to: None,
                },
            ],
        },
        Chain {
            id: "chain-pair".to_string(),
            name: "Pair Review".to_string(),
            enabled: false,
            mode: "pair".to_string(),
            steps: vec![
                ChainStep {
                    name: "draft".to_string(),
                    role: "author".to_string(),
                    handoff_to: Some("critique".to_string()),
                },
                ChainStep {
                    name: "critique".to_string(),
                    role: "critic".to_string(),
                    handoff_to: None,
                },
            ],
        },
    ]
}

/// Parse a YAML rule catalog (a top-level sequence of rules)
pub fn rules_from_yaml(raw: &str) -> OrchestratorResult<Vec<Rule>> {
    Ok(serde_yaml::from_str(raw)?)
}

/// Parse a YAML chain catalog (a top-level sequence of chains)
pub fn chains_from_yaml(raw: &str) -> OrchestratorResult<Vec<Chain>> {
    Ok(serde_yaml::from_str(raw)?)
}
