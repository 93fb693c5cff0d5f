//! Plan builder: turns a natural-language request into an immutable plan.
//!
//! Building is pure over the document's catalog: infer a category from
//! substring probes, stamp the workflow mode from the first enabled chain,
//! match the first enabled rule whose keywords hit the question, and
//! decompose the rule's split template into a linear chain of tasks. The
//! builder never raises for malformed catalog data; every lookup has an
//! empty/default fallback. Only a missing question is an error.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{DEFAULT_AGENT, DEFAULT_MODE, GENERIC_SPLIT_TEMPLATE};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{Plan, PlannedTask, Rule};
use crate::store::Document;

/// Catch-all category when no probe matches and no hint is supplied
pub const DEFAULT_CATEGORY: &str = "general";

/// Substring probes for the closed category set, checked in order
const CATEGORY_PROBES: &[(&str, &[&str])] = &[
    ("data_analysis", &["analy", "data", "metric", "report", "sql", "query"]),
    ("research", &["research", "investigate", "compare", "survey"]),
    ("engineering", &["implement", "build", "code", "fix", "deploy", "refactor"]),
    ("writing", &["write", "draft", "summar", "document", "translate"]),
];

/// Classify a question into the closed category set.
///
/// An explicit hint always wins; otherwise the first probe with a
/// case-insensitive substring hit decides, falling back to the catch-all.
pub fn infer_category(question: &str, hint: Option<&str>) -> String {
    if let Some(hint) = hint {
        let hint = hint.trim();
        if !hint.is_empty() {
            return hint.to_string();
        }
    }
    let lowered = question.to_lowercase();
    for (category, probes) in CATEGORY_PROBES {
        if probes.iter().any(|p| lowered.contains(p)) {
            return (*category).to_string();
        }
    }
    DEFAULT_CATEGORY.to_string()
}

/// First enabled rule with any case-insensitive keyword substring match,
/// falling back to the first enabled rule
fn match_rule<'a>(rules: &'a [Rule], question: &str) -> Option<(&'a Rule, Option<String>)> {
    let lowered = question.to_lowercase();
    for rule in rules.iter().filter(|r| r.enabled) {
        if let Some(keyword) = rule
            .keywords
            .iter()
            .find(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
        {
            return Some((rule, Some(keyword.clone())));
        }
    }
    rules.iter().find(|r| r.enabled).map(|r| (r, None))
}

/// Build an immutable plan from a question against the document's catalog.
///
/// The returned plan is not yet persisted; callers append it to the capped
/// plan history themselves.
pub fn build_plan(
    doc: &Document,
    question: &str,
    scene: &str,
    category_hint: Option<&str>,
) -> OrchestratorResult<Plan> {
    let question = question.trim();
    if question.is_empty() {
        return Err(OrchestratorError::invalid_argument("question must not be empty"));
    }

    let category = infer_category(question, category_hint);
    let mut rationale = vec![match category_hint {
        Some(_) => format!("category '{}' supplied by caller", category),
        None => format!("category '{}' inferred from question", category),
    }];

    let mode = match doc.chains.iter().find(|c| c.enabled) {
        Some(chain) => {
            rationale.push(format!("workflow mode '{}' from chain '{}'", chain.mode, chain.id));
            chain.mode.clone()
        }
        None => {
            rationale.push(format!("no enabled chain, default mode '{}'", DEFAULT_MODE));
            DEFAULT_MODE.to_string()
        }
    };

    let matched = match_rule(&doc.rules, question);
    let (split_template, agents, toolset) = match &matched {
        Some((rule, Some(keyword))) => {
            rationale.push(format!("rule '{}' matched keyword '{}'", rule.id, keyword));
            (rule.split_template.clone(), rule.preferred_agents.clone(), rule.toolset.clone())
        }
        Some((rule, None)) => {
            rationale.push(format!("no keyword match, fell back to first enabled rule '{}'", rule.id));
            (rule.split_template.clone(), rule.preferred_agents.clone(), rule.toolset.clone())
        }
        None => {
            rationale.push("no rules in catalog, used generic split template".to_string());
            (
                GENERIC_SPLIT_TEMPLATE.iter().map(|s| s.to_string()).collect(),
                Vec::new(),
                Default::default(),
            )
        }
    };

    let mut tasks = Vec::with_capacity(split_template.len());
    for (index, title) in split_template.iter().enumerate() {
        let task_id = format!("task_{}", index + 1);
        let assigned_agent = agents
            .get(index)
            .or_else(|| agents.last())
            .cloned()
            .unwrap_or_else(|| DEFAULT_AGENT.to_string());
        let depends_on = if index == 0 {
            Vec::new()
        } else {
            vec![format!("task_{}", index)]
        };
        tasks.push(PlannedTask {
            task_id,
            title: title.clone(),
            objective: format!("[{}] {}", category, title),
            assigned_agent,
            depends_on,
            toolset: toolset.clone(),
        });
    }

    let plan = Plan {
        plan_id: Uuid::new_v4().to_string(),
        scene: scene.to_string(),
        question: question.to_string(),
        category,
        mode,
        tasks,
        rationale,
        created_at: Utc::now(),
    };
    debug!(plan_id = %plan.plan_id, tasks = plan.tasks.len(), "built plan");
    Ok(plan)
}
