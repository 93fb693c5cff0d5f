//! Plan-building behavior through the public engine surface

use super::common::*;
use task_orchestrator::{OrchestratorError, StartExecution};

#[test]
fn test_plan_tasks_form_linear_chain() {
    let engine = memory_engine();
    let plan = engine
        .build_plan("Analyze the quarterly data", "default", None)
        .unwrap();

    assert_eq!(plan.tasks.len(), 3);
    assert!(plan.tasks[0].depends_on.is_empty());
    for (i, task) in plan.tasks.iter().enumerate().skip(1) {
        assert_eq!(task.depends_on, vec![format!("task_{}", i)]);
        assert_eq!(task.task_id, format!("task_{}", i + 1));
    }
}

#[test]
fn test_plan_is_appended_to_history() {
    let engine = memory_engine();
    let plan = engine
        .build_plan("Research battery chemistries", "default", None)
        .unwrap();

    let history = engine.list_plans().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].plan_id, plan.plan_id);
}

#[test]
fn test_category_hint_is_honored() {
    let engine = memory_engine();
    let plan = engine
        .build_plan("Analyze the data", "default", Some("custom_category"))
        .unwrap();
    assert_eq!(plan.category, "custom_category");
}

#[test]
fn test_mode_stamped_from_first_enabled_chain() {
    let engine = memory_engine();
    let plan = engine.build_plan("fix the build", "default", None).unwrap();
    // Built-in catalog: "Sequential Relay" is the first enabled chain
    assert_eq!(plan.mode, "sequential");
}

#[test]
fn test_start_execution_resolves_existing_plan() {
    let engine = memory_engine();
    let plan = engine
        .build_plan("implement the parser", "default", None)
        .unwrap();

    let execution = engine
        .start_execution(StartExecution {
            plan_id: Some(plan.plan_id.clone()),
            question: None,
            scene: "default".to_string(),
            auto_start: false,
        })
        .unwrap();

    assert_eq!(execution.plan_id, plan.plan_id);
    assert_eq!(execution.tasks.len(), plan.tasks.len());
    for (exec_task, plan_task) in execution.tasks.iter().zip(plan.tasks.iter()) {
        assert_eq!(exec_task.task_id, plan_task.task_id);
        assert_eq!(exec_task.assigned_agent, plan_task.assigned_agent);
    }
}

#[test]
fn test_start_execution_unknown_plan_is_not_found() {
    let engine = memory_engine();
    let err = engine
        .start_execution(StartExecution {
            plan_id: Some("no-such-plan".to_string()),
            question: None,
            scene: "default".to_string(),
            auto_start: false,
        })
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}

#[test]
fn test_start_execution_requires_plan_or_question() {
    let engine = memory_engine();
    let err = engine
        .start_execution(StartExecution {
            plan_id: None,
            question: None,
            scene: "default".to_string(),
            auto_start: false,
        })
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
}

#[test]
fn test_replace_rules_drives_planning() {
    let engine = memory_engine();
    let rules = task_orchestrator::catalog::rules_from_yaml(
        r#"
- id: rule-only
  name: Only Rule
  keywords: [widget]
  split_template: ["Make the widget", "Ship the widget"]
  preferred_agents: [maker]
  toolset:
    lathe: true
"#,
    )
    .unwrap();
    engine.replace_rules(rules).unwrap();

    let plan = engine
        .build_plan("please widget this", "default", None)
        .unwrap();
    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.tasks[0].assigned_agent, "maker");
    assert_eq!(plan.tasks[1].assigned_agent, "maker");
    assert_eq!(plan.tasks[0].toolset.get("lathe"), Some(&true));
}
