//! Running built-in workflow templates end to end against the mock.

use std::sync::{Arc, Mutex};

use conductor::agent::{AgentRegistry, StaticRegistry};
use conductor::core::task::TaskId;
use conductor::executor::AgentExecutor;
use conductor::orchestration::EventKind;
use conductor::workflow::{
    execute_workflow, find_template, format_workflow_report, WorkflowConfig, WorkflowParams,
    WorkflowProgress,
};
use conductor::Error;

use crate::fixtures::MockExecutor;

fn review_params() -> WorkflowParams {
    WorkflowParams::from([
        ("code".to_string(), "fn add(a: i32, b: i32) -> i32 { a + b }".to_string()),
        ("language".to_string(), "rust".to_string()),
    ])
}

fn builtin_registry() -> Arc<dyn AgentRegistry> {
    Arc::new(StaticRegistry::builtin())
}

fn config_with_key() -> WorkflowConfig {
    WorkflowConfig {
        api_key: Some("sk-test".to_string()),
        ..Default::default()
    }
}

/// Given the code-review template and a mock executor
/// When the workflow runs
/// Then every review and the summary succeed and progress reaches the total
#[tokio::test]
async fn test_code_review_workflow_runs_to_completion() {
    let template = find_template("code-review").unwrap();
    let params = review_params();
    let executor = MockExecutor::new().shared();

    let progress = Arc::new(Mutex::new(Vec::<WorkflowProgress>::new()));
    let sink = progress.clone();
    let config = WorkflowConfig {
        on_progress: Some(Arc::new(move |p: &WorkflowProgress| {
            sink.lock().unwrap().push(p.clone())
        })),
        ..config_with_key()
    };

    let connected = executor.clone();
    let results = execute_workflow(template, &params, config, builtin_registry(), move |key| {
        assert_eq!(key, "sk-test");
        Ok(connected as Arc<dyn AgentExecutor>)
    })
    .await
    .unwrap();

    assert_eq!(results.len(), 5);
    assert!(results.values().all(|r| r.success));
    assert_eq!(executor.call_count(), 5);

    let progress = progress.lock().unwrap();
    assert!(!progress.iter().any(|p| p.kind == EventKind::TaskAdded));
    let last = progress.last().unwrap();
    assert_eq!(last.kind, EventKind::ExecutionCompleted);
    assert_eq!(last.settled, 5);
    assert_eq!(last.total, 5);

    // The summary runs last and sees every review.
    let summary = &results[&TaskId::from("review-summary")];
    assert_eq!(summary.metadata.as_ref().unwrap().wave, 2);
}

/// Given a failing review
/// When the workflow runs and the report is rendered
/// Then the report lists the failure and the summary's degraded input
#[tokio::test]
async fn test_report_shows_failures() {
    let template = find_template("code-review").unwrap();
    let params = review_params();
    let tasks = template.build_tasks(&params);
    let scan_prompt = tasks
        .iter()
        .find(|t| t.id.as_str() == "security-scan")
        .map(|t| t.prompt.clone())
        .unwrap();
    let executor = MockExecutor::new().failing(&scan_prompt).shared();

    let connected = executor.clone();
    let results = execute_workflow(
        template,
        &params,
        config_with_key(),
        builtin_registry(),
        move |_| Ok(connected as Arc<dyn AgentExecutor>),
    )
    .await
    .unwrap();

    let report = format_workflow_report(template, &results);
    assert!(report.starts_with("# Code Review Report"));
    assert!(report.contains("5 total, 4 succeeded, 1 failed"));
    assert!(report.contains("### security-scan (security-auditor)"));
    assert!(report.contains("> Error: Agent execution failed:"));
    assert!(report.contains("- Degraded inputs: security-scan"));
}

/// Given no API key
/// When the workflow is started
/// Then it fails before connecting
#[tokio::test]
async fn test_missing_api_key_rejected() {
    let template = find_template("code-review").unwrap();
    let config = WorkflowConfig {
        api_key: Some("   ".to_string()),
        ..Default::default()
    };

    let err = execute_workflow(template, &review_params(), config, builtin_registry(), |_| {
        panic!("must not connect without a key")
    })
    .await
    .unwrap_err();

    assert!(matches!(err, Error::MissingApiKey));
}

/// Given missing required parameters
/// When the workflow is started
/// Then every problem is reported and nothing runs
#[tokio::test]
async fn test_invalid_parameters_rejected() {
    let template = find_template("security-audit").unwrap();
    let params = WorkflowParams::from([("project_name".to_string(), "bad name!".to_string())]);
    let executor = MockExecutor::new().shared();

    let connected = executor.clone();
    let err = execute_workflow(
        template,
        &params,
        config_with_key(),
        builtin_registry(),
        move |_| Ok(connected as Arc<dyn AgentExecutor>),
    )
    .await
    .unwrap_err();

    match err {
        Error::InvalidParameters(errors) => {
            assert!(errors.iter().any(|e| e.contains("target is required")));
            assert!(errors.iter().any(|e| e.contains("project_name")));
        }
        other => panic!("Expected InvalidParameters, got {:?}", other),
    }
    assert_eq!(executor.call_count(), 0);
}

/// Given a parallelism override of one
/// When the workflow runs
/// Then agents never overlap
#[tokio::test(start_paused = true)]
async fn test_max_parallel_override_applies() {
    let template = find_template("code-review").unwrap();
    let executor = MockExecutor::new()
        .with_delay(std::time::Duration::from_millis(50))
        .shared();
    let config = WorkflowConfig {
        max_parallel_agents: Some(1),
        ..config_with_key()
    };

    let connected = executor.clone();
    execute_workflow(
        template,
        &review_params(),
        config,
        builtin_registry(),
        move |_| Ok(connected as Arc<dyn AgentExecutor>),
    )
    .await
    .unwrap();

    assert_eq!(executor.max_concurrency(), 1);
}
