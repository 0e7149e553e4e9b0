//! Failure isolation and structural validation.

use std::time::Duration;

use conductor::config::OrchestratorConfig;
use conductor::core::task::{Task, TaskId};
use conductor::orchestration::OrchestratorEvent;
use conductor::Error;

use crate::fixtures::{orchestrator, record_events, task, MockExecutor};

/// Given one failing task among independent siblings
/// When executed
/// Then only that task fails and the run itself succeeds
#[tokio::test(start_paused = true)]
async fn test_failure_does_not_affect_siblings() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(10))
        .failing("b")
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks([task("a", &[]), task("b", &[]), task("c", &[])]);

    let results = orch.execute().await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[&TaskId::from("a")].success);
    assert!(!results[&TaskId::from("b")].success);
    assert!(results[&TaskId::from("c")].success);

    let status = orch.get_status();
    assert_eq!(status.succeeded, 2);
    assert_eq!(status.failed, 1);
}

/// Given a chain whose root fails
/// When executed
/// Then every downstream task still runs and records the failed input
#[tokio::test]
async fn test_failure_propagates_only_as_metadata() {
    let executor = MockExecutor::new().failing("a").shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks([task("a", &[]), task("b", &["a"]), task("c", &["b"])]);

    let results = orch.execute().await.unwrap();

    assert_eq!(executor.call_count(), 3);
    let b = &results[&TaskId::from("b")];
    assert!(b.success);
    assert_eq!(
        b.metadata.as_ref().unwrap().failed_dependencies,
        vec![TaskId::from("a")]
    );
    let c = &results[&TaskId::from("c")];
    assert!(c.metadata.as_ref().unwrap().failed_dependencies.is_empty());
    assert!(executor.invocation("c").system_prompt.contains("worker: output of b"));
}

/// Given a task naming an agent the registry does not know
/// When executed
/// Then it fails without invoking the executor and others proceed
#[tokio::test]
async fn test_missing_agent_fails_task_only() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let events = record_events(&orch);
    orch.add_tasks([
        Task::new("ghost", "nobody", "Unknown agent", "ghost"),
        task("real", &[]),
    ]);

    let results = orch.execute().await.unwrap();

    let ghost = &results[&TaskId::from("ghost")];
    assert!(!ghost.success);
    assert_eq!(ghost.error.as_deref(), Some("Agent not found: nobody"));
    assert!(results[&TaskId::from("real")].success);
    assert_eq!(executor.call_count(), 1);

    let events = events.lock().unwrap();
    assert!(!events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::AgentInvoked { task_id, .. } if task_id.as_str() == "ghost"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::TaskFailed { task_id, .. } if task_id.as_str() == "ghost"
    )));
}

/// Given a dependency on an id that was never added
/// When executed
/// Then execution fails before anything runs
#[tokio::test]
async fn test_unknown_dependency_is_structural() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks([task("a", &[]), task("b", &["missing"])]);

    let err = orch.execute().await.unwrap_err();

    assert!(matches!(
        &err,
        Error::UnknownDependency { task, dependency }
            if task.as_str() == "b" && dependency.as_str() == "missing"
    ));
    assert!(err.is_structural());
    assert_eq!(executor.call_count(), 0);
    assert!(orch.get_results(None).is_empty());
}

/// Given two tasks with the same id
/// When executed
/// Then execution fails with a duplicate id error
#[tokio::test]
async fn test_duplicate_id_is_structural() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks([task("a", &[]), task("a", &[])]);

    let err = orch.execute().await.unwrap_err();

    assert!(matches!(&err, Error::DuplicateTask(id) if id.as_str() == "a"));
    assert_eq!(executor.call_count(), 0);
}

/// Given a self-dependency
/// When executed
/// Then it is reported as a cycle
#[tokio::test]
async fn test_self_dependency_is_cycle() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_task(task("loop", &["loop"]));

    let err = orch.execute().await.unwrap_err();

    assert!(matches!(err, Error::CircularDependency { .. }));
    assert_eq!(executor.call_count(), 0);
}

/// Given a failed structural run
/// When the graph is fixed and execute is called again
/// Then the orchestrator is usable and runs normally
#[tokio::test]
async fn test_orchestrator_recovers_after_structural_error() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks([task("x", &["y"]), task("y", &["x"])]);
    assert!(orch.execute().await.is_err());
    assert!(!orch.get_status().is_executing);

    orch.reset();
    orch.add_tasks([task("x", &[]), task("y", &["x"])]);
    let results = orch.execute().await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.values().all(|r| r.success));
}

/// Given an empty queue
/// When executed
/// Then the run succeeds with no results
#[tokio::test]
async fn test_empty_queue_yields_empty_results() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let events = record_events(&orch);

    let results = orch.execute().await.unwrap();

    assert!(results.is_empty());
    assert_eq!(executor.call_count(), 0);
    assert!(matches!(
        events.lock().unwrap().last(),
        Some(OrchestratorEvent::ExecutionCompleted { total: 0, .. })
    ));
}
