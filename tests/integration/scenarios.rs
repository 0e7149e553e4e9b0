//! End-to-end orchestration scenarios.
//!
//! Each test drives a full `execute()` against the mock executor and
//! checks ordering through the recorded invocation windows.

use std::time::Duration;

use conductor::config::OrchestratorConfig;
use conductor::core::task::TaskId;
use conductor::orchestration::context::PRUNE_MARKER;
use conductor::orchestration::OrchestratorEvent;

use crate::fixtures::{diamond_tasks, orchestrator, record_events, task, MockExecutor};

/// Scenario A: diamond a -> {b, c} -> d
/// Given the diamond task set
/// When executed
/// Then waves are [a], [b, c], [d] and d sees both b and c
#[tokio::test(start_paused = true)]
async fn test_diamond_runs_in_three_waves() {
    let long_output = format!("BEGIN{}END", "x".repeat(5000));
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(50))
        .with_output("b", long_output.clone())
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let events = record_events(&orch);
    orch.add_tasks(diamond_tasks());

    let results = orch.execute().await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.values().all(|r| r.success));

    let waves: Vec<Vec<TaskId>> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::WaveStarted { task_ids, .. } => Some(task_ids.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        waves,
        vec![
            vec![TaskId::from("a")],
            vec![TaskId::from("b"), TaskId::from("c")],
            vec![TaskId::from("d")],
        ]
    );

    let a = executor.invocation("a");
    let b = executor.invocation("b");
    let c = executor.invocation("c");
    let d = executor.invocation("d");
    assert!(a.finished <= b.started && a.finished <= c.started);
    assert!(b.finished <= d.started && c.finished <= d.started);

    // d's context carries both dependencies, with b's output pruned.
    assert!(d.system_prompt.contains("worker: output of c"));
    assert!(d.system_prompt.contains("worker: BEGIN"));
    assert!(d.system_prompt.contains("END"));
    assert!(d.system_prompt.contains(PRUNE_MARKER));
    assert!(!d.system_prompt.contains(&long_output));
}

/// Scenario B: two-task cycle
/// Given x depends on y and y depends on x
/// When executed
/// Then execute fails with a circular dependency and nothing runs
#[tokio::test]
async fn test_cycle_fails_before_any_invocation() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let events = record_events(&orch);
    orch.add_tasks([task("x", &["y"]), task("y", &["x"])]);

    let err = orch.execute().await.unwrap_err();

    assert!(err.to_string().starts_with("Circular dependency detected"));
    assert!(err.is_structural());
    assert_eq!(executor.call_count(), 0);
    assert!(orch.get_results(None).is_empty());

    let events = events.lock().unwrap();
    assert!(!events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::ExecutionStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(OrchestratorEvent::ExecutionFailed { .. })
    ));
}

/// Scenario C: failed dependency
/// Given fail1 fails and dep1 depends on it
/// When executed
/// Then dep1 still runs and its context has nothing from fail1
#[tokio::test]
async fn test_dependent_of_failed_task_runs_without_its_output() {
    let executor = MockExecutor::new().failing("fail1").shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks([task("fail1", &[]), task("dep1", &["fail1"])]);

    let results = orch.execute().await.unwrap();

    let failed = &results[&TaskId::from("fail1")];
    assert!(!failed.success);
    assert_eq!(
        failed.error.as_deref(),
        Some("Agent execution failed: fail1 failed on purpose")
    );

    let dependent = &results[&TaskId::from("dep1")];
    assert!(dependent.success);
    assert_eq!(
        dependent.metadata.as_ref().unwrap().failed_dependencies,
        vec![TaskId::from("fail1")]
    );

    let prompt = executor.invocation("dep1").system_prompt;
    assert!(!prompt.contains("## Dependency Outputs"));
    assert!(!prompt.contains("fail1"));
}

/// Scenario D: sequential execution with one slot
/// Given two independent tasks and max_parallel_agents = 1
/// When executed
/// Then the invocation windows do not overlap
#[tokio::test(start_paused = true)]
async fn test_single_slot_runs_strictly_sequentially() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(100))
        .shared();
    let config = OrchestratorConfig::default().with_max_parallel_agents(1);
    let orch = orchestrator(config, executor.clone());
    orch.add_tasks([task("first", &[]), task("second", &[])]);

    let results = orch.execute().await.unwrap();

    assert_eq!(results.len(), 2);
    let first = executor.invocation("first");
    let second = executor.invocation("second");
    assert!(!first.overlaps(&second));
    assert!(first.finished <= second.started);
    assert_eq!(executor.max_concurrency(), 1);
}
