//! Parallelism bounds and dependency ordering.

use std::time::Duration;

use conductor::config::OrchestratorConfig;
use conductor::core::task::TaskId;

use crate::fixtures::{diamond_tasks, independent_tasks, orchestrator, task, MockExecutor};

/// Given ten independent tasks and max_parallel_agents = 3
/// When executed
/// Then no more than three invocations overlap and all ten settle
#[tokio::test(start_paused = true)]
async fn test_parallelism_never_exceeds_limit() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(100))
        .shared();
    let config = OrchestratorConfig::default().with_max_parallel_agents(3);
    let orch = orchestrator(config, executor.clone());
    orch.add_tasks(independent_tasks(10));

    let results = orch.execute().await.unwrap();

    assert_eq!(results.len(), 10);
    assert_eq!(executor.call_count(), 10);
    assert_eq!(executor.max_concurrency(), 3);

    let invocations = executor.invocations();
    for inv in &invocations {
        let overlapping = invocations.iter().filter(|other| other.overlaps(inv)).count();
        assert!(overlapping <= 3, "{} overlapped {} invocations", inv.key, overlapping);
    }
}

/// Given a wave smaller than the limit
/// When executed
/// Then the whole wave runs at once
#[tokio::test(start_paused = true)]
async fn test_wave_within_limit_runs_together() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(100))
        .shared();
    let config = OrchestratorConfig::default().with_max_parallel_agents(8);
    let orch = orchestrator(config, executor.clone());
    orch.add_tasks(independent_tasks(4));

    orch.execute().await.unwrap();

    assert_eq!(executor.max_concurrency(), 4);
    let first = executor.invocation("t0");
    for key in ["t1", "t2", "t3"] {
        assert!(executor.invocation(key).overlaps(&first));
    }
}

/// Given a diamond with uneven delays
/// When executed
/// Then every dependency finishes before its dependent starts
#[tokio::test(start_paused = true)]
async fn test_dependencies_finish_before_dependents_start() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(20))
        .with_task_delay("b", Duration::from_millis(300))
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let tasks = diamond_tasks();
    orch.add_tasks(tasks.clone());

    orch.execute().await.unwrap();

    for task in &tasks {
        let dependent = executor.invocation(task.id.as_str());
        for dep in &task.dependencies {
            let dependency = executor.invocation(dep.as_str());
            assert!(
                dependency.finished <= dependent.started,
                "{} started before {} finished",
                task.id,
                dep
            );
        }
    }
}

/// Given a zero parallelism setting
/// When executed
/// Then tasks still run, one at a time
#[tokio::test(start_paused = true)]
async fn test_zero_parallelism_is_treated_as_one() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(10))
        .shared();
    let config = OrchestratorConfig::default().with_max_parallel_agents(0);
    let orch = orchestrator(config, executor.clone());
    orch.add_tasks(independent_tasks(3));

    let results = orch.execute().await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(executor.max_concurrency(), 1);
}

/// Given a running execution
/// When the status is polled mid-wave
/// Then it reports the in-flight tasks and the executing flag
#[tokio::test(start_paused = true)]
async fn test_status_reports_running_tasks() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(100))
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks([task("a", &[]), task("b", &[]), task("c", &["a", "b"])]);

    let (results, status) = tokio::join!(orch.execute(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orch.get_status()
    });

    assert!(status.is_executing);
    assert_eq!(status.running, vec![TaskId::from("a"), TaskId::from("b")]);
    assert_eq!(status.completed, 0);
    assert_eq!(status.queued, 3);

    assert_eq!(results.unwrap().len(), 3);
    let after = orch.get_status();
    assert!(!after.is_executing);
    assert!(after.running.is_empty());
    assert_eq!(after.succeeded, 3);
}

/// Given a run in progress
/// When execute is called again
/// Then the second call is rejected without disturbing the first
#[tokio::test(start_paused = true)]
async fn test_concurrent_execute_is_rejected() {
    let executor = MockExecutor::new()
        .with_delay(Duration::from_millis(100))
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_tasks(independent_tasks(2));

    let (first, second) = tokio::join!(orch.execute(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        orch.execute().await
    });

    assert_eq!(first.unwrap().len(), 2);
    let err = second.unwrap_err();
    assert!(err.to_string().contains("execution already in progress"));
    assert_eq!(executor.call_count(), 2);
}
