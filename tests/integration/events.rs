//! Lifecycle event ordering as seen by listeners.

use std::sync::{Arc, Mutex};

use conductor::config::OrchestratorConfig;
use conductor::orchestration::{EventKind, OrchestratorEvent};

use crate::fixtures::{chain_tasks, orchestrator, record_events, task, MockExecutor};

fn names(events: &[OrchestratorEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event.task_id() {
            Some(id) => format!("{} {}", event.kind(), id),
            None => event.kind().to_string(),
        })
        .collect()
}

/// Given a three-task chain
/// When executed
/// Then listeners see the full lifecycle in order
#[tokio::test]
async fn test_chain_event_order() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let events = record_events(&orch);
    orch.add_tasks(chain_tasks());

    orch.execute().await.unwrap();

    let mut expected = vec![
        "task:added a".to_string(),
        "task:added b".to_string(),
        "task:added c".to_string(),
        "execution:start".to_string(),
    ];
    for id in ["a", "b", "c"] {
        expected.extend([
            "wave:start".to_string(),
            format!("task:start {}", id),
            format!("agent:invoke {}", id),
            format!("task:complete {}", id),
            "wave:complete".to_string(),
        ]);
    }
    expected.push("execution:complete".to_string());

    assert_eq!(names(&events.lock().unwrap()), expected);
}

/// Given a failing task
/// When executed
/// Then a task:error event is emitted instead of task:complete
#[tokio::test]
async fn test_failure_emits_task_error() {
    let executor = MockExecutor::new().failing("bad").shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let events = record_events(&orch);
    orch.add_task(task("bad", &[]));

    orch.execute().await.unwrap();

    let events = events.lock().unwrap();
    let failure = events
        .iter()
        .find_map(|e| match e {
            OrchestratorEvent::TaskFailed { task_id, error } => Some((task_id.clone(), error.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(failure.0.as_str(), "bad");
    assert!(failure.1.contains("failed on purpose"));
    assert!(!events
        .iter()
        .any(|e| e.kind() == EventKind::TaskCompleted));
    assert!(matches!(
        events.last(),
        Some(OrchestratorEvent::ExecutionCompleted {
            total: 1,
            succeeded: 0,
            failed: 1,
            ..
        })
    ));
}

/// Given a listener registered for one kind
/// When executed
/// Then it only receives that kind
#[tokio::test]
async fn test_kind_listener_is_filtered() {
    let executor = MockExecutor::new().shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    let waves = Arc::new(Mutex::new(Vec::new()));
    let sink = waves.clone();
    orch.on(EventKind::WaveCompleted, move |event| {
        if let OrchestratorEvent::WaveCompleted { wave, succeeded, .. } = event {
            sink.lock().unwrap().push((*wave, *succeeded));
        }
    });
    orch.add_tasks([task("a", &[]), task("b", &[]), task("c", &["a", "b"])]);

    orch.execute().await.unwrap();

    assert_eq!(*waves.lock().unwrap(), vec![(1, 2), (2, 1)]);
}

/// Given a wave wider than the parallelism limit
/// When executed
/// Then its wave events still bracket every chunk
#[tokio::test]
async fn test_wave_events_span_chunks() {
    let executor = MockExecutor::new().shared();
    let config = OrchestratorConfig::default().with_max_parallel_agents(2);
    let orch = orchestrator(config, executor.clone());
    let events = record_events(&orch);
    orch.add_tasks([task("a", &[]), task("b", &[]), task("c", &[])]);

    orch.execute().await.unwrap();

    let events = events.lock().unwrap();
    let wave_events: Vec<_> = events
        .iter()
        .filter(|e| matches!(e.kind(), EventKind::WaveStarted | EventKind::WaveCompleted))
        .collect();
    assert_eq!(wave_events.len(), 2);
    assert!(matches!(
        wave_events[1],
        OrchestratorEvent::WaveCompleted {
            wave: 1,
            succeeded: 3,
            failed: 0
        }
    ));
}
