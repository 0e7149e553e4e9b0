//! Message bus behavior and envelope delivery during a run.

use std::sync::{Arc, Mutex};

use serde_json::json;

use conductor::config::OrchestratorConfig;
use conductor::core::task::{Task, TaskId};
use conductor::orchestration::bus::{Message, MessageBus, MessageKind, Recipient};

use crate::fixtures::{orchestrator, MockExecutor};

fn envelope_output(to: &str, kind: &str, content: serde_json::Value) -> String {
    format!(
        "Design complete.\n@@agent-message {}\nDone.",
        json!({ "to": to, "type": kind, "content": content })
    )
}

#[test]
fn test_bus_keeps_most_recent_hundred() {
    let bus = MessageBus::new();
    for i in 0..101 {
        bus.send(Message::new(
            "sender",
            Recipient::Agent("receiver".to_string()),
            MessageKind::Data,
            json!(i),
        ));
    }

    let history = bus.history(None);
    assert_eq!(history.len(), 100);
    assert_eq!(history.first().unwrap().content, json!(1));
    assert_eq!(history.last().unwrap().content, json!(100));
}

/// Given an architect whose output carries an envelope for the writer
/// When executed with communication enabled
/// Then the writer's subscriber receives the message
#[tokio::test]
async fn test_envelope_delivered_to_subscriber() {
    let executor = MockExecutor::new()
        .with_output(
            "design",
            envelope_output("writer", "data", json!({"endpoints": 4})),
        )
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    orch.message_bus()
        .subscribe("writer", move |message| sink.lock().unwrap().push(message.clone()));

    orch.add_tasks([
        Task::new("design", "architect", "Design the API", "design"),
        Task::new("docs", "writer", "Document the API", "docs").depends_on(["design"]),
    ]);
    let results = orch.execute().await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from, "architect");
    assert_eq!(received[0].to, Recipient::Agent("writer".to_string()));
    assert_eq!(received[0].kind, MessageKind::Data);
    assert_eq!(received[0].content, json!({"endpoints": 4}));

    let metadata = results[&TaskId::from("design")].metadata.clone().unwrap();
    assert_eq!(metadata.messages_sent, 1);
    assert_eq!(metadata.messages_quarantined, 0);
    assert_eq!(orch.get_status().messages, 1);
}

/// Given a broadcast envelope
/// When executed
/// Then wildcard subscribers receive it
#[tokio::test]
async fn test_broadcast_reaches_wildcard_subscribers() {
    let executor = MockExecutor::new()
        .with_output("announce", envelope_output("*", "broadcast", json!("schema frozen")))
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());

    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    orch.message_bus().subscribe("*", move |_| *sink.lock().unwrap() += 1);

    orch.add_task(Task::new("announce", "worker", "Announce", "announce"));
    orch.execute().await.unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(orch.message_bus().history(None)[0].to, Recipient::All);
}

/// Given an agent subscribed under its own name
/// When another agent emits a broadcast envelope
/// Then the agent's handler receives it once
#[tokio::test]
async fn test_broadcast_reaches_agent_named_subscribers() {
    let executor = MockExecutor::new()
        .with_output("announce", envelope_output("*", "broadcast", json!("api frozen")))
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    orch.message_bus()
        .subscribe("writer", move |message| sink.lock().unwrap().push(message.clone()));

    orch.add_task(Task::new("announce", "architect", "Announce", "announce"));
    orch.execute().await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from, "architect");
    assert_eq!(received[0].kind, MessageKind::Broadcast);
    assert_eq!(received[0].content, json!("api frozen"));
}

/// Given a malformed envelope line
/// When executed
/// Then nothing is sent and the task still succeeds
#[tokio::test]
async fn test_malformed_envelope_is_quarantined() {
    let executor = MockExecutor::new()
        .with_output("noisy", "Result\n@@agent-message {\"to\": \"writer\", \"type\":")
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.add_task(Task::new("noisy", "worker", "Noisy", "noisy"));

    let results = orch.execute().await.unwrap();

    let result = &results[&TaskId::from("noisy")];
    assert!(result.success);
    let metadata = result.metadata.as_ref().unwrap();
    assert_eq!(metadata.messages_sent, 0);
    assert_eq!(metadata.messages_quarantined, 1);
    assert!(orch.message_bus().is_empty());
}

/// Given communication disabled
/// When an agent emits an envelope
/// Then it is left in the output and not sent
#[tokio::test]
async fn test_communication_disabled_sends_nothing() {
    let output = envelope_output("writer", "request", json!("need docs"));
    let executor = MockExecutor::new()
        .with_output("quiet", output.clone())
        .shared();
    let config = OrchestratorConfig::default().with_communication(false);
    let orch = orchestrator(config, executor.clone());
    orch.add_task(Task::new("quiet", "worker", "Quiet", "quiet"));

    let results = orch.execute().await.unwrap();

    assert!(orch.message_bus().is_empty());
    assert_eq!(results[&TaskId::from("quiet")].output, output);
    assert!(!executor
        .invocation("quiet")
        .system_prompt
        .contains("## Communication Protocol"));
}

/// Given a bus with history and subscribers
/// When the orchestrator is reset
/// Then both are cleared
#[tokio::test]
async fn test_reset_clears_bus() {
    let executor = MockExecutor::new()
        .with_output("talk", envelope_output("writer", "data", json!(1)))
        .shared();
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone());
    orch.message_bus().subscribe("writer", |_| {});
    orch.add_task(Task::new("talk", "worker", "Talk", "talk"));
    orch.execute().await.unwrap();
    assert_eq!(orch.message_bus().len(), 1);

    orch.reset();

    let bus = orch.message_bus();
    assert!(bus.is_empty());
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(orch.get_status().queued, 0);
    assert!(orch.get_results(None).is_empty());
}
