//! Progress events emitted by the orchestrator.
//!
//! Listeners register for one [`EventKind`] or for every event. Events
//! are delivered synchronously, in registration order, from the task that
//! produced them.

use crate::core::task::{TaskId, TaskResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Lifecycle events for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A task was queued.
    TaskAdded { task_id: TaskId, agent_name: String },
    /// The graph validated and execution is beginning.
    ExecutionStarted { total_tasks: usize },
    /// A wave of ready tasks is about to run.
    WaveStarted { wave: usize, task_ids: Vec<TaskId> },
    TaskStarted { task_id: TaskId, agent_name: String },
    /// The agent is being invoked with the resolved model.
    AgentInvoked {
        task_id: TaskId,
        agent_name: String,
        model: String,
    },
    TaskCompleted { result: TaskResult },
    TaskFailed { task_id: TaskId, error: String },
    WaveCompleted {
        wave: usize,
        succeeded: usize,
        failed: usize,
    },
    ExecutionCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        duration: Duration,
    },
    /// A structural error aborted the run.
    ExecutionFailed { error: String },
}

/// Fieldless discriminant of [`OrchestratorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskAdded,
    ExecutionStarted,
    WaveStarted,
    TaskStarted,
    AgentInvoked,
    TaskCompleted,
    TaskFailed,
    WaveCompleted,
    ExecutionCompleted,
    ExecutionFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::TaskAdded,
        EventKind::ExecutionStarted,
        EventKind::WaveStarted,
        EventKind::TaskStarted,
        EventKind::AgentInvoked,
        EventKind::TaskCompleted,
        EventKind::TaskFailed,
        EventKind::WaveCompleted,
        EventKind::ExecutionCompleted,
        EventKind::ExecutionFailed,
    ];

    /// Colon-separated event name (`task:added`, `wave:start`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskAdded => "task:added",
            EventKind::ExecutionStarted => "execution:start",
            EventKind::WaveStarted => "wave:start",
            EventKind::TaskStarted => "task:start",
            EventKind::AgentInvoked => "agent:invoke",
            EventKind::TaskCompleted => "task:complete",
            EventKind::TaskFailed => "task:error",
            EventKind::WaveCompleted => "wave:complete",
            EventKind::ExecutionCompleted => "execution:complete",
            EventKind::ExecutionFailed => "execution:error",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OrchestratorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OrchestratorEvent::TaskAdded { .. } => EventKind::TaskAdded,
            OrchestratorEvent::ExecutionStarted { .. } => EventKind::ExecutionStarted,
            OrchestratorEvent::WaveStarted { .. } => EventKind::WaveStarted,
            OrchestratorEvent::TaskStarted { .. } => EventKind::TaskStarted,
            OrchestratorEvent::AgentInvoked { .. } => EventKind::AgentInvoked,
            OrchestratorEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            OrchestratorEvent::TaskFailed { .. } => EventKind::TaskFailed,
            OrchestratorEvent::WaveCompleted { .. } => EventKind::WaveCompleted,
            OrchestratorEvent::ExecutionCompleted { .. } => EventKind::ExecutionCompleted,
            OrchestratorEvent::ExecutionFailed { .. } => EventKind::ExecutionFailed,
        }
    }

    /// Task the event refers to, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            OrchestratorEvent::TaskAdded { task_id, .. }
            | OrchestratorEvent::TaskStarted { task_id, .. }
            | OrchestratorEvent::AgentInvoked { task_id, .. }
            | OrchestratorEvent::TaskFailed { task_id, .. } => Some(task_id),
            OrchestratorEvent::TaskCompleted { result } => Some(&result.task_id),
            _ => None,
        }
    }
}

/// Callback invoked for each matching event.
pub type EventHandler = Arc<dyn Fn(&OrchestratorEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    by_kind: HashMap<EventKind, Vec<EventHandler>>,
    any: Vec<EventHandler>,
}

/// Listener registry shared between the orchestrator and its engine.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<Listeners>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.lock()
            .by_kind
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.lock().any.push(Arc::new(handler));
    }

    /// Deliver `event` to kind-specific listeners, then catch-all listeners.
    pub fn emit(&self, event: OrchestratorEvent) {
        let handlers: Vec<EventHandler> = {
            let listeners = self.lock();
            listeners
                .by_kind
                .get(&event.kind())
                .into_iter()
                .flatten()
                .chain(listeners.any.iter())
                .cloned()
                .collect()
        };
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        let listeners = self.lock();
        listeners.by_kind.values().map(Vec::len).sum::<usize>() + listeners.any.len()
    }

    pub fn clear(&self) {
        let mut listeners = self.lock();
        listeners.by_kind.clear();
        listeners.any.clear();
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
