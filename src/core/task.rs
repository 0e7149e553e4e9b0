//! Task data model for the orchestration DAG.
//!
//! Tasks are the atomic units of work assigned to named agents. A task is
//! immutable once submitted to an orchestrator; its outcome is captured
//! exactly once in a [`TaskResult`] when it settles.

use crate::agent::ModelTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Identifier for a task, unique within a single run.
///
/// Ids are caller-chosen strings (e.g. `"database-schema"`) so that
/// templates can reference each other's tasks by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority within a wave.
///
/// Higher priority tasks are placed in earlier chunks when a wave is wider
/// than the concurrency limit. Priority never overrides dependencies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Default output token budget for a task.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A unit of work assigned to one named agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the run.
    pub id: TaskId,
    /// Name of the agent definition that performs this task.
    pub agent_name: String,
    /// Short human-readable description, surfaced to the agent.
    pub description: String,
    /// The user prompt sent to the agent.
    pub prompt: String,
    /// Ids of tasks that must settle before this one starts.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub priority: Priority,
    /// Output token budget for the agent invocation.
    pub max_tokens: u32,
    /// Explicit model tier, overriding the agent's declared tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelTier>,
    /// Opaque task-local context, rendered into the agent's context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, Value>>,
}

impl Task {
    /// Create a task with no dependencies and default budget.
    pub fn new(
        id: impl Into<TaskId>,
        agent_name: &str,
        description: &str,
        prompt: &str,
    ) -> Self {
        Self {
            id: id.into(),
            agent_name: agent_name.to_string(),
            description: description.to_string(),
            prompt: prompt.to_string(),
            dependencies: Vec::new(),
            priority: Priority::Normal,
            max_tokens: DEFAULT_MAX_TOKENS,
            model: None,
            context: None,
        }
    }

    pub fn depends_on<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: ModelTier) -> Self {
        self.model = Some(model);
        self
    }

    /// Attach a context entry. Repeated keys overwrite earlier values.
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// Execution details recorded alongside a task's outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Concrete model identifier that was invoked.
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub stop_reason: Option<String>,
    /// 1-based wave in which the task ran.
    pub wave: usize,
    /// Dependencies that settled as failures and contributed no context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_dependencies: Vec<TaskId>,
    /// Structured messages this task published on the bus.
    pub messages_sent: usize,
    /// Malformed message envelopes found in the output and dropped.
    pub messages_quarantined: usize,
    /// Size of the assembled context, in characters.
    pub context_chars: usize,
}

/// The settled outcome of one task.
///
/// Created exactly once, when the task settles, and never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub agent_name: String,
    pub success: bool,
    pub output: String,
    pub tokens_used: u64,
    pub duration: Duration,
    pub error: Option<String>,
    pub metadata: Option<TaskMetadata>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// Build a successful result.
    pub fn success(
        task: &Task,
        output: String,
        started_at: DateTime<Utc>,
        duration: Duration,
        metadata: TaskMetadata,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            agent_name: task.agent_name.clone(),
            success: true,
            output,
            tokens_used: metadata.input_tokens + metadata.output_tokens,
            duration,
            error: None,
            metadata: Some(metadata),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Build a failed result. Failed results carry no output.
    pub fn failure(
        task: &Task,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        metadata: Option<TaskMetadata>,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            agent_name: task.agent_name.clone(),
            success: false,
            output: String::new(),
            tokens_used: 0,
            duration,
            error: Some(error.into()),
            metadata,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}
