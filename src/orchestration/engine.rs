//! Execution engine: runs one task against one agent.
//!
//! Execution is split in two steps. [`ExecutionEngine::prepare`] resolves
//! the agent, picks the model and assembles the prompts from the results
//! settled so far. [`ExecutionEngine::run`] invokes the executor under the
//! run's deadline and cancellation token and turns the outcome into a
//! [`TaskResult`]. Invocation errors never escape; they become failed
//! results.

use crate::agent::{AgentDefinition, AgentRegistry, ModelTier};
use crate::config::OrchestratorConfig;
use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId, TaskMetadata, TaskResult};
use crate::error::Error;
use crate::executor::{AgentExecutor, AgentRequest};
use crate::orchestration::bus::MessageBus;
use crate::orchestration::context::{
    BuiltContext, CharRatioEstimator, ContextBuilder, SharedContextEntry, TokenEstimator,
};
use crate::orchestration::envelope::{extract_envelopes, protocol_instructions};
use crate::orchestration::events::{EventEmitter, OrchestratorEvent};
use crate::{clog_debug, clog_warn};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A task ready to be invoked, with everything resolved up front.
#[derive(Debug, Clone)]
pub struct PreparedTask {
    pub task: Task,
    /// `None` when the registry has no agent by that name.
    pub agent: Option<AgentDefinition>,
    pub model: ModelTier,
    pub system_prompt: String,
    pub context: BuiltContext,
    pub wave: usize,
}

impl PreparedTask {
    pub fn task_id(&self) -> &TaskId {
        &self.task.id
    }

    fn metadata(&self) -> TaskMetadata {
        TaskMetadata {
            model: Some(self.model.model_id().to_string()),
            wave: self.wave,
            failed_dependencies: self.context.failed_dependencies.clone(),
            context_chars: self.context.text.chars().count(),
            ..Default::default()
        }
    }
}

/// Deadline and cancellation applied to a single invocation.
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

/// Runs tasks against the registry and executor it was built with.
pub struct ExecutionEngine {
    registry: Arc<dyn AgentRegistry>,
    executor: Arc<dyn AgentExecutor>,
    estimator: Arc<dyn TokenEstimator>,
    config: OrchestratorConfig,
    bus: Arc<MessageBus>,
    events: Arc<EventEmitter>,
}

impl ExecutionEngine {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<dyn AgentRegistry>,
        executor: Arc<dyn AgentExecutor>,
        bus: Arc<MessageBus>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            registry,
            executor,
            estimator: Arc::new(CharRatioEstimator::default()),
            config,
            bus,
            events,
        }
    }

    /// Replace the token estimator used for context budgeting.
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Explicit task override, else the agent's tier, else sonnet.
    pub fn select_model(task: &Task, agent: &AgentDefinition) -> ModelTier {
        task.model.or(agent.model_tier).unwrap_or_default()
    }

    /// Agent prompt followed by orchestration metadata, the communication
    /// protocol (when enabled) and the assembled context.
    pub fn system_prompt(&self, task: &Task, agent: &AgentDefinition, context: &str) -> String {
        let mut sections = vec![
            agent.system_prompt.clone(),
            format!(
                "## Orchestration\nTask ID: {}\nTask: {}",
                task.id, task.description
            ),
        ];
        if self.config.enable_communication {
            sections.push(format!(
                "## Communication Protocol\n{}",
                protocol_instructions()
            ));
        }
        if !context.is_empty() {
            sections.push(format!("## Context\n{}", context));
        }
        sections.join("\n\n")
    }

    /// Resolve the agent and assemble prompts from the results so far.
    pub fn prepare(
        &self,
        task: &Task,
        graph: &TaskGraph,
        completed: &HashMap<TaskId, TaskResult>,
        shared: &[SharedContextEntry],
        wave: usize,
    ) -> PreparedTask {
        let context = ContextBuilder::new(&self.config, self.estimator.as_ref())
            .build(task, graph, completed, shared);
        let agent = self.registry.get_agent(&task.agent_name);

        let (model, system_prompt) = match &agent {
            Some(agent) => (
                Self::select_model(task, agent),
                self.system_prompt(task, agent, &context.text),
            ),
            None => (task.model.unwrap_or_default(), String::new()),
        };

        PreparedTask {
            task: task.clone(),
            agent,
            model,
            system_prompt,
            context,
            wave,
        }
    }

    /// Invoke a prepared task and settle it.
    pub async fn run(&self, prepared: PreparedTask, limits: &RunLimits) -> TaskResult {
        let task = &prepared.task;
        let started_at = Utc::now();
        let start = Instant::now();

        self.events.emit(OrchestratorEvent::TaskStarted {
            task_id: task.id.clone(),
            agent_name: task.agent_name.clone(),
        });

        let Some(agent) = &prepared.agent else {
            let error = Error::AgentNotFound(task.agent_name.clone());
            clog_warn!("[engine] task {}: {}", task.id, error);
            return self.settle_failure(task, error, started_at, start, None);
        };

        let model_id = prepared.model.model_id();
        clog_debug!(
            "[engine] task {} wave {} -> agent {} model {} context_chars={}",
            task.id,
            prepared.wave,
            agent.name,
            model_id,
            prepared.context.text.len()
        );
        self.events.emit(OrchestratorEvent::AgentInvoked {
            task_id: task.id.clone(),
            agent_name: agent.name.clone(),
            model: model_id.to_string(),
        });

        let request = AgentRequest {
            system_prompt: prepared.system_prompt.clone(),
            user_prompt: task.prompt.clone(),
            model: model_id.to_string(),
            max_tokens: task.max_tokens,
        };

        let invocation = async {
            match limits.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.executor.invoke(request))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Timeout(deadline.saturating_duration_since(start)))
                    }),
                None => self.executor.invoke(request).await,
            }
        };
        let outcome = tokio::select! {
            biased;
            _ = limits.cancel.cancelled() => Err(Error::Cancelled),
            result = invocation => result,
        };

        let mut metadata = prepared.metadata();
        match outcome {
            Ok(response) => {
                metadata.input_tokens = response.input_tokens;
                metadata.output_tokens = response.output_tokens;
                metadata.stop_reason = response.stop_reason.clone();
                if self.config.enable_communication {
                    self.publish_messages(task, &response.output, &mut metadata);
                }

                let result = TaskResult::success(
                    task,
                    response.output,
                    started_at,
                    start.elapsed(),
                    metadata,
                );
                clog_debug!(
                    "[engine] task {} completed in {:?} ({} tokens)",
                    task.id,
                    result.duration,
                    result.tokens_used
                );
                self.events.emit(OrchestratorEvent::TaskCompleted {
                    result: result.clone(),
                });
                result
            }
            Err(error) => {
                clog_warn!("[engine] task {} failed: {}", task.id, error);
                self.settle_failure(task, error, started_at, start, Some(metadata))
            }
        }
    }

    /// Prepare and run in one step.
    pub async fn execute_task(
        &self,
        task: &Task,
        graph: &TaskGraph,
        completed: &HashMap<TaskId, TaskResult>,
        shared: &[SharedContextEntry],
        limits: &RunLimits,
    ) -> TaskResult {
        let prepared = self.prepare(task, graph, completed, shared, 1);
        self.run(prepared, limits).await
    }

    /// Settle a task as failed without invoking anything.
    pub fn skip(&self, task: &Task, error: Error, wave: usize) -> TaskResult {
        clog_warn!("[engine] task {} not started: {}", task.id, error);
        let metadata = TaskMetadata {
            wave,
            ..Default::default()
        };
        self.settle_failure(task, error, Utc::now(), Instant::now(), Some(metadata))
    }

    fn settle_failure(
        &self,
        task: &Task,
        error: Error,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
        metadata: Option<TaskMetadata>,
    ) -> TaskResult {
        let message = error.to_string();
        self.events.emit(OrchestratorEvent::TaskFailed {
            task_id: task.id.clone(),
            error: message.clone(),
        });
        TaskResult::failure(task, message, started_at, start.elapsed(), metadata)
    }

    fn publish_messages(&self, task: &Task, output: &str, metadata: &mut TaskMetadata) {
        let extracted = extract_envelopes(output);
        for quarantined in &extracted.quarantined {
            clog_warn!(
                "[engine] task {}: quarantined message envelope at line {}: {}",
                task.id,
                quarantined.line,
                quarantined.reason
            );
        }
        metadata.messages_quarantined = extracted.quarantined.len();
        metadata.messages_sent = extracted.valid.len();

        for envelope in extracted.valid {
            self.bus.send(envelope.into_message(&task.agent_name));
        }
    }
}
