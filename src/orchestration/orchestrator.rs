//! The orchestrator: owns run state and drives waves through the engine.
//!
//! Tasks are queued with [`Orchestrator::add_task`] and run by
//! [`Orchestrator::execute`], which builds and validates the graph, then
//! executes wave by wave in chunks of at most `max_parallel_agents`. Only
//! structural errors abort a run; task failures are recorded as results.
//!
//! All methods take `&self`, so an `Arc<Orchestrator>` can be queried with
//! [`Orchestrator::get_status`] while a run is in progress.

use crate::agent::AgentRegistry;
use crate::config::{ContextStrategy, OrchestratorConfig};
use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId, TaskResult};
use crate::error::{Error, Result};
use crate::executor::AgentExecutor;
use crate::orchestration::bus::MessageBus;
use crate::orchestration::context::{SharedContextEntry, TokenEstimator};
use crate::orchestration::engine::{ExecutionEngine, RunLimits};
use crate::orchestration::events::{EventEmitter, EventKind, OrchestratorEvent};
use crate::orchestration::scheduler::{chunks, WaveScheduler};
use crate::{clog, clog_debug, clog_error};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Mutable state of the current or most recent run.
#[derive(Default)]
struct RunState {
    queue: Vec<Task>,
    running: HashMap<TaskId, DateTime<Utc>>,
    completed: HashMap<TaskId, TaskResult>,
    shared: Vec<SharedContextEntry>,
    executing: bool,
    /// Bumped by `reset`; a run whose generation is stale records nothing.
    generation: u64,
}

/// Snapshot returned by [`Orchestrator::get_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorStatus {
    pub queued: usize,
    pub running: Vec<TaskId>,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub is_executing: bool,
    pub messages: usize,
}

/// Coordinates a set of tasks across agents.
///
/// # Example
///
/// ```ignore
/// let orchestrator = Orchestrator::new(config, registry, executor);
/// orchestrator.add_tasks(template.build_tasks(&params));
/// orchestrator.on(EventKind::TaskCompleted, |e| println!("{:?}", e));
/// let results = orchestrator.execute().await?;
/// ```
pub struct Orchestrator {
    config: OrchestratorConfig,
    engine: ExecutionEngine,
    bus: Arc<MessageBus>,
    events: Arc<EventEmitter>,
    state: RwLock<RunState>,
    cancel: Mutex<CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<dyn AgentRegistry>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Self {
        let bus = Arc::new(MessageBus::with_capacity(config.message_capacity));
        let events = Arc::new(EventEmitter::new());
        let engine = ExecutionEngine::new(
            config.clone(),
            registry,
            executor,
            bus.clone(),
            events.clone(),
        );
        Self {
            config,
            engine,
            bus,
            events,
            state: RwLock::new(RunState::default()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Replace the token estimator used for context budgeting.
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.engine = self.engine.with_estimator(estimator);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a task for the next run.
    pub fn add_task(&self, task: Task) {
        clog_debug!(
            "[orchestrator] queued task {} for agent {}",
            task.id,
            task.agent_name
        );
        let event = OrchestratorEvent::TaskAdded {
            task_id: task.id.clone(),
            agent_name: task.agent_name.clone(),
        };
        self.write().queue.push(task);
        self.events.emit(event);
    }

    pub fn add_tasks(&self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            self.add_task(task);
        }
    }

    /// Run every queued task and return one result per task.
    ///
    /// Results from a previous run are discarded first. The queue is kept,
    /// so calling `execute` again reruns the same tasks.
    ///
    /// # Errors
    ///
    /// Returns structural errors (duplicate ids, unknown dependencies,
    /// cycles, deadlock) before or instead of producing results; in that
    /// case no results are retained. Returns [`Error::Validation`] if a run
    /// is already in progress, and [`Error::Cancelled`] if [`reset`] was
    /// called while this run was in flight.
    ///
    /// [`reset`]: Orchestrator::reset
    pub async fn execute(&self) -> Result<HashMap<TaskId, TaskResult>> {
        let (tasks, generation) = {
            let mut state = self.write();
            if state.executing {
                return Err(Error::Validation(
                    "execution already in progress".to_string(),
                ));
            }
            state.executing = true;
            state.running.clear();
            state.completed.clear();
            state.shared.clear();
            (state.queue.clone(), state.generation)
        };
        let _guard = ExecutionGuard(self);

        let started = Instant::now();
        match self.run(&tasks, started, generation).await {
            Ok(results) => {
                let succeeded = results.values().filter(|r| r.success).count();
                let failed = results.len() - succeeded;
                clog!(
                    "[orchestrator] execution complete: {} succeeded, {} failed in {:?}",
                    succeeded,
                    failed,
                    started.elapsed()
                );
                self.events.emit(OrchestratorEvent::ExecutionCompleted {
                    total: results.len(),
                    succeeded,
                    failed,
                    duration: started.elapsed(),
                });
                Ok(results)
            }
            Err(error) => {
                clog_error!("[orchestrator] execution failed: {}", error);
                {
                    let mut state = self.write();
                    if state.generation == generation {
                        state.completed.clear();
                        state.shared.clear();
                    }
                }
                self.events.emit(OrchestratorEvent::ExecutionFailed {
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        tasks: &[Task],
        started: Instant,
        generation: u64,
    ) -> Result<HashMap<TaskId, TaskResult>> {
        let graph = TaskGraph::build(tasks)?;
        graph.validate_acyclic()?;

        clog!(
            "[orchestrator] starting execution: {} task(s), {} dependency edge(s), max_parallel={}, strategy={}",
            graph.len(),
            graph.dependency_count(),
            self.config.effective_parallelism(),
            self.config.context_strategy
        );
        self.events.emit(OrchestratorEvent::ExecutionStarted {
            total_tasks: graph.len(),
        });

        let global_deadline = self.config.global_timeout().map(|timeout| started + timeout);
        let cancel = self.cancellation_token();
        let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();

        let mut scheduler = WaveScheduler::new(&graph, tasks);
        while let Some(wave) = scheduler.next_wave()? {
            let wave_number = scheduler.current_wave();
            self.events.emit(OrchestratorEvent::WaveStarted {
                wave: wave_number,
                task_ids: wave.clone(),
            });

            let (mut succeeded, mut failed) = (0, 0);
            for chunk in chunks(&wave, self.config.effective_parallelism()) {
                let chunk_tasks: Vec<&Task> =
                    chunk.iter().filter_map(|id| by_id.get(id).copied()).collect();
                let results = self
                    .run_chunk(&chunk_tasks, &graph, wave_number, global_deadline, &cancel)
                    .await;

                let mut state = self.write();
                if state.generation != generation {
                    clog_debug!(
                        "[orchestrator] run superseded by reset; dropping {} result(s) from wave {}",
                        results.len(),
                        wave_number
                    );
                    return Err(Error::Cancelled);
                }
                for result in results {
                    if result.success {
                        succeeded += 1;
                    } else {
                        failed += 1;
                    }
                    Self::record(&self.config, &mut state, result);
                }
            }

            scheduler.settle(&wave);
            clog_debug!(
                "[orchestrator] wave {} settled: {} succeeded, {} failed",
                wave_number,
                succeeded,
                failed
            );
            self.events.emit(OrchestratorEvent::WaveCompleted {
                wave: wave_number,
                succeeded,
                failed,
            });
        }

        Ok(self.read().completed.clone())
    }

    /// Run one chunk concurrently and wait for all of it.
    async fn run_chunk(
        &self,
        tasks: &[&Task],
        graph: &TaskGraph,
        wave: usize,
        global_deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Vec<TaskResult> {
        let cancelled = cancel.is_cancelled();
        if cancelled || global_deadline.is_some_and(|d| Instant::now() >= d) {
            return tasks
                .iter()
                .map(|task| {
                    let error = if cancelled {
                        Error::Cancelled
                    } else {
                        Error::GlobalTimeout
                    };
                    self.engine.skip(task, error, wave)
                })
                .collect();
        }

        let prepared: Vec<_> = {
            let state = self.read();
            tasks
                .iter()
                .map(|task| {
                    self.engine
                        .prepare(task, graph, &state.completed, &state.shared, wave)
                })
                .collect()
        };

        let runs = prepared.into_iter().map(|prepared| async move {
            let id = prepared.task_id().clone();
            let limits = RunLimits {
                deadline: self.task_deadline(global_deadline),
                cancel: cancel.clone(),
            };
            self.write().running.insert(id.clone(), Utc::now());
            let result = self.engine.run(prepared, &limits).await;
            self.write().running.remove(&id);
            result
        });
        join_all(runs).await
    }

    /// Earlier of the per-task timeout (from now) and the global deadline.
    fn task_deadline(&self, global_deadline: Option<Instant>) -> Option<Instant> {
        let task_deadline = self.config.task_timeout().map(|t| Instant::now() + t);
        match (task_deadline, global_deadline) {
            (Some(task), Some(global)) => Some(task.min(global)),
            (task, global) => task.or(global),
        }
    }

    fn record(config: &OrchestratorConfig, state: &mut RunState, result: TaskResult) {
        if result.success && config.context_strategy == ContextStrategy::Shared {
            state.shared.push(SharedContextEntry::from_result(&result));
        }
        state.completed.insert(result.task_id.clone(), result);
    }

    /// Counts and in-flight tasks for the current or last run.
    pub fn get_status(&self) -> OrchestratorStatus {
        let state = self.read();
        let succeeded = state.completed.values().filter(|r| r.success).count();
        let mut running: Vec<TaskId> = state.running.keys().cloned().collect();
        running.sort();
        OrchestratorStatus {
            queued: state.queue.len(),
            running,
            completed: state.completed.len(),
            succeeded,
            failed: state.completed.len() - succeeded,
            is_executing: state.executing,
            messages: self.bus.len(),
        }
    }

    /// Settled results, optionally restricted to `ids`. Unknown ids are
    /// skipped.
    pub fn get_results(&self, ids: Option<&[TaskId]>) -> HashMap<TaskId, TaskResult> {
        let state = self.read();
        match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| state.completed.get(id).map(|r| (id.clone(), r.clone())))
                .collect(),
            None => state.completed.clone(),
        }
    }

    /// Clear queue, results, shared context, messages and listeners.
    ///
    /// A run in progress is cancelled and its remaining results are
    /// discarded rather than recorded. A fresh cancellation token is
    /// installed for the next run.
    pub fn reset(&self) {
        {
            let mut token = self.token();
            token.cancel();
            *token = CancellationToken::new();
        }
        {
            let mut state = self.write();
            state.queue.clear();
            state.running.clear();
            state.completed.clear();
            state.shared.clear();
            state.generation += 1;
        }
        self.bus.clear();
        self.events.clear();
        clog_debug!("[orchestrator] reset");
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler);
    }

    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.events.on_any(handler);
    }

    pub fn message_bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    /// Token observed by the current run. Cancelling it settles in-flight
    /// and unstarted tasks as failed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token().clone()
    }

    pub fn cancel(&self) {
        self.token().cancel();
    }

    /// Shared-context entries from the last run, oldest first.
    pub fn shared_context(&self) -> Vec<SharedContextEntry> {
        self.read().shared.clone()
    }
}

/// Clears the executing flag even if the run future is dropped.
struct ExecutionGuard<'a>(&'a Orchestrator);

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.write();
        state.executing = false;
        state.running.clear();
    }
}
