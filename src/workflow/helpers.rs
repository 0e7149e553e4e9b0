//! Glue between templates and the orchestrator.
//!
//! Parameter validation, pre-flight duration and cost estimates, report
//! formatting, and [`execute_workflow`], which wires a template to a fresh
//! [`Orchestrator`]. The estimators are advisory only; scheduling never
//! reads them.

use crate::agent::{AgentRegistry, ModelTier};
use crate::config::{ContextStrategy, OrchestratorConfig};
use crate::core::task::{Task, TaskId, TaskResult};
use crate::error::{Error, Result};
use crate::executor::AgentExecutor;
use crate::orchestration::context::TokenEstimator;
use crate::orchestration::events::{EventKind, OrchestratorEvent};
use crate::orchestration::Orchestrator;
use crate::workflow::templates::{WorkflowParams, WorkflowTemplate};
use crate::clog;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Allowed shape of a `project_name` parameter.
pub const PROJECT_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9 _.-]*$";

static PROJECT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PROJECT_NAME_PATTERN).expect("project name pattern compiles"));

/// Concurrency discount applied to the summed per-task durations.
pub const PARALLELIZATION_FACTOR: f64 = 0.4;

/// Context tokens assumed on top of each prompt when estimating cost.
pub const CONTEXT_OVERHEAD_TOKENS: u64 = 2000;

/// Token count that corresponds to one tier base duration.
const DURATION_TOKEN_UNIT: f64 = 4000.0;

/// Outcome of [`validate_workflow_parameters`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check required parameters and template-specific constraints.
pub fn validate_workflow_parameters(
    template: &WorkflowTemplate,
    params: &WorkflowParams,
) -> ValidationReport {
    let mut errors: Vec<String> = template
        .required_params
        .iter()
        .filter(|name| params.get(**name).map_or(true, |v| v.trim().is_empty()))
        .map(|name| format!("{} is required", name))
        .collect();

    if let Some(name) = params.get("project_name").map(|n| n.trim()) {
        if !name.is_empty() && !is_valid_project_name(name) {
            errors.push(format!(
                "project_name '{}' must start with a letter or digit and contain only letters, digits, spaces, '_', '.' or '-'",
                name
            ));
        }
    }

    errors.extend(template.extra_validation(params));

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn is_valid_project_name(name: &str) -> bool {
    PROJECT_NAME_RE.is_match(name)
}

fn task_tier(task: &Task, registry: &dyn AgentRegistry) -> ModelTier {
    task.model
        .or_else(|| {
            registry
                .get_agent(&task.agent_name)
                .and_then(|a| a.model_tier)
        })
        .unwrap_or_default()
}

/// Rough wall-clock estimate for running `template`.
///
/// Each task contributes its tier's base time scaled by `max_tokens / 4000`;
/// the sum is multiplied by [`PARALLELIZATION_FACTOR`].
pub fn estimate_workflow_duration(
    template: &WorkflowTemplate,
    params: &WorkflowParams,
    registry: &dyn AgentRegistry,
) -> Duration {
    let sequential: f64 = template
        .build_tasks(params)
        .iter()
        .map(|task| {
            task_tier(task, registry).base_duration_secs()
                * (f64::from(task.max_tokens) / DURATION_TOKEN_UNIT)
        })
        .sum();
    Duration::from_secs_f64(sequential * PARALLELIZATION_FACTOR)
}

/// Token and dollar estimate for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub usd: f64,
}

/// Upper-bound cost estimate for running `template`.
///
/// Input tokens are the estimated prompt size plus a fixed context
/// overhead; output tokens assume every task uses its full `max_tokens`.
pub fn estimate_workflow_cost(
    template: &WorkflowTemplate,
    params: &WorkflowParams,
    registry: &dyn AgentRegistry,
    estimator: &dyn TokenEstimator,
) -> CostEstimate {
    template
        .build_tasks(params)
        .iter()
        .fold(CostEstimate::default(), |mut total, task| {
            let input = estimator.estimate(&task.prompt) as u64 + CONTEXT_OVERHEAD_TOKENS;
            let output = u64::from(task.max_tokens);
            let (input_price, output_price) = task_tier(task, registry).pricing_per_million();

            total.input_tokens += input;
            total.output_tokens += output;
            total.usd += (input as f64 * input_price + output as f64 * output_price) / 1_000_000.0;
            total
        })
}

/// Render results as a markdown report.
///
/// Tasks are listed by wave, then id. Failed tasks show their error.
pub fn format_workflow_report(
    template: &WorkflowTemplate,
    results: &HashMap<TaskId, TaskResult>,
) -> String {
    let mut ordered: Vec<&TaskResult> = results.values().collect();
    ordered.sort_by(|a, b| {
        let wave = |r: &TaskResult| r.metadata.as_ref().map_or(0, |m| m.wave);
        wave(a).cmp(&wave(b)).then_with(|| a.task_id.cmp(&b.task_id))
    });

    let succeeded = ordered.iter().filter(|r| r.success).count();
    let failed = ordered.len() - succeeded;
    let tokens: u64 = ordered.iter().map(|r| r.tokens_used).sum();
    let agent_time: Duration = ordered.iter().map(|r| r.duration).sum();

    let mut report = format!("# {} Report\n\n", template.name);
    report.push_str(&format!("- **Workflow:** `{}`\n", template.id));
    report.push_str(&format!(
        "- **Tasks:** {} total, {} succeeded, {} failed\n",
        ordered.len(),
        succeeded,
        failed
    ));
    report.push_str(&format!("- **Tokens used:** {}\n", tokens));
    report.push_str(&format!(
        "- **Agent time:** {:.1}s\n",
        agent_time.as_secs_f64()
    ));

    if ordered.is_empty() {
        report.push_str("\nNo tasks were executed.\n");
        return report;
    }

    report.push_str("\n## Results\n");
    for result in ordered {
        let status = if result.success { "Succeeded" } else { "Failed" };
        report.push_str(&format!(
            "\n### {} ({})\n\n- Status: {}\n- Duration: {:.1}s\n- Tokens: {}\n",
            result.task_id,
            result.agent_name,
            status,
            result.duration.as_secs_f64(),
            result.tokens_used
        ));
        if let Some(metadata) = &result.metadata {
            if !metadata.failed_dependencies.is_empty() {
                let deps: Vec<&str> = metadata
                    .failed_dependencies
                    .iter()
                    .map(TaskId::as_str)
                    .collect();
                report.push_str(&format!("- Degraded inputs: {}\n", deps.join(", ")));
            }
        }
        match &result.error {
            Some(error) => report.push_str(&format!("\n> Error: {}\n", error)),
            None => report.push_str(&format!("\n{}\n", result.output.trim())),
        }
    }

    report
}

/// Progress notification passed to [`WorkflowConfig::on_progress`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowProgress {
    pub kind: EventKind,
    pub task_id: Option<TaskId>,
    /// Tasks settled so far.
    pub settled: usize,
    pub total: usize,
    pub message: String,
}

pub type ProgressCallback = Arc<dyn Fn(&WorkflowProgress) + Send + Sync>;

/// Options for [`execute_workflow`].
#[derive(Clone, Default)]
pub struct WorkflowConfig {
    pub api_key: Option<String>,
    /// Overrides `orchestrator.max_parallel_agents` when set.
    pub max_parallel_agents: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
    /// Base configuration. Strategy and communication are forced to
    /// shared and enabled.
    pub orchestrator: OrchestratorConfig,
}

impl std::fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_parallel_agents", &self.max_parallel_agents)
            .field("on_progress", &self.on_progress.is_some())
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

/// Validate, build and run `template`.
///
/// `connect` receives the API key and returns the executor to run with.
///
/// # Errors
///
/// [`Error::MissingApiKey`] if no non-blank key is configured,
/// [`Error::InvalidParameters`] if validation fails, or any structural
/// error from [`Orchestrator::execute`]. Task failures are returned as
/// results, not errors.
pub async fn execute_workflow<C>(
    template: &WorkflowTemplate,
    params: &WorkflowParams,
    config: WorkflowConfig,
    registry: Arc<dyn AgentRegistry>,
    connect: C,
) -> Result<HashMap<TaskId, TaskResult>>
where
    C: FnOnce(&str) -> Result<Arc<dyn AgentExecutor>>,
{
    let api_key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(Error::MissingApiKey)?;

    let validation = validate_workflow_parameters(template, params);
    if !validation.valid {
        return Err(Error::InvalidParameters(validation.errors));
    }

    let executor = connect(api_key)?;
    let mut orchestrator_config = config
        .orchestrator
        .with_context_strategy(ContextStrategy::Shared)
        .with_communication(true);
    if let Some(max) = config.max_parallel_agents {
        orchestrator_config = orchestrator_config.with_max_parallel_agents(max);
    }

    let tasks = template.build_tasks(params);
    let total = tasks.len();
    clog!(
        "[workflow] running template {} with {} task(s), max_parallel={}",
        template.id,
        total,
        orchestrator_config.effective_parallelism()
    );

    let orchestrator = Orchestrator::new(orchestrator_config, registry, executor);
    if let Some(callback) = config.on_progress {
        let settled = AtomicUsize::new(0);
        orchestrator.on_any(move |event| {
            if matches!(event, OrchestratorEvent::TaskAdded { .. }) {
                return;
            }
            if matches!(
                event,
                OrchestratorEvent::TaskCompleted { .. } | OrchestratorEvent::TaskFailed { .. }
            ) {
                settled.fetch_add(1, Ordering::SeqCst);
            }
            callback(&WorkflowProgress {
                kind: event.kind(),
                task_id: event.task_id().cloned(),
                settled: settled.load(Ordering::SeqCst),
                total,
                message: describe(event),
            });
        });
    }

    orchestrator.add_tasks(tasks);
    orchestrator.execute().await
}

fn describe(event: &OrchestratorEvent) -> String {
    match event {
        OrchestratorEvent::TaskAdded { task_id, agent_name } => {
            format!("Queued {} for {}", task_id, agent_name)
        }
        OrchestratorEvent::ExecutionStarted { total_tasks } => {
            format!("Starting {} task(s)", total_tasks)
        }
        OrchestratorEvent::WaveStarted { wave, task_ids } => {
            format!("Wave {}: {} task(s)", wave, task_ids.len())
        }
        OrchestratorEvent::TaskStarted { task_id, agent_name } => {
            format!("{} started ({})", task_id, agent_name)
        }
        OrchestratorEvent::AgentInvoked { task_id, model, .. } => {
            format!("{} invoking {}", task_id, model)
        }
        OrchestratorEvent::TaskCompleted { result } => format!(
            "{} completed in {:.1}s",
            result.task_id,
            result.duration.as_secs_f64()
        ),
        OrchestratorEvent::TaskFailed { task_id, error } => {
            format!("{} failed: {}", task_id, error)
        }
        OrchestratorEvent::WaveCompleted {
            wave,
            succeeded,
            failed,
        } => format!("Wave {} done: {} ok, {} failed", wave, succeeded, failed),
        OrchestratorEvent::ExecutionCompleted {
            succeeded,
            failed,
            duration,
            ..
        } => format!(
            "Finished in {:.1}s: {} ok, {} failed",
            duration.as_secs_f64(),
            succeeded,
            failed
        ),
        OrchestratorEvent::ExecutionFailed { error } => format!("Execution failed: {}", error),
    }
}
