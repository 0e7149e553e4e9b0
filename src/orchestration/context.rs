//! Prompt-context assembly for tasks.
//!
//! A task's context is built from its own opaque context map, the outputs
//! of its successful direct dependencies, and, depending on the
//! [`ContextStrategy`], a bounded pool of other results. Long text is
//! pruned head-and-tail so both the opening and the conclusion survive.

use crate::config::{ContextStrategy, OrchestratorConfig};
use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId, TaskMetadata, TaskResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inserted between the kept head and tail of pruned text.
pub const PRUNE_MARKER: &str = "\n\n[... content pruned ...]\n\n";

/// Characters reserved around the marker when pruning.
const PRUNE_RESERVE: usize = 50;

/// Estimates how many model tokens a string will consume.
///
/// Budgeting code only talks to this trait so an exact tokenizer can
/// replace the heuristic without touching scheduling.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Character-count heuristic: one token per `chars_per_token` characters.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Truncate `text` to roughly `max_chars`, keeping its start and end.
///
/// Text of at most `max_chars` characters is returned unchanged. Longer
/// text keeps the first and last `max_chars / 2 - 50` characters joined by
/// [`PRUNE_MARKER`].
pub fn prune_context(text: &str, max_chars: usize) -> String {
    let len = text.chars().count();
    if len <= max_chars {
        return text.to_string();
    }

    let keep = (max_chars / 2).saturating_sub(PRUNE_RESERVE);
    let head: String = text.chars().take(keep).collect();
    let tail: String = text.chars().skip(len - keep).collect();
    format!("{}{}{}", head, PRUNE_MARKER, tail)
}

/// Output of a successful task made visible to later tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContextEntry {
    pub task_id: TaskId,
    pub agent_name: String,
    pub output: String,
    pub metadata: Option<TaskMetadata>,
}

impl SharedContextEntry {
    pub fn from_result(result: &TaskResult) -> Self {
        Self {
            task_id: result.task_id.clone(),
            agent_name: result.agent_name.clone(),
            output: result.output.clone(),
            metadata: result.metadata.clone(),
        }
    }
}

/// Assembled context for one task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltContext {
    pub text: String,
    /// Dependencies that settled as failures and were left out.
    pub failed_dependencies: Vec<TaskId>,
    /// Estimated tokens spent on shared or ancestor entries.
    pub pooled_tokens: usize,
}

/// Builds context strings according to an [`OrchestratorConfig`].
pub struct ContextBuilder<'a> {
    config: &'a OrchestratorConfig,
    estimator: &'a dyn TokenEstimator,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(config: &'a OrchestratorConfig, estimator: &'a dyn TokenEstimator) -> Self {
        Self { config, estimator }
    }

    /// Assemble the context for `task`.
    ///
    /// # Arguments
    ///
    /// * `graph` - The run's dependency graph (used for ancestor lookups)
    /// * `completed` - Results settled so far in this run
    /// * `shared` - Shared-context entries, oldest first
    pub fn build(
        &self,
        task: &Task,
        graph: &TaskGraph,
        completed: &HashMap<TaskId, TaskResult>,
        shared: &[SharedContextEntry],
    ) -> BuiltContext {
        let mut sections = Vec::new();
        let mut built = BuiltContext::default();

        if let Some(own) = &task.context {
            if !own.is_empty() {
                let rendered = serde_json::to_string_pretty(own).unwrap_or_default();
                sections.push(format!("## Task Context\n{}", rendered));
            }
        }

        let mut dependency_lines = Vec::new();
        for dep in &task.dependencies {
            match completed.get(dep) {
                Some(result) if result.success => {
                    dependency_lines.push(format!(
                        "{}: {}",
                        result.agent_name,
                        prune_context(&result.output, self.config.pruning_threshold)
                    ));
                }
                Some(_) => built.failed_dependencies.push(dep.clone()),
                None => {}
            }
        }
        if !dependency_lines.is_empty() {
            sections.push(format!(
                "## Dependency Outputs\n{}",
                dependency_lines.join("\n\n")
            ));
        }

        let pooled = match self.config.context_strategy {
            ContextStrategy::Shared => self.shared_section(task, shared),
            ContextStrategy::Hierarchical => self.ancestor_section(task, graph, completed),
            ContextStrategy::Isolated => None,
        };
        if let Some((section, tokens)) = pooled {
            sections.push(section);
            built.pooled_tokens = tokens;
        }

        built.text = sections.join("\n\n");
        built
    }

    /// Most recent shared entries from other tasks, within the token budget.
    fn shared_section(
        &self,
        task: &Task,
        shared: &[SharedContextEntry],
    ) -> Option<(String, usize)> {
        let candidates = shared
            .iter()
            .rev()
            .filter(|entry| entry.task_id != task.id)
            .take(self.config.shared_context_entries)
            .map(|entry| (&entry.task_id, entry.agent_name.as_str(), entry.output.as_str()));

        self.budgeted_section("## Shared Context", candidates)
    }

    /// Successful transitive ancestors beyond the direct dependencies.
    fn ancestor_section(
        &self,
        task: &Task,
        graph: &TaskGraph,
        completed: &HashMap<TaskId, TaskResult>,
    ) -> Option<(String, usize)> {
        let ancestors = graph.ancestors(&task.id);
        let candidates = ancestors
            .iter()
            .filter(|(_, depth)| *depth > 1)
            .filter_map(|(id, _)| completed.get(id))
            .filter(|result| result.success)
            .map(|result| (&result.task_id, result.agent_name.as_str(), result.output.as_str()));

        self.budgeted_section("## Upstream Context", candidates)
    }

    fn budgeted_section<'b>(
        &self,
        heading: &str,
        candidates: impl Iterator<Item = (&'b TaskId, &'b str, &'b str)>,
    ) -> Option<(String, usize)> {
        let mut total_tokens = 0;
        let mut lines = Vec::new();

        for (task_id, agent_name, output) in candidates {
            let pruned = prune_context(output, self.config.shared_entry_chars);
            let tokens = self.estimator.estimate(&pruned);
            if total_tokens + tokens > self.config.shared_context_budget {
                break;
            }
            total_tokens += tokens;
            lines.push(format!("[{}] {}: {}", task_id, agent_name, pruned));
        }

        if lines.is_empty() {
            None
        } else {
            Some((format!("{}\n{}", heading, lines.join("\n\n")), total_tokens))
        }
    }
}
