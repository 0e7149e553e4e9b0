use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{clog_debug, Error, Result};

/// How much cross-task context each task receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextStrategy {
    /// Direct dependencies plus a bounded pool of recent results.
    #[default]
    Shared,
    /// Direct dependencies only.
    Isolated,
    /// Direct dependencies plus transitive ancestors, nearest first.
    Hierarchical,
}

impl std::fmt::Display for ContextStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextStrategy::Shared => write!(f, "shared"),
            ContextStrategy::Isolated => write!(f, "isolated"),
            ContextStrategy::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

/// Tuning for a single orchestrator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrently running agent invocations.
    pub max_parallel_agents: usize,
    /// Deadline for a whole `execute()` run.
    pub global_timeout_secs: Option<u64>,
    /// Deadline for a single agent invocation.
    pub task_timeout_secs: Option<u64>,
    pub context_strategy: ContextStrategy,
    /// Character budget for each dependency output in a task's context.
    pub pruning_threshold: usize,
    pub enable_communication: bool,
    /// Token budget for shared or ancestor context.
    pub shared_context_budget: usize,
    /// Most recent entries considered for shared context.
    pub shared_context_entries: usize,
    /// Character budget per shared or ancestor entry.
    pub shared_entry_chars: usize,
    /// Ring buffer capacity of the message bus.
    pub message_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_agents: 3,
            global_timeout_secs: Some(600),
            task_timeout_secs: Some(300),
            context_strategy: ContextStrategy::Shared,
            pruning_threshold: 2000,
            enable_communication: true,
            shared_context_budget: 5000,
            shared_context_entries: 5,
            shared_entry_chars: 500,
            message_capacity: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Chunk size used by the wave scheduler. Never zero.
    pub fn effective_parallelism(&self) -> usize {
        self.max_parallel_agents.max(1)
    }

    pub fn global_timeout(&self) -> Option<Duration> {
        self.global_timeout_secs.map(Duration::from_secs)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_max_parallel_agents(mut self, max: usize) -> Self {
        self.max_parallel_agents = max;
        self
    }

    pub fn with_context_strategy(mut self, strategy: ContextStrategy) -> Self {
        self.context_strategy = strategy;
        self
    }

    pub fn with_communication(mut self, enabled: bool) -> Self {
        self.enable_communication = enabled;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout_secs = timeout.map(|d| d.as_secs().max(1));
        self
    }

    pub fn with_global_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.global_timeout_secs = timeout.map(|d| d.as_secs().max(1));
        self
    }
}

/// User settings stored in `~/.conductor/conductor.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Path or name of the Claude CLI binary.
    pub claude_command: Option<String>,
    /// API key; the CLI falls back to `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Settings {
    pub fn conductor_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".conductor"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::conductor_dir()?.join("conductor.toml"))
    }

    pub fn effective_command(&self) -> &str {
        self.claude_command.as_deref().unwrap_or("claude")
    }

    /// API key from settings, else from the environment. Blank keys count as absent.
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        clog_debug!("Settings::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Settings file not found, using defaults");
            return Ok(Self::default());
        }
        let settings: Self = toml::from_str(&fs::read_to_string(path)?)?;
        clog_debug!(
            "Settings loaded: claude_command={:?}, max_parallel_agents={}, strategy={}",
            settings.claude_command,
            settings.orchestrator.max_parallel_agents,
            settings.orchestrator.context_strategy
        );
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                clog_debug!("Creating settings directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        clog_debug!("Settings saved to {}", path.display());
        Ok(())
    }
}
