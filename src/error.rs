use std::time::Duration;

use thiserror::Error;

use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Circular dependency detected: {}", format_path(.path))]
    CircularDependency { path: Vec<TaskId> },

    #[error("Deadlock detected: no runnable tasks among {}", format_list(.remaining))]
    Deadlock { remaining: Vec<TaskId> },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("API key is required")]
    MissingApiKey,

    #[error("Invalid workflow parameters: {}", .0.join("; "))]
    InvalidParameters(Vec<String>),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Global timeout exceeded")]
    GlobalTimeout,

    #[error("Cancelled")]
    Cancelled,

    #[error("Agent execution failed: {0}")]
    Executor(String),

    #[error("Claude binary not found in PATH")]
    ClaudeBinaryNotFound,
}

impl Error {
    /// Whether this error means the task graph itself is invalid.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::CircularDependency { .. }
                | Error::Deadlock { .. }
                | Error::UnknownDependency { .. }
                | Error::DuplicateTask(_)
        )
    }
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_list(ids: &[TaskId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;
