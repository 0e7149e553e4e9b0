//! Core data model: tasks, results, and the dependency graph.

pub mod dag;
pub mod task;

pub use dag::TaskGraph;
pub use task::{Priority, Task, TaskId, TaskMetadata, TaskResult, DEFAULT_MAX_TOKENS};
