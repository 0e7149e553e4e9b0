pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod log;
pub mod orchestration;
pub mod workflow;

pub use agent::{AgentDefinition, AgentRegistry, ModelTier, StaticRegistry};
pub use config::{ContextStrategy, OrchestratorConfig, Settings};
pub use core::{Priority, Task, TaskGraph, TaskId, TaskMetadata, TaskResult};
pub use error::{Error, Result};
pub use executor::{AgentExecutor, AgentRequest, AgentResponse, ClaudeCliExecutor};
pub use orchestration::{EventKind, MessageBus, Orchestrator, OrchestratorEvent};
