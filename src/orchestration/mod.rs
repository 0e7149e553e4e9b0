//! Orchestration layer for multi-agent task execution.
//!
//! This module composes the task graph with context assembly, the message
//! bus, the execution engine and the wave scheduler into the
//! [`Orchestrator`].

pub mod bus;
pub mod context;
pub mod engine;
pub mod envelope;
pub mod events;
pub mod orchestrator;
pub mod scheduler;

pub use bus::{Message, MessageBus, MessageKind, Recipient};
pub use context::{
    prune_context, CharRatioEstimator, ContextBuilder, SharedContextEntry, TokenEstimator,
};
pub use engine::{ExecutionEngine, PreparedTask, RunLimits};
pub use envelope::{extract_envelopes, MessageEnvelope};
pub use events::{EventEmitter, EventKind, OrchestratorEvent};
pub use orchestrator::{Orchestrator, OrchestratorStatus};
pub use scheduler::{chunks, plan_waves, WaveScheduler};
