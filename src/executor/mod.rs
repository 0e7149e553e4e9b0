//! Agent execution capability.
//!
//! The orchestrator does not know how a model is invoked. It hands an
//! [`AgentRequest`] to an [`AgentExecutor`] and receives an
//! [`AgentResponse`]; anything network- or process-bound lives behind
//! this trait.

mod claude;

pub use claude::{ClaudeCliExecutor, DEFAULT_TIMEOUT_SECS};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Concrete model identifier (see [`crate::agent::ModelTier::model_id`]).
    pub model: String,
    pub max_tokens: u32,
}

/// The outcome of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub stop_reason: Option<String>,
}

impl AgentResponse {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Invokes an agent and returns its output.
///
/// Implementations return `Err` for any failed invocation; the execution
/// engine converts that into a failed task result rather than aborting
/// the run.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse>;
}
