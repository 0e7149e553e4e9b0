//! Claude Code headless executor.
//!
//! `ClaudeCliExecutor` runs the Claude CLI in non-interactive mode (`-p`)
//! with JSON output and maps the response onto [`AgentResponse`].

use super::{AgentExecutor, AgentRequest, AgentResponse};
use crate::clog_debug;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for a single CLI invocation (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Default, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Internal struct for deserializing the CLI's JSON response.
#[derive(Debug, Deserialize)]
struct RawClaudeResponse {
    subtype: Option<String>,
    #[serde(default)]
    is_error: bool,
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    usage: Option<RawUsage>,
    stop_reason: Option<String>,
}

/// Executor backed by the `claude` command-line tool.
///
/// # Example
///
/// ```ignore
/// use conductor::executor::{AgentExecutor, AgentRequest, ClaudeCliExecutor};
///
/// let claude = ClaudeCliExecutor::new()?.with_api_key("sk-...");
/// let response = claude.invoke(request).await?;
/// println!("{}", response.output);
/// ```
#[derive(Debug, Clone)]
pub struct ClaudeCliExecutor {
    binary: PathBuf,
    api_key: Option<String>,
    timeout: Duration,
}

impl ClaudeCliExecutor {
    /// Locate `claude` on PATH.
    ///
    /// # Errors
    ///
    /// Returns an error if the Claude binary cannot be found.
    pub fn new() -> Result<Self> {
        Self::from_command("claude")
    }

    /// Resolve a configured command name or path.
    pub fn from_command(command: &str) -> Result<Self> {
        let binary = which::which(command).map_err(|_| Error::ClaudeBinaryNotFound)?;
        Ok(Self::with_binary(binary))
    }

    /// Use a specific binary path without checking PATH.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Key exported to the child process as `ANTHROPIC_API_KEY`.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Parse the CLI's JSON output.
    ///
    /// Error responses are mapped to `Err(Error::Executor)` so the engine
    /// records them as failed tasks.
    pub fn parse_json_response(json_str: &str) -> Result<AgentResponse> {
        let raw: RawClaudeResponse = serde_json::from_str(json_str)?;

        let failed = raw.is_error || raw.subtype.as_deref() == Some("error");
        if failed {
            let message = raw
                .error
                .or(raw.result)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Error::Executor(message));
        }

        let output = match (raw.result, raw.error) {
            (Some(result), _) => result,
            (None, Some(error)) => return Err(Error::Executor(error)),
            (None, None) => {
                return Err(Error::Executor("Unknown response format".to_string()));
            }
        };

        let usage = raw.usage.unwrap_or_default();
        Ok(AgentResponse {
            output,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            stop_reason: raw.stop_reason,
        })
    }
}

#[async_trait]
impl AgentExecutor for ClaudeCliExecutor {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse> {
        clog_debug!(
            "[claude] invoking model={} max_tokens={} prompt_chars={}",
            request.model,
            request.max_tokens,
            request.user_prompt.len()
        );

        let mut command = Command::new(&self.binary);
        command
            .arg("-p")
            .arg(&request.user_prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(&request.model)
            .arg("--system-prompt")
            .arg(&request.system_prompt)
            .env("CLAUDE_CODE_MAX_OUTPUT_TOKENS", request.max_tokens.to_string())
            .kill_on_drop(true);
        if let Some(key) = &self.api_key {
            command.env("ANTHROPIC_API_KEY", key);
        }

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        match Self::parse_json_response(&stdout) {
            Ok(response) => Ok(response),
            Err(Error::Json(_)) if !output.status.success() => {
                let message = if stderr.trim().is_empty() {
                    format!(
                        "Claude execution failed with exit code {}",
                        output.status.code().unwrap_or(-1)
                    )
                } else {
                    stderr.trim().to_string()
                };
                Err(Error::Executor(message))
            }
            // Non-JSON success output: take stdout verbatim.
            Err(Error::Json(_)) => Ok(AgentResponse::text(stdout.trim())),
            Err(e) => Err(e),
        }
    }
}
