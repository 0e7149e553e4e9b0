//! Agent definitions and the registry they are resolved from.
//!
//! An agent is a named specialist persona: a system prompt plus a model
//! tier. The orchestrator never looks agents up through global state; a
//! registry is constructed once and handed to it explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capability tier of the model backing an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Haiku,
    #[default]
    Sonnet,
    Opus,
}

impl ModelTier {
    /// Concrete model identifier sent to the execution backend.
    pub fn model_id(&self) -> &'static str {
        match self {
            ModelTier::Haiku => "claude-3-5-haiku-20241022",
            ModelTier::Sonnet => "claude-sonnet-4-20250514",
            ModelTier::Opus => "claude-opus-4-20250514",
        }
    }

    /// USD per million (input, output) tokens.
    pub fn pricing_per_million(&self) -> (f64, f64) {
        match self {
            ModelTier::Haiku => (0.80, 4.00),
            ModelTier::Sonnet => (3.00, 15.00),
            ModelTier::Opus => (15.00, 75.00),
        }
    }

    /// Typical wall-clock seconds for a 4k-token response.
    pub fn base_duration_secs(&self) -> f64 {
        match self {
            ModelTier::Haiku => 15.0,
            ModelTier::Sonnet => 30.0,
            ModelTier::Opus => 60.0,
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Haiku => write!(f, "haiku"),
            ModelTier::Sonnet => write!(f, "sonnet"),
            ModelTier::Opus => write!(f, "opus"),
        }
    }
}

impl std::str::FromStr for ModelTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "haiku" => Ok(ModelTier::Haiku),
            "sonnet" => Ok(ModelTier::Sonnet),
            "opus" => Ok(ModelTier::Opus),
            other => Err(crate::Error::Validation(format!(
                "Unknown model tier: {}",
                other
            ))),
        }
    }
}

/// A specialist persona the orchestrator can assign tasks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    /// Base system prompt; orchestration details are appended per task.
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Declared tier. `None` falls back to [`ModelTier::Sonnet`].
    #[serde(default)]
    pub model_tier: Option<ModelTier>,
}

impl AgentDefinition {
    pub fn new(name: &str, description: &str, system_prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            system_prompt: system_prompt.to_string(),
            tools: Vec::new(),
            model_tier: None,
        }
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = Some(tier);
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Source of agent definitions.
pub trait AgentRegistry: Send + Sync {
    /// Look up an agent by name.
    fn get_agent(&self, name: &str) -> Option<AgentDefinition>;

    /// Names of all known agents, sorted.
    fn agent_names(&self) -> Vec<String>;
}

/// In-memory registry.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    agents: HashMap<String, AgentDefinition>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing the given agents. Later duplicates win.
    pub fn with_agents(agents: impl IntoIterator<Item = AgentDefinition>) -> Self {
        let mut registry = Self::new();
        for agent in agents {
            registry.register(agent);
        }
        registry
    }

    pub fn register(&mut self, agent: AgentDefinition) {
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The built-in specialist catalog used by the workflow templates.
    pub fn builtin() -> Self {
        Self::with_agents(builtin_agents())
    }
}

impl AgentRegistry for StaticRegistry {
    fn get_agent(&self, name: &str) -> Option<AgentDefinition> {
        self.agents.get(name).cloned()
    }

    fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

fn builtin_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new(
            "system-architect",
            "Designs overall system structure and module boundaries",
            "You are a senior system architect. Produce clear component boundaries, \
             data flow, and technology choices with brief justification.",
        )
        .with_tier(ModelTier::Opus),
        AgentDefinition::new(
            "frontend-architect",
            "Expert in React, Vue, Angular, and modern frontend architecture",
            "You are a frontend architect. Design component hierarchies, state \
             management, and performance-conscious rendering.",
        )
        .with_tools(&["read", "write"]),
        AgentDefinition::new(
            "backend-architect",
            "Specializes in scalable backend systems and API design",
            "You are a backend architect. Design and implement APIs, services, and \
             integration points with attention to correctness and scalability.",
        )
        .with_tools(&["read", "write", "bash"]),
        AgentDefinition::new(
            "database-architect",
            "Expert in database design, optimization, and migration",
            "You are a database architect. Design normalized schemas, indexes, and \
             migrations, and explain query access patterns.",
        ),
        AgentDefinition::new(
            "ui-designer",
            "Creates beautiful, intuitive user interfaces",
            "You are a UI/UX designer. Define layouts, design tokens, and \
             accessible interaction patterns.",
        )
        .with_tier(ModelTier::Haiku),
        AgentDefinition::new(
            "devops-engineer",
            "Infrastructure automation and CI/CD specialist",
            "You are a DevOps engineer. Produce CI/CD pipelines, container \
             definitions, and deployment configuration.",
        )
        .with_tools(&["bash"]),
        AgentDefinition::new(
            "security-auditor",
            "Finds vulnerabilities and insecure patterns",
            "You are a security auditor. Identify vulnerabilities, rate their \
             severity, and propose concrete remediations.",
        )
        .with_tier(ModelTier::Opus)
        .with_tools(&["read", "grep"]),
        AgentDefinition::new(
            "test-engineer",
            "Designs and writes automated tests",
            "You are a test engineer. Write focused unit and integration tests that \
             cover edge cases and failure paths.",
        )
        .with_tools(&["read", "write", "bash"]),
        AgentDefinition::new(
            "code-reviewer",
            "Reviews code for correctness and maintainability",
            "You are a meticulous code reviewer. Point out bugs, unclear code, and \
             risky changes, ordered by severity.",
        ),
        AgentDefinition::new(
            "performance-engineer",
            "Profiles and optimizes hot paths",
            "You are a performance engineer. Identify bottlenecks and propose \
             measurable optimizations.",
        ),
        AgentDefinition::new(
            "technical-writer",
            "Writes user and developer documentation",
            "You are a technical writer. Produce concise, accurate documentation \
             with runnable examples.",
        )
        .with_tier(ModelTier::Haiku),
    ]
}
