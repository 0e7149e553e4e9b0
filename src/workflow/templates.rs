//! Built-in workflow templates.
//!
//! A template is a pure factory: given string parameters it returns a task
//! list whose dependencies encode which specialist handles which step.
//! Templates never execute anything.

use crate::agent::ModelTier;
use crate::core::task::{Priority, Task};
use std::collections::BTreeMap;

/// Template parameters, keyed by name.
pub type WorkflowParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowCategory {
    Development,
    Security,
    Quality,
    Infrastructure,
    Documentation,
}

impl std::fmt::Display for WorkflowCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowCategory::Development => write!(f, "development"),
            WorkflowCategory::Security => write!(f, "security"),
            WorkflowCategory::Quality => write!(f, "quality"),
            WorkflowCategory::Infrastructure => write!(f, "infrastructure"),
            WorkflowCategory::Documentation => write!(f, "documentation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

/// A named, parameterized task-graph factory.
#[derive(Clone, Copy)]
pub struct WorkflowTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: WorkflowCategory,
    pub tags: &'static [&'static str],
    /// Human-readable duration hint, e.g. `"15-25 minutes"`.
    pub estimated_duration: &'static str,
    pub complexity: Complexity,
    /// Parameters that must be present and non-empty.
    pub required_params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
    build: fn(&WorkflowParams) -> Vec<Task>,
    validate: fn(&WorkflowParams) -> Vec<String>,
}

impl WorkflowTemplate {
    pub fn build_tasks(&self, params: &WorkflowParams) -> Vec<Task> {
        (self.build)(params)
    }

    /// Template-specific checks beyond required parameters.
    pub fn extra_validation(&self, params: &WorkflowParams) -> Vec<String> {
        (self.validate)(params)
    }
}

impl std::fmt::Debug for WorkflowTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTemplate")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("complexity", &self.complexity)
            .finish()
    }
}

static BUILTIN: [WorkflowTemplate; 4] = [
    WorkflowTemplate {
        id: "full-stack-app",
        name: "Full-Stack Application",
        description: "Architecture, data model, API, UI, tests, deployment and docs for a new application",
        category: WorkflowCategory::Development,
        tags: &["fullstack", "frontend", "backend", "database", "deployment"],
        estimated_duration: "20-30 minutes",
        complexity: Complexity::Complex,
        required_params: &["project_name", "description"],
        optional_params: &["features", "tech_stack"],
        build: full_stack_app,
        validate: no_extra_validation,
    },
    WorkflowTemplate {
        id: "security-audit",
        name: "Security Audit",
        description: "Threat model, dependency and code analysis, and a prioritized findings report",
        category: WorkflowCategory::Security,
        tags: &["security", "audit", "owasp", "compliance"],
        estimated_duration: "10-25 minutes",
        complexity: Complexity::Moderate,
        required_params: &["project_name", "target"],
        optional_params: &["scope"],
        build: security_audit,
        validate: validate_scope,
    },
    WorkflowTemplate {
        id: "api-development",
        name: "API Development",
        description: "Design, model, implement, secure, test and document a REST API",
        category: WorkflowCategory::Development,
        tags: &["api", "rest", "backend", "openapi"],
        estimated_duration: "15-20 minutes",
        complexity: Complexity::Moderate,
        required_params: &["project_name", "resources"],
        optional_params: &["auth"],
        build: api_development,
        validate: no_extra_validation,
    },
    WorkflowTemplate {
        id: "code-review",
        name: "Code Review",
        description: "Parallel structure, security, performance and test reviews merged into one summary",
        category: WorkflowCategory::Quality,
        tags: &["review", "quality", "refactoring"],
        estimated_duration: "5-10 minutes",
        complexity: Complexity::Simple,
        required_params: &["code"],
        optional_params: &["language", "focus"],
        build: code_review,
        validate: no_extra_validation,
    },
];

/// All built-in templates.
pub fn builtin_templates() -> &'static [WorkflowTemplate] {
    &BUILTIN
}

pub fn find_template(id: &str) -> Option<&'static WorkflowTemplate> {
    BUILTIN.iter().find(|t| t.id == id)
}

/// Accepted values for the security audit `scope` parameter.
pub const AUDIT_SCOPES: [&str; 3] = ["quick", "standard", "comprehensive"];

fn param<'a>(params: &'a WorkflowParams, key: &str, default: &'a str) -> &'a str {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn list_param(params: &WorkflowParams, key: &str) -> Vec<String> {
    param(params, key, "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn no_extra_validation(_: &WorkflowParams) -> Vec<String> {
    Vec::new()
}

fn validate_scope(params: &WorkflowParams) -> Vec<String> {
    match params.get("scope").map(|s| s.trim()) {
        Some(scope) if !scope.is_empty() && !AUDIT_SCOPES.contains(&scope) => vec![format!(
            "scope must be one of {}, got '{}'",
            AUDIT_SCOPES.join(", "),
            scope
        )],
        _ => Vec::new(),
    }
}

fn full_stack_app(params: &WorkflowParams) -> Vec<Task> {
    let project = param(params, "project_name", "project");
    let description = param(params, "description", "");
    let stack = param(params, "tech_stack", "a modern TypeScript stack");
    let features = list_param(params, "features");
    let feature_list = if features.is_empty() {
        "the core features implied by the description".to_string()
    } else {
        features.join(", ")
    };

    vec![
        Task::new(
            "architecture",
            "system-architect",
            "Design the system architecture",
            &format!(
                "Design the architecture for {project}: {description}.\n\
                 Target stack: {stack}. Features: {feature_list}.\n\
                 Define components, boundaries, data flow and deployment topology."
            ),
        )
        .with_priority(Priority::Critical)
        .with_max_tokens(8000)
        .with_context("project_name", project)
        .with_context("features", features.clone()),
        Task::new(
            "database-schema",
            "database-architect",
            "Design the database schema",
            &format!("Design the database schema, indexes and migrations for {project}."),
        )
        .depends_on(["architecture"])
        .with_priority(Priority::High)
        .with_max_tokens(6000),
        Task::new(
            "api-design",
            "backend-architect",
            "Design and implement the backend API",
            &format!("Design and implement the backend API for {project} covering: {feature_list}."),
        )
        .depends_on(["architecture", "database-schema"])
        .with_priority(Priority::High)
        .with_max_tokens(8000),
        Task::new(
            "ui-design",
            "ui-designer",
            "Design the user interface",
            &format!("Design the screens, components and visual system for {project}."),
        )
        .depends_on(["architecture"])
        .with_max_tokens(4000),
        Task::new(
            "frontend",
            "frontend-architect",
            "Implement the frontend",
            &format!("Implement the {project} frontend against the API and UI design."),
        )
        .depends_on(["api-design", "ui-design"])
        .with_max_tokens(8000),
        Task::new(
            "testing",
            "test-engineer",
            "Write the test suite",
            &format!("Write unit, integration and end-to-end tests for {project}."),
        )
        .depends_on(["api-design", "frontend"])
        .with_max_tokens(6000),
        Task::new(
            "deployment",
            "devops-engineer",
            "Prepare deployment",
            &format!("Write CI/CD pipelines, container images and deployment config for {project}."),
        )
        .depends_on(["testing"])
        .with_max_tokens(4000),
        Task::new(
            "documentation",
            "technical-writer",
            "Write the documentation",
            &format!("Write the README, setup guide and API reference for {project}."),
        )
        .depends_on(["api-design", "frontend"])
        .with_priority(Priority::Low)
        .with_max_tokens(4000),
    ]
}

fn security_audit(params: &WorkflowParams) -> Vec<Task> {
    let project = param(params, "project_name", "project");
    let target = param(params, "target", "");
    let scope = param(params, "scope", "standard");
    let (depth_tokens, deep) = match scope {
        "quick" => (3000, false),
        "comprehensive" => (8000, true),
        _ => (5000, true),
    };

    let mut tasks = vec![
        Task::new(
            "threat-model",
            "security-auditor",
            "Build the threat model",
            &format!("Build a threat model for {project} ({target}). Identify assets, trust boundaries and attackers."),
        )
        .with_priority(Priority::Critical)
        .with_max_tokens(depth_tokens)
        .with_context("scope", scope),
        Task::new(
            "dependency-audit",
            "security-auditor",
            "Audit third-party dependencies",
            &format!("Audit the dependencies of {project} for known vulnerabilities and abandoned packages."),
        )
        .with_model(ModelTier::Sonnet)
        .with_max_tokens(depth_tokens),
        Task::new(
            "code-analysis",
            "security-auditor",
            "Analyze the code for vulnerabilities",
            &format!("Review {target} for injection, authentication, authorization and data exposure flaws."),
        )
        .depends_on(["threat-model"])
        .with_priority(Priority::High)
        .with_max_tokens(depth_tokens),
    ];

    let mut report_deps = vec!["threat-model", "dependency-audit", "code-analysis"];

    if deep {
        tasks.push(
            Task::new(
                "infrastructure-review",
                "devops-engineer",
                "Review infrastructure security",
                &format!("Review the deployment, secrets handling and network exposure of {project}."),
            )
            .depends_on(["threat-model"])
            .with_max_tokens(depth_tokens),
        );
        report_deps.push("infrastructure-review");
    }

    if scope == "comprehensive" {
        tasks.push(
            Task::new(
                "penetration-plan",
                "security-auditor",
                "Plan penetration tests",
                &format!("Write a penetration test plan for {project} targeting the highest-risk findings."),
            )
            .depends_on(["code-analysis", "infrastructure-review"])
            .with_max_tokens(depth_tokens),
        );
        report_deps.push("penetration-plan");
    }

    tasks.push(
        Task::new(
            "security-report",
            "technical-writer",
            "Write the findings report",
            &format!("Consolidate all findings for {project} into a prioritized report with remediation steps."),
        )
        .depends_on(report_deps)
        .with_max_tokens(4000),
    );

    tasks
}

fn api_development(params: &WorkflowParams) -> Vec<Task> {
    let project = param(params, "project_name", "api");
    let resources = list_param(params, "resources");
    let auth = param(params, "auth", "JWT bearer tokens");
    let resource_list = resources.join(", ");

    vec![
        Task::new(
            "api-spec",
            "backend-architect",
            "Write the API specification",
            &format!("Write an OpenAPI specification for {project} exposing: {resource_list}. Authentication: {auth}."),
        )
        .with_priority(Priority::Critical)
        .with_max_tokens(6000)
        .with_context("resources", resources.clone()),
        Task::new(
            "data-model",
            "database-architect",
            "Design the data model",
            &format!("Design tables and relations backing {resource_list}."),
        )
        .depends_on(["api-spec"])
        .with_priority(Priority::High)
        .with_max_tokens(5000),
        Task::new(
            "implementation",
            "backend-architect",
            "Implement the endpoints",
            &format!("Implement the {project} endpoints, validation and error handling."),
        )
        .depends_on(["api-spec", "data-model"])
        .with_priority(Priority::High)
        .with_max_tokens(8000),
        Task::new(
            "security-review",
            "security-auditor",
            "Review API security",
            &format!("Review the {project} implementation for authentication and input-validation issues."),
        )
        .depends_on(["implementation"])
        .with_max_tokens(4000),
        Task::new(
            "api-tests",
            "test-engineer",
            "Write API tests",
            &format!("Write contract and integration tests for every {project} endpoint."),
        )
        .depends_on(["implementation"])
        .with_max_tokens(5000),
        Task::new(
            "api-docs",
            "technical-writer",
            "Write API documentation",
            &format!("Write usage documentation with request and response examples for {project}."),
        )
        .depends_on(["api-spec", "implementation"])
        .with_priority(Priority::Low)
        .with_max_tokens(3000),
    ]
}

fn code_review(params: &WorkflowParams) -> Vec<Task> {
    let code = param(params, "code", "");
    let language = param(params, "language", "the detected language");
    let focus = param(params, "focus", "general quality");

    let review = |id: &str, agent: &str, description: &str, ask: &str| {
        Task::new(
            id,
            agent,
            description,
            &format!("{ask}\nLanguage: {language}. Focus: {focus}.\n\n{code}"),
        )
        .with_max_tokens(3000)
    };

    vec![
        review(
            "structure-review",
            "code-reviewer",
            "Review structure and readability",
            "Review this code for structure, naming, duplication and readability.",
        ),
        review(
            "security-scan",
            "security-auditor",
            "Scan for security issues",
            "Identify security vulnerabilities in this code.",
        )
        .with_priority(Priority::High),
        review(
            "performance-review",
            "performance-engineer",
            "Review performance",
            "Identify performance problems and costly patterns in this code.",
        ),
        review(
            "test-review",
            "test-engineer",
            "Assess test coverage",
            "Assess how well this code is tested and list missing cases.",
        )
        .with_priority(Priority::Low),
        Task::new(
            "review-summary",
            "code-reviewer",
            "Summarize the review",
            "Merge the individual reviews into one prioritized list of changes.",
        )
        .depends_on([
            "structure-review",
            "security-scan",
            "performance-review",
            "test-review",
        ])
        .with_model(ModelTier::Haiku)
        .with_max_tokens(2000),
    ]
}
