//! Workflow templates and the helpers that run them.
//!
//! Templates turn a handful of string parameters into a task graph; the
//! helpers validate those parameters, estimate cost and duration, run the
//! graph through an orchestrator and format the results.

mod helpers;
mod templates;

pub use helpers::{
    estimate_workflow_cost, estimate_workflow_duration, execute_workflow,
    format_workflow_report, validate_workflow_parameters, CostEstimate, ProgressCallback,
    ValidationReport, WorkflowConfig, WorkflowProgress, CONTEXT_OVERHEAD_TOKENS,
    PARALLELIZATION_FACTOR, PROJECT_NAME_PATTERN,
};
pub use templates::{
    builtin_templates, find_template, Complexity, WorkflowCategory, WorkflowParams,
    WorkflowTemplate, AUDIT_SCOPES,
};
