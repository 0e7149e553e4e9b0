use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use conductor::agent::{AgentRegistry, StaticRegistry};
use conductor::config::Settings;
use conductor::executor::{AgentExecutor, ClaudeCliExecutor};
use conductor::orchestration::{plan_waves, CharRatioEstimator};
use conductor::workflow::{
    builtin_templates, estimate_workflow_cost, estimate_workflow_duration, execute_workflow,
    find_template, format_workflow_report, validate_workflow_parameters, WorkflowConfig,
    WorkflowParams, WorkflowProgress, WorkflowTemplate,
};
use conductor::{clog, Error, Result};

/// Conductor - dependency-aware multi-agent task orchestrator
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    CONDUCTOR_DEBUG=1     Enable debug logging (alternative to --debug)\n    CONDUCTOR_LOG=LEVEL   Log threshold: error, warn, info, debug or trace\n    ANTHROPIC_API_KEY     API key used when none is configured"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.conductor/conductor.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List the built-in workflow templates
    Templates,

    /// List the built-in agents
    Agents,

    /// Validate parameters and show waves and estimates without running
    Plan {
        /// Template id (see `conductor templates`)
        template: String,

        /// Template parameter as key=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Run a workflow template
    Run {
        /// Template id (see `conductor templates`)
        template: String,

        /// Template parameter as key=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Maximum concurrent agent invocations
        #[arg(long)]
        max_parallel: Option<usize>,

        /// API key (overrides settings and ANTHROPIC_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Write the markdown report to this file instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    conductor::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Templates => run_templates(),
        Command::Agents => run_agents(),
        Command::Plan { template, params } => run_plan(&template, params),
        Command::Run {
            template,
            params,
            max_parallel,
            api_key,
            report,
        } => run_workflow(&template, params, max_parallel, api_key, report),
    }
}

fn lookup(id: &str) -> Result<&'static WorkflowTemplate> {
    find_template(id).ok_or_else(|| {
        let known: Vec<&str> = builtin_templates().iter().map(|t| t.id).collect();
        Error::Validation(format!(
            "Unknown template '{}'. Available: {}",
            id,
            known.join(", ")
        ))
    })
}

fn run_templates() -> Result<()> {
    for template in builtin_templates() {
        println!("{:<18} {}", template.id, template.name);
        println!("    {}", template.description);
        println!(
            "    category: {}  complexity: {}  duration: {}",
            template.category, template.complexity, template.estimated_duration
        );
        println!("    required: {}", template.required_params.join(", "));
        if !template.optional_params.is_empty() {
            println!("    optional: {}", template.optional_params.join(", "));
        }
        println!();
    }
    Ok(())
}

fn run_agents() -> Result<()> {
    let registry = StaticRegistry::builtin();
    for name in registry.agent_names() {
        if let Some(agent) = registry.get_agent(&name) {
            println!(
                "{:<22} {:<7} {}",
                agent.name,
                agent.model_tier.unwrap_or_default().to_string(),
                agent.description
            );
        }
    }
    Ok(())
}

fn validated(template: &WorkflowTemplate, params: Vec<(String, String)>) -> Result<WorkflowParams> {
    let params: WorkflowParams = params.into_iter().collect();
    let validation = validate_workflow_parameters(template, &params);
    if !validation.valid {
        return Err(Error::InvalidParameters(validation.errors));
    }
    Ok(params)
}

fn run_plan(template_id: &str, params: Vec<(String, String)>) -> Result<()> {
    let template = lookup(template_id)?;
    let params = validated(template, params)?;
    let registry = StaticRegistry::builtin();

    let tasks = template.build_tasks(&params);
    let waves = plan_waves(&tasks)?;
    clog!(
        "Plan command: template={}, tasks={}, waves={}",
        template.id,
        tasks.len(),
        waves.len()
    );

    println!("{} ({} tasks)", template.name, tasks.len());
    println!();
    for (index, wave) in waves.iter().enumerate() {
        let names: Vec<String> = wave
            .iter()
            .filter_map(|id| tasks.iter().find(|t| &t.id == id))
            .map(|t| format!("{} [{}]", t.id, t.agent_name))
            .collect();
        println!("  Wave {}: {}", index + 1, names.join(", "));
    }

    let duration = estimate_workflow_duration(template, &params, &registry);
    let cost = estimate_workflow_cost(
        template,
        &params,
        &registry,
        &CharRatioEstimator::default(),
    );
    println!();
    println!("  Estimated duration: ~{:.0}s", duration.as_secs_f64());
    println!(
        "  Estimated cost:     ~${:.2} ({} input / {} output tokens)",
        cost.usd, cost.input_tokens, cost.output_tokens
    );
    Ok(())
}

fn run_workflow(
    template_id: &str,
    params: Vec<(String, String)>,
    max_parallel: Option<usize>,
    api_key: Option<String>,
    report: Option<PathBuf>,
) -> Result<()> {
    let template = lookup(template_id)?;
    let params = validated(template, params)?;
    let settings = Settings::load()?;
    clog!(
        "Run command: template={}, max_parallel={:?}, report={:?}",
        template.id,
        max_parallel,
        report
    );

    let config = WorkflowConfig {
        api_key: api_key.or_else(|| settings.effective_api_key()),
        max_parallel_agents: max_parallel,
        on_progress: Some(Arc::new(|progress: &WorkflowProgress| {
            println!("[{}/{}] {}", progress.settled, progress.total, progress.message);
        })),
        orchestrator: settings.orchestrator.clone(),
    };
    let registry: Arc<dyn AgentRegistry> = Arc::new(StaticRegistry::builtin());
    let command = settings.effective_command().to_string();

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(execute_workflow(
        template,
        &params,
        config,
        registry,
        move |key| {
            let executor = ClaudeCliExecutor::from_command(&command)?.with_api_key(key);
            Ok(Arc::new(executor) as Arc<dyn AgentExecutor>)
        },
    ))?;

    let markdown = format_workflow_report(template, &results);
    match report {
        Some(path) => {
            std::fs::write(&path, &markdown)?;
            println!();
            println!("Report written to {}", path.display());
        }
        None => {
            println!();
            println!("{}", markdown);
        }
    }

    let failed = results.values().filter(|r| !r.success).count();
    if failed > 0 {
        println!("{} of {} task(s) failed", failed, results.len());
    }
    Ok(())
}
