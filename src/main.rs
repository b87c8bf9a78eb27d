// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! ADW main entry point.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use adw::config::{self, CliOptions, ResolvedConfig};
use adw::providers::create_trinity_clients;
use adw::state::{StateManager, WorkflowState};
use adw::telemetry::{init_telemetry, TelemetryConfig};
use adw::trinity::{Issue, TrinityProtocol};
use adw::workflow::{Phase, PlanningRun};
use adw::worktree::{generate_id, ports_for, WorktreeManager};
use adw::VERSION;

/// ADW - AI developer workflow orchestrator.
#[derive(Parser)]
#[command(name = "adw")]
#[command(author, version, about = "AI developer workflow orchestrator", long_about = None)]
struct Cli {
    /// Directory holding per-workflow state
    #[arg(long, global = true, env = "ADW_AGENTS_DIR")]
    agents_dir: Option<PathBuf>,

    /// Directory holding rendered plans
    #[arg(long, global = true, env = "ADW_SPECS_DIR")]
    specs_dir: Option<PathBuf>,

    /// Directory holding worktrees
    #[arg(long, global = true, env = "ADW_TREES_DIR")]
    trees_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Show info-level logs and a metrics report
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Provider credentials and model overrides for commands that call LLMs.
#[derive(clap::Args)]
struct ProviderArgs {
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide = true, hide_env_values = true)]
    google_api_key: Option<String>,

    /// Model for the Architect
    #[arg(long, env = "TRINITY_ARCHITECT_MODEL")]
    architect_model: Option<String>,

    /// Model for the Critic
    #[arg(long, env = "TRINITY_CRITIC_MODEL")]
    critic_model: Option<String>,

    /// Model for the Advocate
    #[arg(long, env = "TRINITY_ADVOCATE_MODEL")]
    advocate_model: Option<String>,

    /// Retries per provider call after the first attempt
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workflow for an issue and run the Trinity plan phase
    Plan {
        /// Issue number
        issue: u64,

        /// Issue title
        #[arg(short, long)]
        title: String,

        /// Issue description
        #[arg(short, long, default_value = "", conflicts_with = "body_file")]
        body: String,

        /// Read the issue description from a file
        #[arg(long)]
        body_file: Option<PathBuf>,

        /// File with repository context for the Architect
        #[arg(long)]
        context_file: Option<PathBuf>,

        /// Use this workflow id instead of a random one
        #[arg(long)]
        id: Option<String>,

        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Show a workflow's state
    Status { adw_id: String },

    /// Record a phase result
    Record {
        adw_id: String,

        #[arg(value_parser = parse_phase)]
        phase: Phase,

        /// Phase duration in seconds
        #[arg(short, long, default_value_t = 0.0)]
        duration: f64,

        /// Record a failure
        #[arg(long)]
        failed: bool,

        /// Failure message
        #[arg(short, long)]
        error: Option<String>,
    },

    /// Check that phases have succeeded (exits non-zero if not)
    Check {
        adw_id: String,

        /// Phases that must have succeeded
        #[arg(required = true)]
        phases: Vec<String>,
    },

    /// Take a snapshot of a workflow's state
    Snapshot {
        adw_id: String,

        #[arg(short, long)]
        label: Option<String>,
    },

    /// List a workflow's snapshots, newest first
    Snapshots { adw_id: String },

    /// Roll back to a snapshot or to the point right after a phase
    #[command(group(ArgGroup::new("target").required(true).args(["snapshot", "phase"])))]
    Rollback {
        adw_id: String,

        #[arg(long)]
        snapshot: Option<PathBuf>,

        #[arg(long)]
        phase: Option<String>,
    },

    /// Show the ports allocated to a workflow id
    Ports { adw_id: String },

    /// Print a fresh workflow id
    NewId,

    /// List active worktrees
    Worktrees,

    /// Remove worktrees older than the configured age
    Cleanup {
        /// Override the configured maximum age
        #[arg(long)]
        max_age_hours: Option<f64>,
    },

    /// Remove a workflow's worktree and branch and archive its state
    Archive {
        adw_id: String,

        /// Leave the state directory in place
        #[arg(long)]
        keep_state: bool,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize a new configuration file
    Init,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show resolved configuration
    Show,
}

fn parse_phase(s: &str) -> Result<Phase, String> {
    s.parse::<Phase>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let root = config::find_workspace_root(&cwd).unwrap_or(cwd);

    let mut options = CliOptions {
        agents_dir: cli.agents_dir.clone(),
        specs_dir: cli.specs_dir.clone(),
        trees_dir: cli.trees_dir.clone(),
        ..Default::default()
    };
    if let Commands::Plan { providers, .. } = &cli.command {
        apply_provider_args(&mut options, providers);
    }

    let config = config::load_config(&root, options)
        .context("Failed to load configuration")?
        .rooted_at(&root);

    let telemetry = TelemetryConfig::for_flags(cli.verbose, cli.debug);
    let telemetry = match &config.log_level {
        Some(level) if !cli.debug => telemetry.with_filter(level.clone()),
        _ => telemetry,
    };
    let _guard = init_telemetry(&telemetry)?;

    let ctx = Ctx {
        root,
        config,
        format: cli.format,
        verbose: cli.verbose,
    };
    handle_command(&ctx, cli.command).await
}

fn apply_provider_args(options: &mut CliOptions, args: &ProviderArgs) {
    options.anthropic_api_key = args.anthropic_api_key.clone();
    options.openai_api_key = args.openai_api_key.clone();
    options.gemini_api_key = args
        .gemini_api_key
        .clone()
        .or_else(|| args.google_api_key.clone());
    options.architect_model = args.architect_model.clone();
    options.critic_model = args.critic_model.clone();
    options.advocate_model = args.advocate_model.clone();
    options.max_retries = args.max_retries;
}

struct Ctx {
    root: PathBuf,
    config: ResolvedConfig,
    format: OutputFormat,
    verbose: bool,
}

impl Ctx {
    fn worktrees(&self) -> WorktreeManager {
        WorktreeManager::new(&self.root)
            .with_trees_dir(&self.config.trees_dir)
            .with_agents_dir(&self.config.agents_dir)
    }

    fn load(&self, adw_id: &str) -> anyhow::Result<StateManager> {
        StateManager::load(adw_id, &self.config.agents_dir)
            .with_context(|| format!("Could not load workflow {adw_id}"))
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

async fn handle_command(ctx: &Ctx, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Plan {
            issue,
            title,
            body,
            body_file,
            context_file,
            id,
            providers: _,
        } => {
            let body = match body_file {
                Some(path) => read_text(&path)?,
                None => body,
            };
            let repo_context = context_file.as_deref().map(read_text).transpose()?;
            handle_plan(ctx, Issue::new(issue, title, body), repo_context, id).await?;
        }
        Commands::Status { adw_id } => {
            let manager = ctx.load(&adw_id)?;
            let state = current(&manager)?;
            if ctx.json() {
                ctx.print_json(state)?;
            } else {
                print_status(state);
            }
        }
        Commands::Record {
            adw_id,
            phase,
            duration,
            failed,
            error,
        } => {
            let mut manager = ctx.load(&adw_id)?;
            let success = !failed;
            manager.commit_phase_completion(phase.as_str(), duration, success, error)?;
            if success {
                manager.create_snapshot(Some(phase.as_str()))?;
            }
            let state = current(&manager)?;
            if ctx.json() {
                ctx.print_json(state)?;
            } else {
                let mark = if success { "✓".green() } else { "✗".red() };
                println!("{} {} recorded for {}", mark, phase, adw_id.bright_white());
                println!("Current phase: {}", state.current_phase.cyan());
            }
        }
        Commands::Check { adw_id, phases } => {
            let manager = ctx.load(&adw_id)?;
            let missing = manager.missing_prerequisites(phases.as_slice());
            if ctx.json() {
                ctx.print_json(&serde_json::json!({
                    "adw_id": adw_id,
                    "satisfied": missing.is_empty(),
                    "missing": missing,
                }))?;
            } else if missing.is_empty() {
                println!("{} All prerequisites met", "✓".green());
            }
            if !missing.is_empty() {
                bail!("[{adw_id}] missing successful phases: {}", missing.join(", "));
            }
        }
        Commands::Snapshot { adw_id, label } => {
            let manager = ctx.load(&adw_id)?;
            let path = manager.create_snapshot(label.as_deref())?;
            if ctx.json() {
                ctx.print_json(&serde_json::json!({ "snapshot": path }))?;
            } else {
                println!("{} Snapshot: {}", "✓".green(), path.display());
            }
        }
        Commands::Snapshots { adw_id } => {
            let manager = StateManager::new(&adw_id, &ctx.config.agents_dir)?;
            let snapshots = manager.list_snapshots()?;
            if ctx.json() {
                ctx.print_json(&snapshots)?;
            } else if snapshots.is_empty() {
                println!("{}", "No snapshots".dimmed());
            } else {
                for path in snapshots {
                    println!("{}", path.display());
                }
            }
        }
        Commands::Rollback {
            adw_id,
            snapshot,
            phase,
        } => {
            let mut manager = ctx.load(&adw_id)?;
            let state = match (snapshot, phase) {
                (Some(path), _) => manager.rollback_to_snapshot(&path)?,
                (None, Some(phase)) => manager.rollback_to_phase(&phase)?,
                (None, None) => bail!("pass --snapshot or --phase"),
            };
            if ctx.json() {
                ctx.print_json(state)?;
            } else {
                println!(
                    "{} Rolled back {} to phase {} ({} records)",
                    "✓".green(),
                    adw_id.bright_white(),
                    state.current_phase.cyan(),
                    state.phase_history.len()
                );
            }
        }
        Commands::Ports { adw_id } => {
            let ports = ports_for(&adw_id)?;
            if ctx.json() {
                ctx.print_json(&ports)?;
            } else {
                println!("Backend:  {}", ports.backend);
                println!("Frontend: {}", ports.frontend);
            }
        }
        Commands::NewId => {
            let id = generate_id();
            if ctx.json() {
                ctx.print_json(&serde_json::json!({ "adw_id": id }))?;
            } else {
                println!("{id}");
            }
        }
        Commands::Worktrees => {
            let worktrees = ctx.worktrees().list_active_worktrees().await?;
            if ctx.json() {
                ctx.print_json(&worktrees)?;
            } else if worktrees.is_empty() {
                println!("{}", "No active worktrees".dimmed());
            } else {
                for wt in worktrees {
                    let branch = wt.branch.as_deref().unwrap_or("(detached)");
                    println!("{}  {}  {}", wt.path.display(), branch.cyan(), short(&wt.head));
                }
            }
        }
        Commands::Cleanup { max_age_hours } => {
            let max_age = max_age_hours.unwrap_or(ctx.config.worktree_max_age_hours);
            if !(max_age.is_finite() && max_age >= 0.0) {
                bail!("--max-age-hours must be a non-negative number");
            }
            let removed = ctx.worktrees().cleanup_old_worktrees(max_age).await?;
            if ctx.json() {
                ctx.print_json(&removed)?;
            } else if removed.is_empty() {
                println!("{}", "Nothing to clean up".dimmed());
            } else {
                for id in removed {
                    println!("{} Removed {}", "✓".green(), id);
                }
            }
        }
        Commands::Archive { adw_id, keep_state } => {
            let archived = ctx
                .worktrees()
                .cleanup_worktree_and_state(&adw_id, !keep_state)
                .await?;
            if ctx.json() {
                ctx.print_json(&serde_json::json!({ "adw_id": adw_id, "archive": archived }))?;
            } else {
                println!("{} Removed worktree for {}", "✓".green(), adw_id);
                if let Some(path) = archived {
                    println!("State archived to {}", path.display());
                }
            }
        }
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => ctx.print_json(&ctx.config)?,
        },
        Commands::Init => {
            let path = config::init_config(&ctx.root, None)?;
            println!("Created config file: {}", path.display());
        }
        Commands::Version => {
            println!("adw {VERSION}");
        }
    }
    Ok(())
}

async fn handle_plan(
    ctx: &Ctx,
    issue: Issue,
    repo_context: Option<String>,
    id: Option<String>,
) -> anyhow::Result<()> {
    let clients = create_trinity_clients(&ctx.config).context("Failed to create Trinity clients")?;
    let protocol = TrinityProtocol::new(clients)
        .with_max_tokens(ctx.config.trinity.max_tokens)
        .with_timeout(ctx.config.trinity.timeout());

    let mut run = PlanningRun::new(ctx.worktrees(), protocol, &ctx.config.specs_dir);
    if let Some(url) = &ctx.config.repo_url {
        run = run.with_repo_url(url.clone());
    }
    if let Some(context) = repo_context {
        run = run.with_repo_context(context);
    }

    let progress = (!ctx.json()).then(|| spinner(format!("Planning issue #{}...", issue.number)));
    let result = match &id {
        Some(id) => run.execute_with_id(id, &issue).await,
        None => run.execute(&issue).await,
    };
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let outcome = result?;

    if ctx.json() {
        ctx.print_json(&outcome)?;
    } else {
        let plan = &outcome.plan;
        println!("{} Plan ready for issue #{}", "✓".green(), plan.issue_number);
        println!("ADW ID:     {}", outcome.adw_id.bright_white().bold());
        println!("Branch:     {}", outcome.branch_name.cyan());
        println!("Worktree:   {}", outcome.worktree_path.display());
        println!("Ports:      {} / {}", outcome.ports.backend, outcome.ports.frontend);
        println!("Complexity: {}", plan.estimated_complexity.to_string().yellow());
        println!("Plan:       {}", outcome.plan_file.display());
        for perspective in &plan.perspectives {
            if !perspective.success {
                println!(
                    "{} {} unavailable: {}",
                    "!".yellow(),
                    perspective.role.title(),
                    perspective.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    #[cfg(feature = "telemetry")]
    if ctx.verbose {
        eprintln!("\n{}", adw::telemetry::GLOBAL_METRICS.snapshot().format_report());
    }

    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn current(manager: &StateManager) -> anyhow::Result<&WorkflowState> {
    manager.state().context("workflow state not loaded")
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn print_status(state: &WorkflowState) {
    println!("{}", format!("Workflow {}", state.adw_id).bright_blue().bold());
    println!("Issue:         #{}", state.issue_number);
    println!("Branch:        {}", state.branch_name.cyan());
    println!("Worktree:      {}", state.worktree_path.display());
    println!("Ports:         {} / {}", state.backend_port, state.frontend_port);
    println!("Current phase: {}", state.current_phase.yellow());
    if let Some(plan) = &state.plan_file {
        println!("Plan:          {}", plan.display());
    }
    for (label, model) in [
        ("Architect", &state.trinity_architect_model),
        ("Critic", &state.trinity_critic_model),
        ("Advocate", &state.trinity_advocate_model),
    ] {
        if let Some(model) = model {
            println!("{:<15}{model}", format!("{label}:"));
        }
    }
    if let Some(reason) = &state.cleanup_reason {
        println!("Cleaned up:    {}", reason.red());
    }

    if state.phase_history.is_empty() {
        println!("\n{}", "No phases recorded".dimmed());
        return;
    }
    println!("\n{}", "History".bright_cyan());
    for record in &state.phase_history {
        let mark = if record.success { "✓".green() } else { "✗".red() };
        print!(
            "  {} {:<9} {:>8.1}s  {}",
            mark,
            record.phase,
            record.duration_seconds,
            record.completed_at.format("%Y-%m-%d %H:%M:%S")
        );
        match &record.error_message {
            Some(msg) => println!("  {}", msg.red()),
            None => println!(),
        }
    }
}
