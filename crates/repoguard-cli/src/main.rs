//! CLI binary for running and resuming RepoGuard scans.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use repoguard_pipeline::{
    ApprovalGate, ApprovalRequest, AutoApprove, ConsoleApproval, Decision, Deferred, Engine,
    FilterSensitive, PipelineEvent, RunOutcome, RunStatus, ScanConfig, ScriptedApproval,
    SecretsBackend,
};
use repoguard_types::Phase;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "repoguard.json";

#[derive(Parser)]
#[command(name = "repoguard", version, about = "Pre-merge repository scanner with a durable approval pause")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (default: ./repoguard.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory for run state, the report, and tool execution
    #[arg(short, long, global = true)]
    workdir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a scan of a path, or of free text naming paths
    Scan {
        /// Directory, file, or a description such as "src/app.py and docs/"
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,

        /// Approve every target at the approval pause
        #[arg(long, group = "decision")]
        yes: bool,

        /// Approve with every sensitive target removed
        #[arg(long, group = "decision")]
        filter_secrets: bool,

        /// Cancel at the approval pause
        #[arg(long, group = "decision")]
        cancel: bool,

        /// Stop at the approval pause; continue later with `resume`
        #[arg(long, group = "decision")]
        detach: bool,

        /// Maximum number of files per run
        #[arg(long)]
        max_files: Option<usize>,

        /// Maximum analyzer invocations in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Secrets scanner backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },

    /// Continue a run from its checkpoint
    Resume {
        run_id: String,

        /// Decision for a run parked at the approval pause
        #[arg(long, value_enum)]
        decision: Option<DecisionArg>,

        /// Replacement target list (implies an approve-filtered decision)
        #[arg(long, num_args = 1.., conflicts_with = "decision")]
        files: Vec<String>,
    },

    /// Print the last checkpoint of a run
    Inspect {
        run_id: String,

        /// Print the raw checkpoint JSON
        #[arg(long)]
        json: bool,
    },

    /// List checkpointed runs
    Runs,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    DetectSecrets,
    Builtin,
}

impl From<BackendArg> for SecretsBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => SecretsBackend::Auto,
            BackendArg::DetectSecrets => SecretsBackend::DetectSecrets,
            BackendArg::Builtin => SecretsBackend::Builtin,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Approve,
    FilterSecrets,
    Cancel,
}

impl DecisionArg {
    fn name(self) -> &'static str {
        match self {
            DecisionArg::Approve => "approve",
            DecisionArg::FilterSecrets => "filter-secrets",
            DecisionArg::Cancel => "cancel",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing; RUST_LOG wins over --verbose
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let workdir = match &cli.workdir {
        Some(dir) => std::fs::canonicalize(dir)?,
        None => std::env::current_dir()?,
    };
    let config = load_config(cli.config.as_deref(), &workdir)?;

    match cli.command {
        Commands::Scan {
            input,
            yes,
            filter_secrets,
            cancel,
            detach,
            max_files,
            concurrency,
            backend,
        } => {
            let mut config = config;
            if let Some(n) = max_files {
                config.max_files = n;
            }
            if let Some(n) = concurrency {
                config.max_concurrency = n;
            }
            if let Some(b) = backend {
                config.secrets_backend = b.into();
            }
            let gate: Arc<dyn ApprovalGate> = if yes {
                Arc::new(AutoApprove)
            } else if filter_secrets {
                Arc::new(FilterSensitive)
            } else if cancel {
                Arc::new(ScriptedApproval::new(vec![Some(Decision::Cancel)]))
            } else if detach {
                Arc::new(Deferred)
            } else {
                Arc::new(ConsoleApproval)
            };
            cmd_scan(config, &workdir, &input.join(" "), gate).await?;
        }
        Commands::Resume {
            run_id,
            decision,
            files,
        } => {
            cmd_resume(config, &workdir, &run_id, decision, files).await?;
        }
        Commands::Inspect { run_id, json } => {
            cmd_inspect(config, &workdir, &run_id, json).await?;
        }
        Commands::Runs => {
            cmd_runs(config, &workdir).await?;
        }
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>, workdir: &Path) -> anyhow::Result<ScanConfig> {
    if let Some(path) = explicit {
        return Ok(ScanConfig::load(path)?);
    }
    let fallback = workdir.join(DEFAULT_CONFIG_FILE);
    if fallback.is_file() {
        tracing::debug!(path = %fallback.display(), "Using config from working directory");
        return Ok(ScanConfig::load(&fallback)?);
    }
    Ok(ScanConfig::default())
}

async fn cmd_scan(
    config: ScanConfig,
    workdir: &Path,
    input: &str,
    gate: Arc<dyn ApprovalGate>,
) -> anyhow::Result<()> {
    let engine = Engine::new(config, workdir)?.with_gate(gate);
    println!("Scanning: {input}");
    let printer = spawn_event_printer(&engine);
    let result = engine.start(input).await;
    drop(engine);
    let _ = printer.await;
    finish(result?)
}

async fn cmd_resume(
    config: ScanConfig,
    workdir: &Path,
    run_id: &str,
    decision: Option<DecisionArg>,
    files: Vec<String>,
) -> anyhow::Result<()> {
    let engine = Engine::new(config, workdir)?.with_gate(Arc::new(ConsoleApproval));
    let decision = if !files.is_empty() {
        Some(Decision::ApproveFiltered(files))
    } else if let Some(arg) = decision {
        let state = engine.inspect(run_id).await?;
        let request = ApprovalRequest::from_state(&state);
        Some(Decision::from_name(arg.name(), &request)?)
    } else {
        None
    };

    println!("Resuming run {run_id}");
    let printer = spawn_event_printer(&engine);
    let result = engine.resume(run_id, decision).await;
    drop(engine);
    let _ = printer.await;
    finish(result?)
}

async fn cmd_inspect(
    config: ScanConfig,
    workdir: &Path,
    run_id: &str,
    json: bool,
) -> anyhow::Result<()> {
    let engine = Engine::new(config, workdir)?;
    let state = engine.inspect(run_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("Run: {}", state.run_id);
    println!("Phase: {}", state.phase);
    println!("Input: {}", state.user_input);
    println!("Created: {}", state.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Updated: {}", state.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(reason) = &state.risk_reason {
        println!("Risk: {reason}");
    }
    if let Some(err) = &state.error_message {
        println!("Error: {err}");
    }
    if state.filter_applied {
        println!("Targets were filtered at approval");
    }
    println!("\nTargets ({}):", state.target_files.len());
    for file in &state.target_files {
        let marker = if state.flagged_files.contains(file) { " [sensitive]" } else { "" };
        println!("  {file}{marker}");
    }
    for warning in &state.warnings {
        println!("Warning: {warning}");
    }
    for err in &state.planning_errors {
        println!("Planning error: {err}");
    }
    if !state.scan_results.is_empty() {
        let failed = state
            .scan_results
            .iter()
            .filter(|r| r.details.is_failure())
            .count();
        println!(
            "\nResults: {} recorded, {} failed",
            state.scan_results.len(),
            failed
        );
    }
    if state.phase == Phase::AwaitingApproval {
        println!("\nWaiting for a decision: repoguard resume {} --decision approve|filter-secrets|cancel", state.run_id);
    }
    Ok(())
}

async fn cmd_runs(config: ScanConfig, workdir: &Path) -> anyhow::Result<()> {
    let engine = Engine::new(config, workdir)?;
    let runs = engine.runs().await?;
    if runs.is_empty() {
        println!("No runs found in {}", engine.store().dir().display());
        return Ok(());
    }
    for state in runs {
        println!(
            "{}  {:<18} {}  {}",
            state.run_id,
            state.phase.as_str(),
            state.created_at.format("%Y-%m-%d %H:%M"),
            state.user_input
        );
    }
    Ok(())
}

/// Print progress until the engine (and with it the event sender) is dropped.
fn spawn_event_printer(engine: &Engine) -> tokio::task::JoinHandle<()> {
    let mut rx = engine.events().subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Progress output fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::TargetsResolved {
            count,
            truncated_from,
            ..
        } => match truncated_from {
            Some(total) => println!("  resolved {count} of {total} files (capped)"),
            None => println!("  resolved {count} files"),
        },
        PipelineEvent::RiskAssessed { level, flagged, .. } => {
            if let Some(level) = level {
                println!("  risk: {level:?} ({flagged} sensitive)");
            }
        }
        PipelineEvent::AnalyzerCompleted {
            file, tool, issues, ..
        } => println!("  [{tool}] {file}: {issues} issue(s)"),
        PipelineEvent::AnalyzerFailed {
            file, tool, error, ..
        } => println!("  [{tool}] {file}: FAILED ({error})"),
        _ => {}
    }
}

fn finish(outcome: RunOutcome) -> anyhow::Result<()> {
    let run_id = outcome.run_id().to_string();
    match outcome.status {
        RunStatus::Completed {
            report_path,
            summary,
        } => {
            println!("\nScan complete (run {run_id})");
            println!(
                "Files: {}  Issues: {}  Tool runs: {}  Failures: {}",
                summary.total_files_scanned,
                summary.total_issues_found,
                summary.tools_executed,
                summary.tool_failures
            );
            println!("Report: {}", report_path.display());
        }
        RunStatus::AwaitingApproval(request) => {
            println!("\nRun {run_id} is waiting for approval.");
            if let Some(reason) = &request.risk_reason {
                println!("Risk: {reason}");
            }
            println!("Resume with: repoguard resume {run_id} --decision approve|filter-secrets|cancel");
        }
        RunStatus::Cancelled => {
            println!("\nRun {run_id} cancelled. No report was written.");
        }
        RunStatus::Halted { reason } => {
            eprintln!("\nRun {run_id} halted: {reason}");
            for err in &outcome.state.planning_errors {
                eprintln!("  {err}");
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
