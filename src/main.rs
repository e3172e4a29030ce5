mod console;
mod reviews;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use devflow_agent::trace::TRACE_FILE;
use devflow_agent::{
    CheckpointStore, ExecutionTrace, LocalApprover, RemoteApprover, ReviewBroker, RunSnapshot,
    WorkflowEngine,
};
use devflow_core::config::{AppConfig, ApprovalMode};
use devflow_core::error::DevflowError;
use devflow_core::event::EventBus;
use devflow_core::state::WorkflowState;
use devflow_core::traits::TextGenerator;
use devflow_core::types::RunId;
use devflow_gateway::{GatewayServer, SharedTrace};
use devflow_steps::{apply_gates, builtin_registry, ArtifactWriter, Pipeline};

use console::ConsoleDecisionSource;
use reviews::ReviewClient;

#[derive(Parser)]
#[command(name = "devflow", version, about = "LLM-driven software delivery pipeline")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "devflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline from the requirements step
    Run {
        /// Project name (prompted for if omitted)
        #[arg(short, long)]
        name: Option<String>,
        /// Requirements text
        #[arg(short, long, conflicts_with = "requirements_file")]
        requirements: Option<String>,
        /// Read the requirements from a file
        #[arg(long)]
        requirements_file: Option<PathBuf>,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Continue a checkpointed run
    Resume {
        /// Run to resume (defaults to the most recent checkpoint)
        #[arg(long)]
        run_id: Option<String>,
        /// List saved checkpoints instead of resuming
        #[arg(long)]
        list: bool,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Print the pipeline graph
    Graph {
        #[arg(long, default_value = "sdlc")]
        pipeline: Pipeline,
        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,
    },
    /// Inspect and answer reviews pending on a running gateway
    Reviews {
        #[command(subcommand)]
        action: Option<ReviewAction>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args)]
struct RunOpts {
    /// sdlc (review loops) or linear
    #[arg(long, default_value = "sdlc")]
    pipeline: Pipeline,
    /// Override the configured approval mode (auto, local, remote)
    #[arg(long)]
    approval: Option<ApprovalMode>,
}

#[derive(Subcommand)]
enum ReviewAction {
    /// List pending reviews
    List,
    /// Approve a review
    Approve {
        /// Review id or id prefix
        id: String,
    },
    /// Send a review back for revision
    Reject {
        /// Review id or id prefix
        id: String,
    },
    /// Submit a revised artifact for a review sent back for revision
    Revise {
        /// Review id or id prefix
        id: String,
        /// File holding the revised artifact
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Mermaid,
    Json,
}

/// How a pipeline invocation begins.
enum Start {
    Fresh(WorkflowState),
    Resume(RunSnapshot),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("devflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "devflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config");
        AppConfig::load(&cli.config)?
    } else {
        warn!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };

    match cli.command {
        Commands::Run {
            name,
            requirements,
            requirements_file,
            opts,
        } => {
            let requirements = match requirements_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => requirements,
            };
            let (name, requirements) = match (name, requirements) {
                (Some(name), Some(req)) => (name, req),
                (name, Some(req)) => (name.unwrap_or_else(|| "project".to_string()), req),
                (name, None) => {
                    let (asked_name, req) =
                        console::ask_project(name.as_deref().unwrap_or("project"))?;
                    (name.unwrap_or(asked_name), req)
                }
            };
            if requirements.trim().is_empty() {
                bail!("requirements must not be empty");
            }
            let initial = WorkflowState::new(name).with_requirements_input(requirements);
            execute(&config, &opts, Start::Fresh(initial)).await?;
        }
        Commands::Resume { run_id, list, opts } => {
            let store = CheckpointStore::open(&config.checkpoint_path())?;
            if list {
                let saved = store.list()?;
                if saved.is_empty() {
                    println!("No saved runs.");
                }
                for info in saved {
                    println!(
                        "{}  {:<24} {:>3} steps  {}",
                        info.run_id,
                        info.current_step,
                        info.completed_steps,
                        info.saved_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
                return Ok(());
            }
            let snapshot = match &run_id {
                Some(id) => store.load(id)?,
                None => store.load_latest()?,
            };
            let Some(snapshot) = snapshot else {
                bail!("no checkpoint found at {}", config.checkpoint_path().display());
            };
            if snapshot.finished {
                println!("Run {} already finished.", snapshot.run_id);
                return Ok(());
            }
            execute(&config, &opts, Start::Resume(snapshot)).await?;
        }
        Commands::Graph { pipeline, format } => {
            let registry = builtin_registry(generator(&config), ArtifactWriter::new(config.output_dir()));
            let description = pipeline.build(&registry)?.describe();
            match format {
                GraphFormat::Mermaid => print!("{}", description.to_mermaid()),
                GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&description)?),
            }
        }
        Commands::Reviews { action } => {
            let client = ReviewClient::new(&config.gateway);
            match action.unwrap_or(ReviewAction::List) {
                ReviewAction::List => {
                    let pending = client.list().await?;
                    if pending.is_empty() {
                        println!("No pending reviews.");
                    }
                    for review in &pending {
                        println!("{}", reviews::format_review(review));
                    }
                }
                ReviewAction::Approve { id } => {
                    client.decide(&id, "Approved").await?;
                    println!("Approved {}", id);
                }
                ReviewAction::Reject { id } => {
                    client.decide(&id, "Needs Revision").await?;
                    println!("Sent {} back for revision", id);
                }
                ReviewAction::Revise { id, file } => {
                    let revised = std::fs::read_to_string(&file)
                        .with_context(|| format!("reading {}", file.display()))?;
                    client.revise(&id, &revised).await?;
                    println!("Revision submitted for {}", id);
                }
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn generator(config: &AppConfig) -> Arc<dyn TextGenerator> {
    Arc::new(devflow_llm::create_generator(config))
}

/// Build the pipeline for `config` and drive one run to completion,
/// checkpointing after every step.
async fn execute(config: &AppConfig, opts: &RunOpts, start: Start) -> anyhow::Result<()> {
    let output_dir = config.output_dir();
    std::fs::create_dir_all(&output_dir)?;

    let event_bus = Arc::new(EventBus::default());
    let broker = Arc::new(ReviewBroker::new().with_event_bus(event_bus.clone()));
    let mode = opts.approval.unwrap_or(config.approval.mode);
    let max_visits = config.engine.max_step_visits;

    let mut registry = builtin_registry(generator(config), ArtifactWriter::new(&output_dir));
    match mode {
        ApprovalMode::Auto => {}
        ApprovalMode::Local => {
            let approver = LocalApprover::new(Arc::new(ConsoleDecisionSource))
                .with_timeout(config.approval.timeout());
            apply_gates(&mut registry, &config.approval.gated_steps, Arc::new(approver), max_visits)?;
        }
        ApprovalMode::Remote => {
            let approver =
                RemoteApprover::new(broker.clone()).with_timeout(config.approval.timeout());
            apply_gates(&mut registry, &config.approval.gated_steps, Arc::new(approver), max_visits)?;
        }
    }

    let graph = opts.pipeline.build(&registry)?;
    let description = graph.describe();
    let engine = WorkflowEngine::new(graph)
        .with_max_step_visits(max_visits)
        .with_event_bus(event_bus.clone());

    let checkpoints = if config.checkpoint.enabled {
        Some(CheckpointStore::open(&config.checkpoint_path())?)
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel_clone.cancel();
    });

    let trace: SharedTrace = Arc::new(RwLock::new(ExecutionTrace::new()));
    let gateway_cancel = cancel.child_token();
    let gateway = if mode == ApprovalMode::Remote {
        let server = GatewayServer::new(
            config.gateway.clone(),
            broker.clone(),
            description,
            trace.clone(),
        );
        let token = gateway_cancel.clone();
        eprintln!(
            "Reviews are served at http://{}/api/reviews",
            config.gateway.bind
        );
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(token).await {
                error!(error = %e, "Gateway failed");
            }
        }))
    } else {
        None
    };

    let mut rx = event_bus.subscribe();
    let printer_done = CancellationToken::new();
    let done = printer_done.clone();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Ok(event) => console::print_event(&event),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = done.cancelled() => {
                    while let Ok(event) = rx.try_recv() {
                        console::print_event(&event);
                    }
                    break;
                }
            }
        }
    });

    let mut run = match start {
        Start::Fresh(initial) => engine.start_with(initial, RunId::new(), cancel.clone()),
        Start::Resume(snapshot) => {
            *trace.write().await = snapshot.trace.clone();
            engine.resume(snapshot, cancel.clone())?
        }
    };

    let result = loop {
        match run.advance().await {
            Ok(Some(_)) => {
                *trace.write().await = run.trace().clone();
                save_checkpoint(checkpoints.as_ref(), &run.snapshot());
            }
            Ok(None) => break Ok(()),
            Err(e) => {
                save_checkpoint(checkpoints.as_ref(), &run.snapshot());
                break Err(e);
            }
        }
    };

    let history = match run.trace().export(&output_dir) {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, dir = %output_dir.display(), "Failed to save execution history");
            output_dir.join(TRACE_FILE)
        }
    };

    printer_done.cancel();
    printer.await.ok();
    gateway_cancel.cancel();
    if let Some(handle) = gateway {
        handle.await.ok();
    }

    match result {
        Ok(()) => {
            if let Some(store) = &checkpoints {
                store.delete(&run.run_id().0)?;
            }
            print_summary(run.state(), &output_dir, &history);
            Ok(())
        }
        Err(e) => Err(run_failure(e, run.run_id(), run.current_step(), checkpoints.is_some())),
    }
}

/// Report an unfinished run. Every outcome other than completion, Ctrl-C
/// included, exits non-zero.
fn run_failure(err: DevflowError, run_id: &RunId, step: &str, resumable: bool) -> anyhow::Error {
    let headline = match &err {
        DevflowError::Cancelled => format!("run {} cancelled at {}", run_id, step),
        _ => {
            error!(run_id = %run_id, step = %step, error = %err, "Run failed");
            format!("run {} failed at {}", run_id, step)
        }
    };
    if resumable {
        eprintln!("Resume with: devflow resume --run-id {}", run_id);
    }
    anyhow::Error::from(err).context(headline)
}

fn save_checkpoint(store: Option<&CheckpointStore>, snapshot: &RunSnapshot) {
    if let Some(store) = store {
        if let Err(e) = store.save(snapshot) {
            warn!(error = %e, "Failed to save checkpoint");
        }
    }
}

fn print_summary(state: &WorkflowState, output_dir: &Path, history: &Path) {
    println!();
    println!(
        "Project: {}",
        state.project_name.as_deref().unwrap_or("(unnamed)")
    );
    for (label, value) in [
        ("User stories", &state.review_status),
        ("Design", &state.design_review_status),
        ("Code review", &state.code_review_status),
        ("Security", &state.security_review_status),
        ("Test cases", &state.test_review_status),
        ("QA", &state.qa_status),
        ("Deployment", &state.deployment_status),
    ] {
        if let Some(value) = value {
            println!("  {:<13} {}", label, value);
        }
    }
    println!("Artifacts: {}", output_dir.display());
    println!("History:   {}", history.display());
}
