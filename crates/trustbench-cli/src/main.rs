//! trustbench - trust model evaluation runs from the command line.
//!
//! ## Commands
//!
//! - `run`: evaluate one seed and export the finished log
//! - `batch`: evaluate a seed range concurrently, reporting per-run
//!   progress and exporting every finished log
//!
//! Ctrl-C requests cooperative cancellation; runs resolve `Interrupted`
//! at their next tick boundary.

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use trustbench_core::{
    save_csv, save_json, EvaluationLog, EvaluationState, EvaluationTask, SyntheticProtocol,
};
use trustbench_exec::{BatchExecutor, SingleRunExecutor, WorkerPool};

#[derive(Parser)]
#[command(name = "trustbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trust model evaluation testbed", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single evaluation and export the finished log
    Run {
        /// Seed for the run (also names the exported file)
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Run length in ticks
        #[arg(long, default_value_t = 500)]
        duration: u32,

        /// Number of agents in the synthetic scenario
        #[arg(long, default_value_t = 100)]
        agents: usize,

        /// Export format for finished logs
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Directory the exported log is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Also export the partial log of an interrupted run
        #[arg(long)]
        keep_partial: bool,
    },

    /// Run one evaluation per seed in a range, concurrently
    Batch {
        /// First seed of the range (inclusive)
        #[arg(long, default_value_t = 1)]
        start_seed: u64,

        /// Last seed of the range (inclusive)
        #[arg(long, default_value_t = 30)]
        stop_seed: u64,

        /// Run length in ticks
        #[arg(long, default_value_t = 500)]
        duration: u32,

        /// Number of agents in the synthetic scenario
        #[arg(long, default_value_t = 100)]
        agents: usize,

        /// Concurrent workers (default: available parallelism)
        #[arg(long)]
        workers: Option<usize>,

        /// Export format for finished logs
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Directory exported logs are written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Also export partial logs of interrupted runs
        #[arg(long)]
        keep_partial: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

/// Set up the global tracing subscriber. `RUST_LOG` wins over `level`
/// when set; repeated calls are ignored.
fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            seed,
            duration,
            agents,
            format,
            output_dir,
            keep_partial,
        } => cmd_run(seed, duration, agents, format, &output_dir, keep_partial).await,
        Commands::Batch {
            start_seed,
            stop_seed,
            duration,
            agents,
            workers,
            format,
            output_dir,
            keep_partial,
        } => {
            cmd_batch(
                start_seed,
                stop_seed,
                duration,
                agents,
                workers,
                format,
                &output_dir,
                keep_partial,
            )
            .await
        }
    }
}

async fn cmd_run(
    seed: u64,
    duration: u32,
    agents: usize,
    format: ExportFormat,
    output_dir: &Path,
    keep_partial: bool,
) -> Result<()> {
    ensure!(duration >= 1, "--duration must be at least one tick");
    ensure!(agents >= 1, "--agents must be at least one");

    let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
    let task = new_task(seed, duration, agents);

    info!(seed, duration, agents, "starting evaluation");
    let handle = executor.submit(task);

    let cancel = handle.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt requested, stopping at the next tick");
            cancel.cancel();
        }
    });

    let state = handle.wait().await;
    let faulted = report_outcome(&state, format, output_dir, keep_partial)?;
    ensure!(!faulted, "evaluation run faulted");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_batch(
    start_seed: u64,
    stop_seed: u64,
    duration: u32,
    agents: usize,
    workers: Option<usize>,
    format: ExportFormat,
    output_dir: &Path,
    keep_partial: bool,
) -> Result<()> {
    ensure!(duration >= 1, "--duration must be at least one tick");
    ensure!(agents >= 1, "--agents must be at least one");
    ensure!(
        start_seed <= stop_seed,
        "--start-seed must not exceed --stop-seed"
    );

    let pool = match workers {
        Some(capacity) => {
            ensure!(capacity >= 1, "--workers must be at least one");
            Arc::new(WorkerPool::new(capacity))
        }
        None => Arc::new(WorkerPool::with_hardware_parallelism()),
    };

    let runs = stop_seed - start_seed + 1;
    info!(runs, workers = pool.capacity(), duration, "starting batch");

    // fresh protocol instance per seed: steppers carry mutable simulation
    // state and must not be shared across tasks
    let tasks: Vec<EvaluationTask> = (start_seed..=stop_seed)
        .map(|seed| new_task(seed, duration, agents))
        .collect();

    let executor = BatchExecutor::new(pool);
    let handle = executor.run_batch(tasks, log_progress, |_| {});

    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt requested, stopping all runs at their next tick");
            canceller.cancel_all();
        }
    });

    let results = handle.join().await;

    let mut completed = 0usize;
    let mut interrupted = 0usize;
    let mut faulted = 0usize;
    for state in &results {
        if report_outcome(state, format, output_dir, keep_partial)? {
            faulted += 1;
        } else if matches!(state, EvaluationState::Interrupted { .. }) {
            interrupted += 1;
        } else {
            completed += 1;
        }
    }

    info!(completed, interrupted, faulted, "batch finished");
    ensure!(faulted == 0, "{faulted} of {runs} runs faulted");
    Ok(())
}

fn new_task(seed: u64, duration: u32, agents: usize) -> EvaluationTask {
    EvaluationTask::new(
        Box::new(SyntheticProtocol::new(seed, agents)),
        duration,
        SyntheticProtocol::metrics(),
        seed,
    )
}

/// Log one resolved run as it arrives.
fn log_progress(state: EvaluationState) {
    match &state {
        EvaluationState::Completed { log } => info!(seed = log.seed(), "completed run"),
        EvaluationState::Interrupted { tick, log } => {
            warn!(seed = log.seed(), tick = *tick, "interrupted run")
        }
        EvaluationState::Faulted { tick, error } => {
            warn!(tick = ?tick, %error, "faulted run")
        }
        EvaluationState::Idle | EvaluationState::Running => {
            unreachable!("progress delivered a non-terminal state")
        }
    }
}

/// Report one terminal state and export its log. Returns whether the run
/// faulted.
fn report_outcome(
    state: &EvaluationState,
    format: ExportFormat,
    output_dir: &Path,
    keep_partial: bool,
) -> Result<bool> {
    match state {
        EvaluationState::Completed { log } => {
            let path = export(log, format, output_dir)?;
            info!(seed = log.seed(), path = %path.display(), "run completed");
            Ok(false)
        }
        EvaluationState::Interrupted { tick, log } => {
            warn!(seed = log.seed(), tick = *tick, "run interrupted");
            if keep_partial && !log.is_empty() {
                let path = export(log, format, output_dir)?;
                info!(seed = log.seed(), path = %path.display(), "partial log kept");
            }
            Ok(false)
        }
        EvaluationState::Faulted { tick, error } => {
            error!(tick = ?tick, %error, "run faulted");
            Ok(true)
        }
        EvaluationState::Idle | EvaluationState::Running => {
            unreachable!("executor delivered a non-terminal state")
        }
    }
}

fn export(log: &EvaluationLog, format: ExportFormat, output_dir: &Path) -> Result<PathBuf> {
    let path = match format {
        ExportFormat::Csv => save_csv(log, output_dir),
        ExportFormat::Json => save_json(log, output_dir),
    }
    .with_context(|| format!("failed to export log for seed {}", log.seed()))?;
    Ok(path)
}
