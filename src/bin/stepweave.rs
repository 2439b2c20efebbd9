//! stepweave: closed-loop state evolution engine
//!
//! Usage:
//!   stepweave run --cycles 100 --relations seeds.json   → run cycles
//!   stepweave run --checkpoint state.json               → resume and save
//!   stepweave dump-config > stepweave.toml              → print defaults
//!   stepweave verify-journal ticks.jsonl                → check integrity
//!   stepweave version                                   → show version

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stepweave::core::StepweaveConfig;
use stepweave::watcher::WatcherSnapshot;
use stepweave::{initial_vector, load_relation_seeds, load_ticks, Engine};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "stepweave",
    about = "Closed-loop stepwise state evolution over a decaying relation graph",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run search-and-commit cycles
    Run(RunArgs),
    /// Print the default configuration as TOML
    DumpConfig,
    /// Ingest a tick file and report journal entries that fail verification
    VerifyJournal {
        /// JSON-lines tick file
        ticks: PathBuf,
        /// Path to config file (TOML)
        #[arg(long, default_value = "stepweave.toml")]
        config: PathBuf,
        /// Previously exported journal entries to verify as well
        #[arg(long)]
        entries: Option<PathBuf>,
    },
    /// Show version
    Version,
}

#[derive(Args)]
struct RunArgs {
    /// Path to config file (TOML); defaults are used if missing
    #[arg(short, long, default_value = "stepweave.toml")]
    config: PathBuf,

    /// Number of cycles to run
    #[arg(short = 'n', long, default_value_t = 10)]
    cycles: u64,

    /// JSON array of relation seeds registered before the first cycle
    #[arg(short, long)]
    relations: Option<PathBuf>,

    /// JSON-lines tick file ingested before the first cycle
    #[arg(short, long)]
    ticks: Option<PathBuf>,

    /// Agent checkpoint: restored if present, written after the last cycle
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Watcher snapshot: restored if present, written after the last cycle
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Export the journal ring buffer here after the last cycle
    #[arg(long)]
    export_journal: Option<PathBuf>,

    /// State dimension
    #[arg(short, long, default_value_t = 8)]
    dim: usize,

    /// Milliseconds between cycles (0 = back-to-back)
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let _guard = init_tracing(cli.log_file.as_deref())?;
            run(args).await?;
        }

        Commands::DumpConfig => {
            print!("{}", StepweaveConfig::default().to_toml());
        }

        Commands::VerifyJournal {
            ticks,
            config,
            entries,
        } => {
            let _guard = init_tracing(cli.log_file.as_deref())?;
            verify_journal(&ticks, &config, entries.as_deref())?;
        }

        Commands::Version => {
            println!("stepweave v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("--log-file must name a file")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepweave=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = StepweaveConfig::load(&args.config);

    let snapshot = match &args.snapshot {
        Some(path) if path.exists() => Some(
            WatcherSnapshot::load(path)
                .with_context(|| format!("loading snapshot {}", path.display()))?,
        ),
        _ => None,
    };
    let mut engine = Engine::with_snapshot(config, initial_vector(args.dim)?, snapshot)?;

    if let Some(path) = &args.checkpoint {
        if path.exists() {
            engine
                .restore_checkpoint(path)
                .with_context(|| format!("restoring checkpoint {}", path.display()))?;
        }
    }
    if let Some(path) = &args.relations {
        engine.register_seeds(load_relation_seeds(path)?);
    }
    if let Some(path) = &args.ticks {
        engine.ingest_ticks(&load_ticks(path)?);
    }

    let mut interval = (args.interval_ms > 0)
        .then(|| tokio::time::interval(Duration::from_millis(args.interval_ms)));

    for _ in 0..args.cycles {
        if let Some(interval) = interval.as_mut() {
            tokio::select! {
                _ = interval.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupted, stopping early");
                    break;
                }
            }
        }
        let report = engine.run_cycle()?;
        info!(
            "cycle {}: {} candidate(s), depth {}, score {:.4}, feasible {}{}",
            report.cycle,
            report.candidates,
            report.depth,
            report.best_score,
            report.feasible,
            if report.fallback { ", fallback" } else { "" }
        );
    }

    if let Some(path) = &args.checkpoint {
        engine.save_checkpoint(path)?;
    }
    if let Some(path) = &args.snapshot {
        engine.save_snapshot(path)?;
    }
    if let Some(path) = &args.export_journal {
        engine.export_journal(path)?;
    }

    println!("{}", serde_json::to_string_pretty(&engine.summary())?);
    Ok(())
}

fn verify_journal(ticks: &Path, config: &Path, entries: Option<&Path>) -> anyhow::Result<()> {
    let config = StepweaveConfig::load(config);
    let engine = Engine::new(config, initial_vector(2)?)?;
    let summary = engine.ingest_ticks(&load_ticks(ticks)?);
    println!(
        "{} accepted, {} rejected, {} truncated",
        summary.accepted, summary.rejected, summary.truncated
    );

    let mut bad = engine.kernel().verify_entries();
    if let Some(path) = entries {
        bad.extend(engine.import_journal(path)?);
    }
    if bad.is_empty() {
        println!("journal ok: {} entries", engine.kernel().journal_stats().entries);
        return Ok(());
    }
    for id in &bad {
        println!("corrupted: sequence {}", id);
    }
    anyhow::bail!("{} journal entries failed verification", bad.len())
}
