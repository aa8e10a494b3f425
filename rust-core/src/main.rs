//! Trace Walk Engine
//!
//! Command line front end for the walk tracking kernel: replay recorded tick
//! traces and inspect or reset the persisted daily record.
//!
//! This is the entry point for standalone binaries. For library use, see lib.rs.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trace_walk::persistence::{LocalClock, MemoryStore};
use trace_walk::{EngineConfig, PersistenceStore, TickInput, WalkEngine};

#[derive(Parser)]
#[command(name = "trace-walk")]
#[command(version)]
#[command(about = "GPS + AR walk tracker: distance fusion, steps and milestones", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to engine configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the persisted daily record
    #[arg(short, long, global = true, default_value = "walk_record.json")]
    record: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a recorded trace (one JSON tick per line) through the engine
    Replay {
        /// Trace file in JSON lines format
        trace: PathBuf,

        /// Keep the record in memory instead of touching the record file
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the persisted record as stored
    Show,

    /// Zero today's totals and save
    Reset,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { trace, dry_run } => {
            let store = if dry_run {
                PersistenceStore::new(Box::new(MemoryStore::new()), Box::new(LocalClock))
            } else {
                PersistenceStore::json_file(&cli.record)
            };
            replay(config, store, &trace)
        }
        Commands::Show => show(&cli.record),
        Commands::Reset => {
            let mut engine = WalkEngine::new(config, PersistenceStore::json_file(&cli.record))
                .context("failed to start walk engine")?;
            engine
                .reset_all()
                .with_context(|| format!("failed to save reset record to {}", cli.record.display()))?;
            println!("record reset for {}", engine.session_date());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_json(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn replay(config: EngineConfig, store: PersistenceStore, trace: &Path) -> Result<()> {
    let file = File::open(trace).with_context(|| format!("failed to open trace {}", trace.display()))?;
    let mut engine = WalkEngine::new(config, store).context("failed to start walk engine")?;

    let mut steps_seen = 0u64;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", index + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input: TickInput = serde_json::from_str(line)
            .with_context(|| format!("malformed tick on line {}", index + 1))?;
        let report = engine.tick(&input);

        if report.step.is_some() {
            steps_seen += 1;
        }
        for milestone in &report.milestones {
            println!(
                "[{:>8} ms] milestone {:?} #{}",
                milestone.timestamp_ms, milestone.kind, milestone.rung
            );
        }
        if report.day_rolled_over {
            println!("[{:>8} ms] new day, counters reset", input.now_ms);
        }
    }

    engine.shutdown().context("failed to save final totals")?;
    info!(ticks = engine.tick_count(), steps_seen, "replay finished");

    let snapshot = engine.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn show(record: &Path) -> Result<()> {
    let store = PersistenceStore::json_file(record);
    match store
        .peek()
        .with_context(|| format!("failed to read record {}", record.display()))?
    {
        Some(stored) => println!("{}", serde_json::to_string_pretty(&stored)?),
        None => println!("no record at {}", record.display()),
    }
    Ok(())
}
