//! Whitebox monitoring server.
//!
//! Opens the store, registers the built-in pipelines and runs the cron
//! scheduler until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use whitebox_core::WhiteboxConfig;
use whitebox_scheduler::{EngineOptions, RunOutcome, SchedulerEngine};
use whitebox_store::Store;

mod pipelines;
mod tasks;

#[derive(Parser)]
#[command(name = "whitebox-server")]
#[command(about = "Scheduled metrics and alerts for monitored ML models")]
#[command(version)]
struct Cli {
    /// Path to whitebox.toml (else WHITEBOX_CONFIG, else ~/.whitebox/whitebox.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted (default)
    Serve,
    /// Run one registered task immediately and exit
    RunTask {
        /// Task name, e.g. metrics_cron
        name: String,
    },
    /// Print registered tasks with their schedules and next run
    ListTasks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "whitebox_server=info,whitebox_scheduler=info,whitebox_store=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > WHITEBOX_CONFIG env > ~/.whitebox/whitebox.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("WHITEBOX_CONFIG").ok());
    let config = WhiteboxConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        WhiteboxConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    let store = Arc::new(
        Store::open(
            db_path,
            Duration::from_millis(config.database.busy_timeout_ms),
        )
        .with_context(|| format!("opening database {db_path}"))?,
    );

    let registry = tasks::build_registry(Arc::clone(&store), &config)?;
    let options = EngineOptions {
        tick_interval: Duration::from_millis(config.scheduler.tick_interval_ms.max(1)),
        task_timeout: Duration::from_secs(config.scheduler.task_timeout_secs),
        ..EngineOptions::default()
    };
    let engine = SchedulerEngine::new(registry, options, chrono::Utc::now());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(engine).await,
        Command::RunTask { name } => run_once(&engine, &name).await,
        Command::ListTasks => {
            for name in engine.task_names() {
                let next = engine
                    .next_run(name)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("{name}\tnext run {next}");
            }
            Ok(())
        }
    }
}

async fn serve(engine: SchedulerEngine) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown_rx));
    info!("Whitebox scheduler running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    // signal scheduler to stop, then let in-flight runs finish
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

async fn run_once(engine: &SchedulerEngine, name: &str) -> anyhow::Result<()> {
    let Some(handle) = engine.trigger(name)? else {
        bail!("task {name} is already running");
    };
    match handle.await? {
        RunOutcome::Completed => Ok(()),
        outcome => bail!("task {name} finished with {outcome}"),
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
