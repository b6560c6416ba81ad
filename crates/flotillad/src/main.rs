//! flotillad — the fleet autoscaler daemon.
//!
//! Polls the scheduler master, the cloud inventory, and the workflow
//! engine's pending-task queue on a fixed interval, decides launch and
//! drain/terminate actions, and executes them. `check-config` validates
//! a config file and prints the resolved settings without touching the
//! network.

mod http;
mod reconcile;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flotilla_catalog::InstanceCatalog;
use flotilla_state::Config;

use crate::http::{HttpCloudProvider, HttpSchedulerMaster, HttpTaskSource};
use crate::reconcile::ReconcileLoop;

#[derive(Parser)]
#[command(name = "flotillad", version, about = "Fleet autoscaler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconcile loop until interrupted.
    Run {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,
        /// Scheduler master base URL, e.g. http://master:5050.
        #[arg(long)]
        master_url: String,
        /// Cloud gateway base URL.
        #[arg(long)]
        cloud_url: String,
        /// Workflow engine base URL.
        #[arg(long)]
        tasks_url: String,
        /// Override the configured poll interval, e.g. "10s".
        #[arg(long)]
        poll_interval: Option<String>,
    },
    /// Validate a config file and print the resolved settings.
    CheckConfig {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            master_url,
            cloud_url,
            tasks_url,
            poll_interval,
        } => run(&config, master_url, cloud_url, tasks_url, poll_interval).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

async fn run(
    config_path: &Path,
    master_url: String,
    cloud_url: String,
    tasks_url: String,
    poll_interval: Option<String>,
) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(interval) = poll_interval {
        config.poll_interval = interval;
        config.validate().context("applying --poll-interval")?;
    }
    let catalog = InstanceCatalog::new(config.instances.clone())
        .context("building instance catalog")?;
    info!(
        types = catalog.len(),
        launch_enabled = config.launch_enabled,
        terminate_enabled = config.terminate_enabled,
        "configuration loaded"
    );

    // Per-request bound on every collaborator call, mutations included.
    let request_timeout = config.poll_timeout();
    let scheduler = Arc::new(
        HttpSchedulerMaster::new(master_url, request_timeout)
            .context("building scheduler master client")?,
    );
    let cloud = Arc::new(
        HttpCloudProvider::new(cloud_url, request_timeout)
            .context("building cloud gateway client")?,
    );
    let tasks = Arc::new(
        HttpTaskSource::new(tasks_url, request_timeout)
            .context("building task source client")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconcile = ReconcileLoop::new(config, catalog, scheduler, cloud, tasks);
    let handle = tokio::spawn(reconcile.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    handle.await.context("joining reconcile loop")?;
    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config =
        Config::load(path).with_context(|| format!("loading {}", path.display()))?;
    let catalog = InstanceCatalog::new(config.instances.clone())
        .context("building instance catalog")?;

    println!("{}: OK", path.display());
    println!("  poll interval      {:?}", config.poll_interval());
    println!("  poll timeout       {:?}", config.poll_timeout());
    println!("  drain wait         {:?}", config.effective_wait_timeout());
    println!("  terminate wait     {:?}", config.terminate_wait());
    println!("  max instance age   {:?}", config.max_instance_age());
    println!("  default arch       {}", config.default_architecture);
    println!("  launch enabled     {}", config.launch_enabled);
    println!("  terminate enabled  {}", config.terminate_enabled);
    println!(
        "  fallback type      {}",
        config.fallback_instance_type.as_deref().unwrap_or("(none)")
    );
    println!("  allow-list ({} types):", catalog.len());
    for entry in catalog.entries() {
        println!(
            "    {:<14} {:>5.1} cpus {:>9.1} MiB  {}",
            entry.name, entry.cpus, entry.mem, entry.arch
        );
    }
    Ok(())
}
