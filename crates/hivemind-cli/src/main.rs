//! Hivemind CLI - cluster coordination tooling.
//!
//! Single binary that provides:
//! - `hivemind init` - write a default hivemind.yaml
//! - `hivemind roles` - show the configured role list
//! - `hivemind simulate` - run a full cluster session on an in-memory bus

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use hivemind_core::{
    start_cluster, AssignmentOutcome, ClusterConfig, EchoHandler, MemoryHub, Worker,
};
use hivemind_proto::{NodeId, RoleDefinition};

#[derive(Parser)]
#[command(name = "hivemind")]
#[command(about = "Cluster coordination for the Hivemind agent platform", version)]
struct Cli {
    /// Project root directory
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default hivemind.yaml
    Init,

    /// Show the configured roles in offer order
    Roles,

    /// Run a cluster session against simulated workers
    Simulate {
        /// Number of simulated worker nodes
        #[arg(long, default_value = "3")]
        workers: u64,

        /// Frame drop probability in [0, 1]
        #[arg(long, default_value = "0.0")]
        loss: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let project_root = cli
        .project
        .map(Ok)
        .unwrap_or_else(|| std::env::current_dir().context("Failed to get current directory"))?;

    match cli.command {
        Commands::Init => init_project(&project_root),
        Commands::Roles => show_roles(&project_root),
        Commands::Simulate { workers, loss } => simulate(&project_root, workers, loss).await,
    }
}

fn init_project(project_root: &std::path::Path) -> Result<()> {
    let config_path = project_root.join("hivemind.yaml");
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    let mut config = ClusterConfig::default();
    config.roles = vec![
        RoleDefinition::new("memory"),
        RoleDefinition::new("generation"),
        RoleDefinition::new("mood"),
    ];

    let yaml = serde_yaml::to_string(&config).context("Failed to serialize default config")?;
    std::fs::write(&config_path, yaml)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Wrote {}", config_path.display());
    Ok(())
}

fn show_roles(project_root: &std::path::Path) -> Result<()> {
    let config = ClusterConfig::load_from_project(project_root)?;
    if config.roles.is_empty() {
        println!("No roles configured (run `hivemind init`)");
        return Ok(());
    }

    println!("Configured roles (offer order):");
    for (index, role) in config.roles.iter().enumerate() {
        let description = if role.description.is_empty() {
            "-"
        } else {
            role.description.as_str()
        };
        println!("  {}. {:<12} {}", index + 1, role.name, description);
    }
    Ok(())
}

async fn simulate(project_root: &std::path::Path, workers: u64, loss: f64) -> Result<()> {
    let mut config = ClusterConfig::load_from_project(project_root)?;
    if config.roles.is_empty() {
        config.roles = vec![
            RoleDefinition::new("memory"),
            RoleDefinition::new("generation"),
            RoleDefinition::new("mood"),
        ];
    }
    // The in-memory bus delivers instantly; the field-deployment windows
    // would just make the simulation sit idle.
    config.discovery_window_ms = 1_000;
    config.settle_delay_ms = 100;
    config.assign_attempt_timeout_ms = 500;

    let hub = MemoryHub::new();
    hub.set_loss(loss);
    for id in 1..=workers {
        let mut worker = Worker::new(Arc::new(hub.endpoint(NodeId(id))))
            .with_poll(Duration::from_millis(50));
        for role in &config.roles {
            worker = worker.with_handler(role.name.as_str(), Arc::new(EchoHandler));
        }
        tokio::spawn(worker.run());
    }

    info!(workers, loss, "starting simulated cluster");
    let bus = Arc::new(hub.endpoint(NodeId(0)));
    let cluster = start_cluster(bus, config, Some(b"simulated bootstrap".to_vec())).await?;

    let status = cluster.status();
    println!();
    println!(
        "Session {} - {}/{} roles ready{}",
        status.session,
        status.ready_count(),
        status.roles.len(),
        if status.is_degraded() { " (degraded)" } else { "" }
    );
    for role_status in &status.roles {
        let state = match &role_status.outcome {
            AssignmentOutcome::Ready(node) => format!("ready on {node}"),
            AssignmentOutcome::NoWorker => "no worker".to_string(),
            AssignmentOutcome::Down(reason) => format!("down ({reason})"),
        };
        println!("  {:<12} {}", role_status.role, state);
    }

    println!();
    for role_status in &status.roles {
        if !matches!(role_status.outcome, AssignmentOutcome::Ready(_)) {
            continue;
        }
        match cluster
            .call(
                &role_status.role,
                "ping",
                json!({}),
                Some(Duration::from_secs(2)),
            )
            .await
        {
            Ok(value) => println!("  {:<12} probe -> {}", role_status.role, value),
            Err(e) => println!("  {:<12} probe failed: {}", role_status.role, e),
        }
    }

    cluster.shutdown().await;
    println!();
    println!("Cluster stopped");
    Ok(())
}
