//! tscluster CLI
//!
//! Inspect a cluster through the fault-tolerant client.
//!
//! ## Usage
//!
//! ```bash
//! # List known nodes, learning the cluster from one seed
//! tscluster --server 10.0.1.1:8112 --discover nodes
//!
//! # Show which nodes own a metric
//! tscluster --server 10.0.1.1:8112 locate 7c7e2e43-0000-4000-8000-000000000001 cpu.user
//!
//! # Run the health watcher for a minute
//! tscluster --config cluster.toml watch --seconds 60
//!
//! # Raw GET through the dispatcher
//! tscluster --server 10.0.1.1:8112 get /state
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tscluster_client::{CancellationToken, Client, ClientConfig, Node, Request};

#[derive(Parser)]
#[command(name = "tscluster")]
#[command(author, version, about = "Inspect a clustered time series store")]
struct Cli {
    /// Path to a TOML client config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seed node address (repeatable; overrides the config file's servers)
    #[arg(short, long = "server", global = true)]
    servers: Vec<String>,

    /// Learn the rest of the cluster from the topology
    #[arg(long, global = true)]
    discover: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List active and inactive nodes
    Nodes,

    /// Print the nodes owning a metric, primary first
    Locate {
        /// Owner (check) identifier
        owner: String,

        /// Metric name
        metric: String,
    },

    /// Run the health watcher and log node transitions
    Watch {
        /// How long to watch
        #[arg(long, default_value = "60")]
        seconds: u64,

        /// Check interval in milliseconds (defaults to the config's)
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },

    /// Send a GET request through the dispatcher and print the body
    Get {
        /// Request path, e.g. /state
        path: String,
    },
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };

    if !cli.servers.is_empty() {
        config.servers = cli.servers.clone();
    }
    if cli.discover {
        config.discover = true;
    }
    if config.servers.is_empty() {
        bail!("No servers given; use --server or a config file");
    }
    Ok(config)
}

fn print_nodes(label: &str, nodes: &[Arc<Node>]) {
    println!("{} ({}):", label, nodes.len());
    for node in nodes {
        let info = node.snapshot();
        println!(
            "  {:<38} {:<28} topology={} version={}",
            if info.id.is_empty() { "-" } else { info.id.as_str() },
            info.address,
            if info.current_topology.is_empty() { "-" } else { info.current_topology.as_str() },
            if info.semver.is_empty() { "-" } else { info.semver.as_str() },
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    if let Commands::Watch {
        interval_ms: Some(ms),
        ..
    } = &cli.command
    {
        config = config.with_watch_interval(Duration::from_millis(*ms));
    }

    let client = Client::connect(config)
        .await
        .context("Failed to connect to the cluster")?;
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Nodes => {
            print_nodes("active", &client.pool().list_active_nodes());
            print_nodes("inactive", &client.pool().list_inactive_nodes());
            let topology = client.current_topology();
            println!("topology: {}", if topology.is_empty() { "-" } else { topology.as_str() });
        }

        Commands::Locate { owner, metric } => {
            let owners = client
                .locate(&cancel, &owner, &metric)
                .await
                .context("Failed to locate metric")?;
            println!("{}", tscluster_topology::metric_key(&owner, &metric));
            for (i, node) in owners.iter().enumerate() {
                let role = if i == 0 { "primary" } else { "replica" };
                println!("  {:<8} {:<38} {} side={}", role, node.id, node.api_url(), node.side);
            }
        }

        Commands::Watch { seconds, .. } => {
            client.set_watch_hook(Some(Arc::new(|node: &Node, active: bool| {
                info!(node = %node.address(), id = %node.id(), active, "Health check");
            })));

            let Some(handle) = client.watch_and_update(cancel.clone()) else {
                bail!("Watch interval is zero; nothing to do");
            };

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
            cancel.cancel();
            handle.await.context("Health watcher panicked")?;

            print_nodes("active", &client.pool().list_active_nodes());
            print_nodes("inactive", &client.pool().list_inactive_nodes());
        }

        Commands::Get { path } => {
            let response = client
                .do_request(&cancel, Request::get(path))
                .await
                .context("Request failed")?;
            println!("{}", response.text());
        }
    }

    Ok(())
}
