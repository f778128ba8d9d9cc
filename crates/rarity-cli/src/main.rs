//! rarity CLI
//!
//! Tracker-coordinated rarest-first swarm file distribution

mod config;
mod progress;

use clap::{Parser, Subcommand};
use rarity_core::{Node, SeedEvent, SeedReport};
use rarity_tracker::{Coordinator, CoordinatorConfig, TrackerClient, api};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{SeedProgress, format_bytes, format_duration};

/// rarity - spread a file across a swarm, rarest chunk first
#[derive(Parser)]
#[command(name = "rarity")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: <config dir>/rarity/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the swarm tracker
    Tracker {
        /// Bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run a peer that receives pushes and pulls missing chunks
    Peer {
        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Tracker URL
        #[arg(short, long)]
        tracker: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Seed a file to every registered peer
    Send {
        /// File to send
        #[arg(required = true)]
        file: PathBuf,

        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Tracker URL
        #[arg(short, long)]
        tracker: Option<String>,
    },

    /// Show per-peer statistics collected by the tracker
    Stats {
        /// Tracker URL
        #[arg(short, long)]
        tracker: Option<String>,
    },

    /// Write the effective configuration to a file
    Init {
        /// Destination (default: <config dir>/rarity/config.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::resolve(cli.config.as_deref())?;
    config.validate()?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Tracker { bind } => {
            run_tracker(config.to_coordinator_config(bind.as_deref())?).await?;
        }
        Commands::Peer {
            bind,
            tracker,
            output,
        } => {
            run_peer(&config, bind.as_deref(), tracker.as_deref(), output.as_deref()).await?;
        }
        Commands::Send {
            file,
            bind,
            tracker,
        } => {
            send_file(&config, &file, bind.as_deref(), tracker.as_deref()).await?;
        }
        Commands::Stats { tracker } => {
            show_stats(tracker.as_deref().unwrap_or(&config.tracker.url)).await?;
        }
        Commands::Init { path, force } => {
            let path = path.unwrap_or_else(Config::default_path);
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force)", path.display());
            }
            config.save(&path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

/// Run the tracker until Ctrl+C
async fn run_tracker(config: CoordinatorConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let coordinator = Arc::new(Coordinator::new());

    println!("rarity tracker");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Listen: {}", listener.local_addr()?);
    println!("Press Ctrl+C to stop");

    api::serve_with_shutdown(listener, Arc::clone(&coordinator), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    println!("\nShutting down...");
    println!(
        "Served {} peer(s), {} torrent(s)",
        coordinator.peer_count().await,
        coordinator.torrent_count()
    );
    Ok(())
}

/// Run a receiving peer until Ctrl+C
async fn run_peer(
    config: &Config,
    bind: Option<&str>,
    tracker: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let node = Node::new(config.to_node_config(bind, tracker, output)?)?;
    node.start().await?;

    println!("Listening on: {}", node.local_addr().await?);
    println!("Output directory: {}", node.config().output_dir.display());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    shutdown(&node).await;

    let stats = node.stats();
    println!(
        "Received {} file(s), {} chunk(s), {}",
        stats.files_downloaded,
        stats.chunks_downloaded,
        format_bytes(stats.bytes_downloaded)
    );
    Ok(())
}

/// Seed a file, then keep serving as its origin until Ctrl+C
async fn send_file(
    config: &Config,
    file: &Path,
    bind: Option<&str>,
    tracker: Option<&str>,
) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let file_size = std::fs::metadata(file)?.len();
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(file_size));

    let node = Node::new(config.to_node_config(bind, tracker, None)?)?;
    node.start().await?;
    println!("Listening on: {}", node.local_addr().await?);

    let progress = SeedProgress::new(filename);
    let started = Instant::now();
    let report = node
        .seed_file_with(file, |event| match event {
            SeedEvent::Started {
                peers,
                total_chunks,
            } => progress.start(peers, total_chunks),
            SeedEvent::PeerFinished(outcome) => progress.peer_finished(outcome),
        })
        .await?;
    progress.finish_with_message(format!(
        "Seeded {} in {}",
        report.file_id,
        format_duration(started.elapsed())
    ));

    print_report(&report);

    println!("\nServing as origin, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    shutdown(&node).await;
    Ok(())
}

fn print_report(report: &SeedReport) {
    println!();
    println!("Seed report for {}", report.file_id);
    println!("  Chunks: {}", report.total_chunks);
    println!("  Digest: {}", report.digest);
    println!(
        "  Delivered: {} of {}",
        report.delivered_count(),
        report.total_chunks
    );

    if report.outcomes.is_empty() {
        println!("  No peers registered; peers can still pull from this node");
        return;
    }

    for outcome in &report.outcomes {
        let status = match &outcome.error {
            None => "ok".to_string(),
            Some(e) => format!("failed: {e}"),
        };
        println!(
            "  {:<22} chunks {:>5}..{:<5} acked {:>5}  {}",
            outcome.peer,
            outcome.assigned.start,
            outcome.assigned.end,
            outcome.delivered.len(),
            status
        );
    }
}

async fn shutdown(node: &Node) {
    if let Err(e) = node.report_stats().await {
        tracing::warn!("Failed to report stats: {}", e);
    }
    if let Err(e) = node.stop().await {
        tracing::debug!("Stop: {}", e);
    }
}

/// Print the tracker's per-peer statistics
async fn show_stats(url: &str) -> anyhow::Result<()> {
    let client = TrackerClient::new(url)?;
    let stats = client.stats().await?;

    println!("Tracker: {}", client.url());
    if stats.is_empty() {
        println!("No peers registered");
        return Ok(());
    }

    println!(
        "{:<22} {:>8} {:>10} {:>10} {:>6} {:>6}",
        "PEER", "HELD", "SENT", "RECEIVED", "FILES", "FAILS"
    );
    for (peer, counters) in &stats {
        match &counters.reported {
            Some(r) => println!(
                "{:<22} {:>8} {:>10} {:>10} {:>6} {:>6}",
                peer,
                counters.chunks_downloaded,
                format_bytes(r.bytes_uploaded),
                format_bytes(r.bytes_downloaded),
                r.files_downloaded,
                r.connections_failed
            ),
            None => println!(
                "{:<22} {:>8} {:>10} {:>10} {:>6} {:>6}",
                peer, counters.chunks_downloaded, "-", "-", "-", "-"
            ),
        }
    }
    Ok(())
}
