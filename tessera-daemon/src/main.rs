//! Tessera Daemon (`tesserad`)
//!
//! Headless peer that keeps a merged index, answers queued API requests and
//! replicates HEAD announcements over pub/sub until it is told to stop.

mod config;
mod keys;
mod node;

use clap::{Parser, Subcommand};
use config::DaemonConfig;
use node::Node;
use std::path::PathBuf;
use tessera_model::PrivateKey;
use tessera_store::MemoryNetwork;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tesserad", version, about = "Tessera peer daemon")]
struct Args {
    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a peer until SIGINT or SIGTERM
    Run {
        /// TOML config file; defaults give an in-memory peer
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Generate a private key and print its public key
    Keygen {
        /// Write the key here instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Run { config } => run(config).await,
        Command::Keygen { out } => keygen(out),
    }
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    tracing::info!("tesserad v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match &config_path {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    match config.data_dir() {
        Some(dir) => tracing::info!(peer = %config.peer_id, data_dir = %dir.base().display(), "Persistent peer"),
        None => tracing::info!(peer = %config.peer_id, "In-memory peer"),
    }

    let network = MemoryNetwork::new();
    let node = Node::start(&config, &network).await.map_err(|e| {
        tracing::error!("Failed to start: {:#}", e);
        e
    })?;
    tracing::info!("Daemon ready. Press Ctrl+C to stop.");

    shutdown_signal().await?;
    tracing::info!("Shutdown signal received...");

    node.shutdown().await;
    tracing::info!("Daemon stopped");
    Ok(())
}

fn keygen(out: Option<PathBuf>) -> anyhow::Result<()> {
    let key = PrivateKey::generate();
    match out {
        Some(path) => {
            keys::write_private_key(&path, &key)?;
            tracing::info!(path = %path.display(), "Wrote private key");
        }
        None => println!("{}", key.to_base58().as_str()),
    }
    eprintln!("public key: {}", key.public_key());
    Ok(())
}

fn init_tracing(verbosity: u8) {
    let mut filter = EnvFilter::from_default_env();

    // Only apply defaults if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        filter = filter.add_directive(level.into());
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
