use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use tractor_studio::config::StudioConfig;

mod cli;

#[derive(Parser)]
#[command(name = "studio")]
#[command(about = "Relay and tree-sync client for tractor workspaces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.tractor)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bridge WebSocket clients to the agent's local sockets
    Relay,

    /// Follow a workspace's object tree and edit it from stdin
    Watch(WatchArgs),
}

#[derive(Parser)]
struct WatchArgs {
    /// Workspace directory
    workspace: PathBuf,

    /// Dial the agent's unix sockets directly instead of through the relay
    #[arg(long)]
    direct: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "studio=debug,tractor_studio=debug,info"
    } else {
        "studio=info,tractor_studio=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = StudioConfig::load(cli.data_dir)?;

    match cli.command {
        Commands::Relay => cli::relay_command(&config).await,
        Commands::Watch(args) => cli::watch_command(&config, args.workspace, args.direct).await,
    }
}
