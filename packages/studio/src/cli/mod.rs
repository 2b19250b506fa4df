pub mod commands;
pub mod outline;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tractor_studio::config::StudioConfig;
use tractor_studio::relay::RelayServer;
use tractor_studio::transport::{Dialer, RelayDialer, UnixDialer};
use tractor_studio::{ConnectionManager, Endpoint};

use commands::{Command, HELP};

/// `studio relay`: serve the relay until Ctrl+C.
pub async fn relay_command(config: &StudioConfig) -> Result<()> {
    let server = RelayServer::bind(config.relay.bind_addr, config.agent_socket.clone())
        .await
        .with_context(|| format!("Failed to bind relay on {}", config.relay.bind_addr))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        on_signal.cancel();
    });

    server.serve(cancel).await.context("Relay error")
}

/// `studio watch`: follow one workspace, printing the tree on every change
/// and applying line commands from stdin.
pub async fn watch_command(config: &StudioConfig, workspace: PathBuf, direct: bool) -> Result<()> {
    let workspace = std::fs::canonicalize(&workspace)
        .with_context(|| format!("Workspace not found: {}", workspace.display()))?;
    let workspace = workspace.to_string_lossy().into_owned();
    let agent = Endpoint::new(&config.agent_socket);

    if direct {
        watch(UnixDialer, agent, workspace, config).await
    } else {
        let dialer = RelayDialer::new(format!("ws://{}", config.relay.bind_addr), &config.agent_socket);
        watch(dialer, agent, workspace, config).await
    }
}

async fn watch<D: Dialer>(dialer: D, agent: Endpoint, workspace: String, config: &StudioConfig) -> Result<()> {
    let conn = ConnectionManager::new(dialer, agent, workspace, config.reconnect.clone()).open();
    let dispatcher = conn.dispatcher().clone();
    let mut tree = dispatcher.subscribe();
    let mut state = conn.watch_state();
    let mut notices = conn.notices();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("[studio: {}]", *state.borrow());
    loop {
        tokio::select! {
            changed = tree.changed() => {
                if changed.is_err() {
                    break;
                }
                print!("{}", outline::render(&tree.borrow_and_update()));
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                eprintln!("[studio: {}]", *state.borrow_and_update());
            }
            notice = notices.recv() => {
                if let Ok(notice) = notice {
                    eprintln!("[studio: {notice}]");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Help) => eprintln!("{HELP}"),
                    Ok(Command::Print) => print!("{}", outline::render(&dispatcher.tree())),
                    Ok(command) => {
                        if let Err(e) = command.apply(&dispatcher) {
                            eprintln!("[studio: {e}]");
                        }
                    }
                    Err(e) => eprintln!("[studio: {e}]"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    conn.close().await;
    Ok(())
}
