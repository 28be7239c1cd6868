//! Noughts - unified CLI
//!
//! Runs the session server or an in-process engine self-play match.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use noughts_engine::{MAX_BRANCHING, Searcher, Strategy};
use noughts_server::{EnginePlayer, GameServer, LocalMatch, ServerConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,noughts_server=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { host, port, config } => run_server(host, port, config).await,
        Command::Selfplay { sequential } => run_selfplay(sequential).await,
    }
}

/// Run the game server until ctrl-c
async fn run_server(host: Option<String>, port: Option<u16>, config: Option<PathBuf>) -> Result<()> {
    let config = match config {
        Some(path) => ServerConfig::from_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ServerConfig::default(),
    }
    .with_overrides(host, port);

    info!(
        addr = %config.bind_addr(),
        search = %config.search(),
        "Starting noughts server"
    );

    let server = GameServer::bind(config).await?;
    info!(addr = %server.local_addr()?, "Server ready - connect over TCP");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Play the engine against itself
async fn run_selfplay(sequential: bool) -> Result<()> {
    let strategy = if sequential {
        Strategy::Sequential
    } else {
        Strategy::Parallel
    };
    let searcher = Searcher::new(strategy, MAX_BRANCHING).context("Failed to set up search")?;

    let mut game = LocalMatch::new(
        Box::new(EnginePlayer::new("engine-x", searcher.clone())),
        Box::new(EnginePlayer::new("engine-o", searcher)),
    );
    let report = game.run().await?;

    info!(
        %strategy,
        outcome = ?report.outcome(),
        board = %report.board(),
        moves = report.moves().len(),
        "Self-play finished"
    );
    Ok(())
}
