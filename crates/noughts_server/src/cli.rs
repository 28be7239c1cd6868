//! Command-line interface for noughts.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Noughts - two-player tic-tac-toe server with a perfect-play engine
#[derive(Parser, Debug)]
#[command(name = "noughts")]
#[command(about = "Tic-tac-toe session server over length-prefixed TCP frames", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the game server
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Play the engine against itself and report the result
    Selfplay {
        /// Use the single-threaded search
        #[arg(long)]
        sequential: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["noughts", "serve", "--port", "7000", "--config", "n.toml"]);
        match cli.command {
            Command::Serve { host, port, config } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(7000));
                assert_eq!(config, Some(PathBuf::from("n.toml")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_selfplay_flag() {
        let cli = Cli::parse_from(["noughts", "selfplay", "--sequential"]);
        assert!(matches!(cli.command, Command::Selfplay { sequential: true }));
    }

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
