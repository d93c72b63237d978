use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "strikewatch")]
#[command(about = "Strikewatch - live option market data fan-out")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load baselines, start the feed and serve subscribers
    Start {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config/strikewatch.yaml")]
        config: PathBuf,

        /// Override the REST API port
        #[arg(long, env = "PORT")]
        http: Option<u16>,

        /// Override the subscriber WebSocket port
        #[arg(long, env = "WS_PORT")]
        ws: Option<u16>,
    },

    /// Validate configuration without starting the feed
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config/strikewatch.yaml")]
        config: PathBuf,
    },

    /// Write a configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "strikewatch.yaml")]
        output: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_overrides() {
        let cli = Cli::try_parse_from([
            "strikewatch",
            "start",
            "--config",
            "feed.yaml",
            "--http",
            "8080",
            "--ws",
            "8081",
        ])
        .unwrap();

        match cli.command {
            Commands::Start { config, http, ws } => {
                assert_eq!(config, PathBuf::from("feed.yaml"));
                assert_eq!(http, Some(8080));
                assert_eq!(ws, Some(8081));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_path() {
        let cli = Cli::try_parse_from(["strikewatch", "validate"]).unwrap();
        match cli.command {
            Commands::Validate { config } => {
                assert_eq!(config, PathBuf::from("config/strikewatch.yaml"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
