use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.yaml";

#[derive(Parser, Debug)]
#[command(name = "qbridge")]
#[command(about = "Market Bridge - aggregation scheduler and quant scoring engine for index and currency futures")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the collection loops and publish snapshots
    Start {
        /// Path to the configuration file
        #[arg(short, long, env = "QBRIDGE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Publish to an in-memory store instead of the configured one
        #[arg(long)]
        dry_run: bool,

        /// Override the Prometheus exporter port
        #[arg(long)]
        metrics_port: Option<u16>,
    },

    /// Validate configuration without starting the bridge
    Validate {
        /// Path to the configuration file
        #[arg(short, long, env = "QBRIDGE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Initialize a new configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "bridge.yaml")]
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

    #[test]
    fn test_start_with_dry_run() {
        let cli = Cli::try_parse_from(["qbridge", "start", "--config", "custom.yaml", "--dry-run"])
            .unwrap();
        match cli.command {
            Commands::Start {
                config,
                dry_run,
                metrics_port,
            } => {
                assert_eq!(config, PathBuf::from("custom.yaml"));
                assert!(dry_run);
                assert_eq!(metrics_port, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_init_default_output() {
        let cli = Cli::try_parse_from(["qbridge", "init"]).unwrap();
        assert!(matches!(cli.command, Commands::Init { output } if output == PathBuf::from("bridge.yaml")));
    }
}
