#![cfg_attr(not(test), forbid(unsafe_code))]

//! Command-line entry point for the Beacon server.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::server::Config;
use std::error::Error;
use std::path::PathBuf;

/// Beacon server CLI
#[derive(Debug, Parser)]
#[command(name = "beacon-server")]
#[command(about = "Real-time message delivery over server-sent events", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind, overriding the config file and `BEACON_SERVER_PORT`
        #[arg(long, short)]
        port: Option<u16>,

        /// Configuration file (yaml, json, or toml). Profile defaults are used
        /// when omitted.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Print the resolved configuration as YAML and exit
    Config {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// Loads `.env` and parses arguments.
#[must_use]
pub fn initialize_cli() -> Cli {
    dotenv().ok();
    Cli::parse()
}

/// # Errors
/// Returns an error if configuration loading or server startup fails.
pub async fn handle_serve_command(
    port: Option<u16>,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let resolved = Config::load_config(config, port)?;
    server::server::run(resolved).await?;
    Ok(())
}

/// # Errors
/// Returns an error if the configuration cannot be loaded or rendered.
pub fn handle_config_command(config: Option<PathBuf>) -> Result<String, Box<dyn Error>> {
    let resolved = Config::load_config(config, None)?;
    Ok(serde_yml::to_string(&resolved)?)
}

/// # Errors
/// Returns an error if the selected command fails.
pub async fn run_app() -> Result<(), Box<dyn Error>> {
    match initialize_cli().command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
        Commands::Config { config } => {
            print!("{}", handle_config_command(config)?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    run_app().await
}
