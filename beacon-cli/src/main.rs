//! Command-line client for a Beacon server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod render;
mod sse;

use commands::{
    config::ConfigArgs,
    follow::FollowArgs,
    messages::{HistoryArgs, RecentArgs, SendArgs},
    notifications::{InteractArgs, NotificationsArgs},
};

/// Beacon CLI
#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Send messages and follow live delivery from a Beacon server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Send(SendArgs),
    History(HistoryArgs),
    Recent(RecentArgs),
    Follow(FollowArgs),
    Notifications(NotificationsArgs),
    Interact(InteractArgs),
    Config(ConfigArgs),
    /// Print a shell completion script
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn initialize_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    initialize_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Send(args) => commands::messages::send(args).await,
        Commands::History(args) => commands::messages::history(args).await,
        Commands::Recent(args) => commands::messages::recent(args).await,
        Commands::Follow(args) => commands::follow::follow(args).await,
        Commands::Notifications(args) => commands::notifications::list(args).await,
        Commands::Interact(args) => commands::notifications::interact(args).await,
        Commands::Config(args) => commands::config::generate_config(&args),
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            Ok(())
        }
    }
}
