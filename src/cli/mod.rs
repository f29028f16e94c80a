//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod run;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use murmur::config::Config;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(version)]
#[command(about = "Chat orchestration engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine with a console transport
    Run {
        /// Config file (defaults to ~/.murmur/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Sender id used for console messages
        #[arg(short, long, default_value = "console")]
        user: String,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the config file and print diagnostics
    Check {
        /// Config file (defaults to ~/.murmur/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub(crate) fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(Config::path)
}

/// Entry point for the CLI - called from main().
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Run { config, user }) => {
            run::cmd_run(config_path(config), user).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
    }
    Ok(())
}
