//! Stepwise CLI: the main entry point.
//!
//! Commands:
//! - `run`      : Run the agent once and print its step trace
//! - `stream`   : Stream a run's events; Ctrl-C cancels the session
//! - `config`   : Show, locate, validate or initialise configuration
//! - `tools`    : List the configured tools
//! - `provider` : Check the reasoning backend and list its models

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise: step-bounded tool-calling agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent to completion and print the step trace
    Run {
        /// The task for the agent
        #[arg(short, long)]
        message: String,

        /// Directory the file tools are confined to
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,

        /// Override agent.max_steps
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// Stream the agent's events as they happen
    Stream {
        /// The task for the agent
        #[arg(short, long)]
        message: String,

        /// Directory the file tools are confined to
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,

        /// Print raw JSON events, one per line
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List the configured tools
    Tools,

    /// Check that the configured provider is reachable and list its models
    Provider,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the config file
    Validate,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            message,
            workdir,
            max_steps,
        } => commands::run::run(&message, workdir, max_steps).await?,
        Commands::Stream {
            message,
            workdir,
            json,
        } => commands::stream::run(&message, workdir, json).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
        Commands::Tools => commands::tools::run().await?,
        Commands::Provider => commands::provider::run().await?,
    }

    Ok(())
}
