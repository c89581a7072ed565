//! CLI parser and command dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "finsight")]
#[command(about = "Finance news insight aggregation and analysis system")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to finsight.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and run migrations
    Init,

    /// Run the API server together with the worker pool
    Serve {
        /// Bind address (host:port), overrides config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run the worker pool without the API server
    Work {
        /// Number of workers, overrides config
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Fetch a JSON news feed and enqueue analysis for new items
    Ingest {
        /// Feed URL (defaults to the configured feed)
        url: Option<String>,
    },

    /// Enqueue analysis for every unprocessed insight
    Analyze {
        /// Maximum number of insights to trigger
        #[arg(short, long, default_value = "1000")]
        limit: i64,
    },

    /// Inspect and maintain the task queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Show task counts by status
    Stats,
    /// Show queue health (failure rate vs threshold)
    Health,
    /// Run the full maintenance pass now
    Cleanup,
    /// Recover tasks stuck in processing
    ResetStuck,
    /// Cancel all pending and processing tasks
    Cancel,
    /// Cancel tasks whose insight no longer exists
    Purge,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        settings.database_path = database;
    }

    match cli.command {
        Commands::Init => commands::cmd_init(&settings).await,
        Commands::Serve { bind } => commands::cmd_serve(&settings, bind.as_deref()).await,
        Commands::Work { workers } => commands::cmd_work(&settings, workers).await,
        Commands::Ingest { url } => commands::cmd_ingest(&settings, url.as_deref()).await,
        Commands::Analyze { limit } => commands::cmd_analyze(&settings, limit).await,
        Commands::Queue { command } => match command {
            QueueCommands::Stats => commands::cmd_queue_stats(&settings).await,
            QueueCommands::Health => commands::cmd_queue_health(&settings).await,
            QueueCommands::Cleanup => commands::cmd_queue_cleanup(&settings).await,
            QueueCommands::ResetStuck => commands::cmd_queue_reset_stuck(&settings).await,
            QueueCommands::Cancel => commands::cmd_queue_cancel(&settings).await,
            QueueCommands::Purge => commands::cmd_queue_purge(&settings).await,
        },
    }
}
