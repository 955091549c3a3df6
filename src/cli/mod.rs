//! CLI command definitions and handlers

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod context;
pub mod dataset;
pub mod refresh;
pub mod serve;
pub mod status;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

/// Courtside - caching proxy core for a fantasy sports data API
#[derive(Parser, Debug)]
#[command(name = "courtside")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, json)
    #[arg(
        long,
        global = true,
        env = "COURTSIDE_FORMAT",
        default_value = "pretty",
        hide_env = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "COURTSIDE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Directory for the snapshot database
    #[arg(long, global = true, env = "COURTSIDE_DATA_DIR", hide_env = true)]
    pub data_dir: Option<PathBuf>,

    /// Upstream API base URL (for development/testing)
    #[arg(long, global = true, env = "COURTSIDE_API_HOST", hide_env = true)]
    pub api_host: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "COURTSIDE_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the proxy core: startup refresh check, daily schedule, cache sweep
    Run,

    /// Refresh every bulk dataset now
    Refresh,

    /// Show bulk dataset and refresh status
    Status,

    /// Print a stored bulk dataset
    Dataset {
        /// Dataset id (all_players, trending_add, trending_drop)
        id: String,
    },

    /// Display version information
    Version,
}
