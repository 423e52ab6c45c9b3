//! Subcommand arguments.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// `gear status` arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// `gear recent` arguments.
#[derive(Debug, Args)]
pub struct RecentCommand {
    /// Number of journal entries to show
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// `gear config` subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective settings
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print the default config file path
    Path,

    /// Check a config file without running anything
    Validate {
        /// File to validate (defaults to the standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
