//! Command-line interface for the `gear` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, RecentCommand, StatusCommand};

use crate::logging::Verbosity;

/// gear - the GridWorks ear
///
/// Listens to every message in a GridWorks universe and archives it in S3,
/// caching locally whenever the bucket is out of reach.
#[derive(Debug, Parser)]
#[command(name = "gear")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ear in the foreground until interrupted
    Run,

    /// Show journal, cache and cron status
    Status(StatusCommand),

    /// Try once to upload everything in the local cache
    Flush,

    /// List the MQTT subscriptions for the current settings
    Topics,

    /// Show recently heard messages
    Recent(RecentCommand),

    /// Check that a running ear is alive, alerting on changes
    Watchdog,

    /// View or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Verbosity from `-q` and `-v`.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "gear");
    }

    #[test]
    fn test_parse_run() {
        let cli = parse(&["gear", "run"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.verbosity(), Verbosity::Normal);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["gear", "status", "--json", "-vv", "--config", "ear.toml"]);
        assert_eq!(cli.verbosity(), Verbosity::Trace);
        assert_eq!(cli.config, Some(PathBuf::from("ear.toml")));
        match cli.command {
            Command::Status(status) => assert!(status.json),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_wins() {
        let cli = parse(&["gear", "-q", "-v", "flush"]);
        assert_eq!(cli.verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_recent_defaults() {
        match parse(&["gear", "recent"]).command {
            Command::Recent(recent) => {
                assert_eq!(recent.limit, 20);
                assert!(!recent.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        match parse(&["gear", "recent", "-n", "5"]).command {
            Command::Recent(recent) => assert_eq!(recent.limit, 5),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_validate_file() {
        match parse(&["gear", "config", "validate", "--file", "x.toml"]).command {
            Command::Config(ConfigCommand::Validate { file }) => {
                assert_eq!(file, Some(PathBuf::from("x.toml")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["gear", "daemon"]).is_err());
    }
}
