use clap::{Parser, Subcommand, ValueEnum};

use crate::config::SyncMode;

#[derive(Debug, Parser)]
#[command(
    name = "aifd",
    version,
    about = "Mirror dependency documentation pinned to the project's lockfile versions"
)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a starter aifd.toml for this project.
    Init {
        /// Replace an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Resolve target versions and mirror docs into the output directory.
    Sync {
        /// Refetch every package, ignoring the cache.
        #[arg(long)]
        force: bool,

        /// Override the configured sync mode.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Report format for the final summary.
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        report_format: FormatArg,
    },

    /// Show each package's current sync state without fetching docs.
    Status {
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,

        /// Override the configured sync mode.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// CI gate: exit non-zero unless every package is synced.
    Check {
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,

        /// Override the configured sync mode.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Lockfile,
    LatestDocs,
    Hybrid,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lockfile => SyncMode::Lockfile,
            ModeArg::LatestDocs => SyncMode::LatestDocs,
            ModeArg::Hybrid => SyncMode::Hybrid,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_with_flags() {
        let cli = Cli::try_parse_from([
            "aifd",
            "sync",
            "--force",
            "--mode",
            "latest-docs",
            "--report-format",
            "json",
        ])
        .expect("parse");
        match cli.command {
            Command::Sync {
                force,
                mode,
                report_format,
            } => {
                assert!(force);
                assert_eq!(mode, Some(ModeArg::LatestDocs));
                assert_eq!(report_format, FormatArg::Json);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn parses_check_defaults() {
        let cli = Cli::try_parse_from(["aifd", "check"]).expect("parse");
        match cli.command {
            Command::Check { format, mode } => {
                assert_eq!(format, FormatArg::Text);
                assert_eq!(mode, None);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn parses_verbose_flag() {
        let cli = Cli::try_parse_from(["aifd", "--verbose", "status"]).expect("parse");
        assert!(cli.verbose);
    }

    #[test]
    fn parses_init_force() {
        let cli = Cli::try_parse_from(["aifd", "init", "--force"]).expect("parse");
        match cli.command {
            Command::Init { force } => assert!(force),
            _ => panic!("unexpected command"),
        }
    }
}
