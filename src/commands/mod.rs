mod check;
mod init;
mod status;
mod sync;

use std::path::Path;

use crate::cli::Command;

/// Dispatches a parsed command and returns the process exit code.
pub fn execute(root: &Path, command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Init { force } => init::run(root, force),
        Command::Sync {
            force,
            mode,
            report_format,
        } => sync::run(root, force, mode, report_format),
        Command::Status { format, mode } => status::run(root, format, mode),
        Command::Check { format, mode } => check::run(root, format, mode),
    }
}
