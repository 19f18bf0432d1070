use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::cli::{FormatArg, ModeArg};
use crate::config;
use crate::engine::{self, Reporter, SilentReporter, SourceSet, SyncOptions, TextReporter};

pub(super) fn run(
    root: &Path,
    force: bool,
    mode: Option<ModeArg>,
    report_format: FormatArg,
) -> anyhow::Result<i32> {
    let config = config::load(root, mode.map(Into::into)).context("failed to load configuration")?;
    let sources = SourceSet::from_config(&config)?;

    let text_reporter = TextReporter;
    let silent_reporter = SilentReporter;
    let reporter: &dyn Reporter = match report_format {
        FormatArg::Text => &text_reporter,
        FormatArg::Json => &silent_reporter,
    };

    let report = engine::run_sync(root, &config, &sources, SyncOptions { force }, reporter)?;

    info!(
        total = report.summary.total,
        synced = report.summary.synced,
        missing = report.summary.missing,
        outdated = report.summary.outdated,
        corrupted = report.summary.corrupted,
        "sync finished"
    );

    match report_format {
        FormatArg::Json => println!("{}", report.to_json()?),
        FormatArg::Text => {
            println!(
                "Sync completed: total={} synced={} missing={} outdated={} corrupted={}",
                report.summary.total,
                report.summary.synced,
                report.summary.missing,
                report.summary.outdated,
                report.summary.corrupted
            );
        }
    }

    // Partial failures are reported, not fatal; only config/lockfile errors
    // (which return Err above) make sync exit non-zero.
    Ok(0)
}
