use std::path::Path;

use anyhow::Context;

use crate::cli::{FormatArg, ModeArg};
use crate::config;

use super::status;

pub(super) fn run(root: &Path, format: FormatArg, mode: Option<ModeArg>) -> anyhow::Result<i32> {
    let config = config::load(root, mode.map(Into::into)).context("failed to load configuration")?;
    let report = status::build_report(root, &config)?;
    let ok = report.all_synced();

    match format {
        FormatArg::Json => println!("{}", report.to_json()?),
        FormatArg::Text => {
            if ok {
                println!(
                    "All {} package(s) have docs synced to their pinned versions.",
                    report.summary.total
                );
            } else {
                println!("Docs check failed:");
                for entry in report.statuses.iter().filter(|entry| !entry.status.is_synced()) {
                    println!("  {}", status::format_status_line(entry));
                }
                println!("Run `aifd sync` to refresh.");
            }
        }
    }

    Ok(if ok { 0 } else { 1 })
}
