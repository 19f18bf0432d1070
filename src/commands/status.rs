use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use tracing::debug;

use crate::cli::{FormatArg, ModeArg};
use crate::config::{self, Config, SyncMode};
use crate::fingerprint::config_fingerprint;
use crate::lockfile::{self, VersionMap};
use crate::registry::RegistryClient;
use crate::report::{Report, StatusEntry, evaluate_package};
use crate::sources::http::Http;

pub(super) fn run(root: &Path, format: FormatArg, mode: Option<ModeArg>) -> anyhow::Result<i32> {
    let config = config::load(root, mode.map(Into::into)).context("failed to load configuration")?;
    let report = build_report(root, &config)?;

    match format {
        FormatArg::Json => println!("{}", report.to_json()?),
        FormatArg::Text => {
            println!("Docs status ({} mode):", config.settings.sync_mode);
            for entry in &report.statuses {
                println!("  {}", format_status_line(entry));
            }
        }
    }

    Ok(0)
}

/// Derives every package's status from disk. Lockfile mode is purely local;
/// latest-docs mode probes the registry for the current upstream version.
pub(super) fn build_report(root: &Path, config: &Config) -> anyhow::Result<Report> {
    let mode = config.settings.sync_mode;
    let output_dir = config.output_dir(root);

    let versions: VersionMap = match mode {
        SyncMode::Lockfile | SyncMode::Hybrid => lockfile::resolve(root)?,
        SyncMode::LatestDocs => VersionMap::new(),
    };

    let upstreams = match mode {
        SyncMode::LatestDocs => probe_upstream_versions(config),
        _ => BTreeMap::new(),
    };

    let now = Utc::now();
    let mut statuses = Vec::with_capacity(config.packages.len());
    for entry in &config.packages {
        let fingerprint = config_fingerprint(entry);
        statuses.push(evaluate_package(
            &output_dir,
            entry,
            &fingerprint,
            versions.get(&entry.name).map(String::as_str),
            mode,
            upstreams.get(&entry.name).map(String::as_str),
            now,
        ));
    }

    let issues = statuses
        .iter()
        .filter(|entry| !entry.status.is_synced())
        .map(|entry| format!("{}: {}", entry.name, entry.reason))
        .collect();

    Ok(Report::new(statuses, BTreeMap::new(), BTreeMap::new(), issues))
}

fn probe_upstream_versions(config: &Config) -> BTreeMap<String, String> {
    let Ok(http) = Http::new() else {
        return BTreeMap::new();
    };
    let registry = RegistryClient::new(http, config.ecosystem);

    let mut upstreams = BTreeMap::new();
    for entry in &config.packages {
        match registry.latest_stable_version(&entry.name) {
            Ok(version) => {
                upstreams.insert(entry.name.clone(), version);
            }
            Err(err) => {
                debug!(package = %entry.name, error = %err, "upstream probe failed");
            }
        }
    }
    upstreams
}

pub(super) fn format_status_line(entry: &StatusEntry) -> String {
    let lock = entry.lock_version.as_deref().unwrap_or("-");
    let docs = entry.docs_version.as_deref().unwrap_or("-");
    format!(
        "{:<16} {} (lock: {lock}, docs: {docs}) {}",
        entry.status.as_str(),
        entry.name,
        entry.reason
    )
}
