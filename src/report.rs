use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{PackageEntry, SyncMode};
use crate::meta::{self, MetaReadOutcome, MetaRecord};
use crate::transform::FLATTEN_DELIMITER;

/// Terminal per-package outcome, as surfaced to users and CI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PackageStatus {
    Synced,
    SyncedFallback,
    Outdated,
    Missing,
    Corrupted,
}

impl PackageStatus {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced | Self::SyncedFallback)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "Synced",
            Self::SyncedFallback => "SyncedFallback",
            Self::Outdated => "Outdated",
            Self::Missing => "Missing",
            Self::Corrupted => "Corrupted",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusEntry {
    pub name: String,
    pub lock_version: Option<String>,
    pub docs_version: Option<String>,
    pub status: PackageStatus,
    pub reason: String,
    pub mode: String,
    pub source_kind: Option<String>,
    pub reason_code: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Summary {
    pub total: u64,
    pub synced: u64,
    pub missing: u64,
    pub outdated: u64,
    pub corrupted: u64,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct SourceStats {
    pub attempted: u64,
    pub synced: u64,
    pub fallback: u64,
}

/// The stable report object. Field names are part of the JSON contract:
/// additions are fine, renames are not.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub statuses: Vec<StatusEntry>,
    #[serde(rename = "sourceStats")]
    pub source_stats: BTreeMap<String, SourceStats>,
    #[serde(rename = "errorCodes")]
    pub error_codes: BTreeMap<String, u64>,
    pub issues: Vec<String>,
}

impl Report {
    pub fn new(
        mut statuses: Vec<StatusEntry>,
        source_stats: BTreeMap<String, SourceStats>,
        error_codes: BTreeMap<String, u64>,
        issues: Vec<String>,
    ) -> Self {
        statuses.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));

        let mut summary = Summary {
            total: statuses.len() as u64,
            ..Summary::default()
        };
        for entry in &statuses {
            match entry.status {
                PackageStatus::Synced | PackageStatus::SyncedFallback => summary.synced += 1,
                PackageStatus::Missing => summary.missing += 1,
                PackageStatus::Outdated => summary.outdated += 1,
                PackageStatus::Corrupted => summary.corrupted += 1,
            }
        }

        Self {
            summary,
            statuses,
            source_stats,
            error_codes,
            issues,
        }
    }

    pub fn all_synced(&self) -> bool {
        self.statuses.iter().all(|entry| entry.status.is_synced())
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        use anyhow::Context;
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }
}

/// Derives a package's status from the on-disk state alone. Used by `status`
/// and `check`; never touches the network. In latest-docs mode the caller
/// may pass an upstream version it probed separately.
pub fn evaluate_package(
    output_dir: &Path,
    entry: &PackageEntry,
    fingerprint: &str,
    lock_version: Option<&str>,
    mode: SyncMode,
    upstream_latest: Option<&str>,
    now: DateTime<Utc>,
) -> StatusEntry {
    match mode {
        SyncMode::LatestDocs => {
            evaluate_latest(output_dir, entry, fingerprint, upstream_latest, now)
        }
        SyncMode::Lockfile | SyncMode::Hybrid => {
            evaluate_lockfile(output_dir, entry, fingerprint, lock_version, mode)
        }
    }
}

fn evaluate_lockfile(
    output_dir: &Path,
    entry: &PackageEntry,
    fingerprint: &str,
    lock_version: Option<&str>,
    mode: SyncMode,
) -> StatusEntry {
    let base = |status, reason: String, reason_code: &str, docs_version, source_kind| StatusEntry {
        name: entry.name.clone(),
        lock_version: lock_version.map(str::to_string),
        docs_version,
        status,
        reason,
        mode: mode.as_str().to_string(),
        source_kind,
        reason_code: reason_code.to_string(),
    };

    let Some(lock_version) = lock_version else {
        return base(
            PackageStatus::Missing,
            "not present in the lockfile".to_string(),
            "lockfile_missing",
            None,
            None,
        );
    };

    // The existing directory may be for an older version; a lock bump reads
    // as Outdated rather than Missing.
    let Some(read) = find_package_record(output_dir, entry) else {
        return base(
            PackageStatus::Missing,
            "docs not synced yet".to_string(),
            "lockfile_missing",
            None,
            None,
        );
    };

    match read {
        Err(detail) => base(
            PackageStatus::Corrupted,
            detail,
            "lockfile_corrupted_meta",
            None,
            None,
        ),
        Ok(record) => {
            let source_kind = record.source_kind.map(|kind| kind.as_str().to_string());
            if record.version != lock_version {
                return base(
                    PackageStatus::Outdated,
                    format!(
                        "docs are for {} but the lockfile pins {}",
                        record.version, lock_version
                    ),
                    "lockfile_outdated_version_mismatch",
                    Some(record.version.clone()),
                    source_kind,
                );
            }
            match record.config_hash.as_deref() {
                Some(hash) if hash == fingerprint => base(
                    status_for_record(&record),
                    "docs match the pinned version".to_string(),
                    "lockfile_ok",
                    Some(record.version.clone()),
                    source_kind,
                ),
                _ => base(
                    PackageStatus::Outdated,
                    "package configuration changed since the last sync".to_string(),
                    "lockfile_outdated_config_changed",
                    Some(record.version.clone()),
                    source_kind,
                ),
            }
        }
    }
}

fn evaluate_latest(
    output_dir: &Path,
    entry: &PackageEntry,
    fingerprint: &str,
    upstream_latest: Option<&str>,
    now: DateTime<Utc>,
) -> StatusEntry {
    let base = |status, reason: String, reason_code: &str, docs_version, source_kind| StatusEntry {
        name: entry.name.clone(),
        lock_version: None,
        docs_version,
        status,
        reason,
        mode: SyncMode::LatestDocs.as_str().to_string(),
        source_kind,
        reason_code: reason_code.to_string(),
    };

    let Some(record) = find_package_record(output_dir, entry) else {
        return base(
            PackageStatus::Missing,
            "latest docs not synced yet".to_string(),
            "lockfile_missing",
            None,
            None,
        );
    };

    let record = match record {
        Ok(record) => record,
        Err(detail) => {
            return base(
                PackageStatus::Corrupted,
                detail,
                "latest_corrupted_meta",
                None,
                None,
            );
        }
    };

    let source_kind = record.source_kind.map(|kind| kind.as_str().to_string());
    let docs_version = Some(record.version.clone());

    if record.config_hash.as_deref() != Some(fingerprint) {
        return base(
            PackageStatus::Outdated,
            "package configuration changed since the last sync".to_string(),
            "lockfile_outdated_config_changed",
            docs_version,
            source_kind,
        );
    }

    if let Some(upstream) = upstream_latest
        && upstream != record.version
    {
        return base(
            PackageStatus::Outdated,
            format!("upstream latest is {} but docs are for {}", upstream, record.version),
            "latest_outdated_upstream_changed",
            docs_version,
            source_kind,
        );
    }

    let within_ttl = record.ttl_expires_at.is_none_or(|expires| expires >= now);
    if within_ttl {
        base(
            status_for_record(&record),
            "latest docs are within their TTL".to_string(),
            "latest_cache_hit_ttl",
            docs_version,
            source_kind,
        )
    } else {
        base(
            status_for_record(&record),
            "TTL expired; next sync will revalidate upstream".to_string(),
            "latest_cache_hit_ttl",
            docs_version,
            source_kind,
        )
    }
}

fn status_for_record(record: &MetaRecord) -> PackageStatus {
    if record.is_fallback || matches!(record.source_kind, Some(meta::SourceKind::GitFallback)) {
        PackageStatus::SyncedFallback
    } else {
        PackageStatus::Synced
    }
}

/// Directories are keyed by whatever version was current at sync time, so
/// the lookup scans for the package's directory instead of computing a
/// single expected path.
fn find_package_record(
    output_dir: &Path,
    entry: &PackageEntry,
) -> Option<Result<Box<MetaRecord>, String>> {
    let prefix = format!("{}@", entry.name.replace('/', FLATTEN_DELIMITER));
    let entries = std::fs::read_dir(output_dir).ok()?;

    let mut candidates: Vec<String> = entries
        .filter_map(|dir_entry| dir_entry.ok())
        .filter(|dir_entry| dir_entry.path().is_dir())
        .map(|dir_entry| dir_entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(&prefix) && !name.contains(".tmp-") && !name.contains(".old-"))
        .collect();
    candidates.sort();

    let dir_name = candidates.pop()?;
    match meta::read(&output_dir.join(dir_name)) {
        MetaReadOutcome::Missing => {
            Some(Err("package directory exists but has no metadata record".to_string()))
        }
        MetaReadOutcome::Corrupted(detail) => Some(Err(detail)),
        MetaReadOutcome::Valid(record) => Some(Ok(record)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::config_fingerprint;
    use crate::meta::SCHEMA_VERSION;
    use crate::store;

    fn entry(name: &str) -> PackageEntry {
        PackageEntry {
            name: name.to_string(),
            repo: Some(format!("owner/{name}")),
            subpath: None,
            files: Vec::new(),
            ai_notes: None,
        }
    }

    fn record_for(entry: &PackageEntry, version: &str) -> MetaRecord {
        MetaRecord {
            schema_version: SCHEMA_VERSION,
            version: version.to_string(),
            git_ref: format!("v{version}"),
            is_fallback: false,
            fetched_at: Utc::now(),
            config_hash: Some(config_fingerprint(entry)),
            sync_mode: None,
            source_kind: None,
            upstream_latest_version: None,
            upstream_checked_at: None,
            ttl_expires_at: None,
            artifact_format: None,
            artifact_bytes: None,
            artifact_sha256: None,
            truncated: None,
        }
    }

    fn persist(output_dir: &Path, name: &str, version: &str, record: &MetaRecord) {
        let dir = store::package_dir(output_dir, name, version);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            dir.join(meta::META_FILE_NAME),
            meta::to_toml(record).expect("serialize"),
        )
        .expect("write meta");
    }

    fn status_entry(name: &str, status: PackageStatus) -> StatusEntry {
        StatusEntry {
            name: name.to_string(),
            lock_version: Some("1.0.0".to_string()),
            docs_version: None,
            status,
            reason: String::new(),
            mode: "lockfile".to_string(),
            source_kind: None,
            reason_code: "lockfile_ok".to_string(),
        }
    }

    #[test]
    fn summary_counts_by_status() {
        let report = Report::new(
            vec![
                status_entry("a", PackageStatus::Synced),
                status_entry("b", PackageStatus::SyncedFallback),
                status_entry("c", PackageStatus::Missing),
                status_entry("d", PackageStatus::Outdated),
                status_entry("e", PackageStatus::Corrupted),
            ],
            BTreeMap::new(),
            BTreeMap::new(),
            Vec::new(),
        );

        assert_eq!(report.summary.total, 5);
        assert_eq!(report.summary.synced, 2);
        assert_eq!(report.summary.missing, 1);
        assert_eq!(report.summary.outdated, 1);
        assert_eq!(report.summary.corrupted, 1);
        assert!(!report.all_synced());
    }

    #[test]
    fn statuses_are_sorted_by_name() {
        let report = Report::new(
            vec![
                status_entry("zebra", PackageStatus::Synced),
                status_entry("alpha", PackageStatus::Synced),
            ],
            BTreeMap::new(),
            BTreeMap::new(),
            Vec::new(),
        );
        assert_eq!(report.statuses[0].name, "alpha");
        assert_eq!(report.statuses[1].name, "zebra");
        assert!(report.all_synced());
    }

    #[test]
    fn json_contract_uses_stable_field_names() {
        let report = Report::new(
            vec![status_entry("a", PackageStatus::Synced)],
            BTreeMap::from([("git_host".to_string(), SourceStats::default())]),
            BTreeMap::from([("RATE_LIMIT".to_string(), 1)]),
            vec!["issue".to_string()],
        );

        let json = report.to_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert!(value.get("summary").is_some());
        assert!(value.get("statuses").is_some());
        assert!(value.get("sourceStats").is_some());
        assert!(value.get("errorCodes").is_some());
        assert!(value.get("issues").is_some());
        assert_eq!(value["statuses"][0]["status"], "Synced");
        assert_eq!(value["statuses"][0]["lock_version"], "1.0.0");
    }

    #[test]
    fn synced_when_meta_matches() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("lodash");
        let record = record_for(&package, "4.17.21");
        persist(temp.path(), "lodash", "4.17.21", &record);

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            Some("4.17.21"),
            SyncMode::Lockfile,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Synced);
        assert_eq!(status.reason_code, "lockfile_ok");
        assert_eq!(status.docs_version.as_deref(), Some("4.17.21"));
    }

    #[test]
    fn missing_when_never_synced() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("lodash");

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            Some("4.17.21"),
            SyncMode::Lockfile,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Missing);
        assert_eq!(status.reason_code, "lockfile_missing");
    }

    #[test]
    fn missing_when_not_in_lockfile() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("lodash");

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            None,
            SyncMode::Lockfile,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Missing);
        assert!(status.reason.contains("lockfile"));
    }

    #[test]
    fn outdated_when_lock_moves() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("lodash");
        let record = record_for(&package, "4.17.20");
        persist(temp.path(), "lodash", "4.17.20", &record);

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            Some("4.17.21"),
            SyncMode::Lockfile,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Outdated);
        assert_eq!(status.reason_code, "lockfile_outdated_version_mismatch");
        assert_eq!(status.docs_version.as_deref(), Some("4.17.20"));
    }

    #[test]
    fn corrupted_when_meta_is_garbage() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("lodash");
        let dir = store::package_dir(temp.path(), "lodash", "4.17.21");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(meta::META_FILE_NAME), "not = [toml").expect("write");

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            Some("4.17.21"),
            SyncMode::Lockfile,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Corrupted);
        assert_eq!(status.reason_code, "lockfile_corrupted_meta");
    }

    #[test]
    fn corrupted_when_dir_exists_without_meta() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("lodash");
        std::fs::create_dir_all(store::package_dir(temp.path(), "lodash", "4.17.21"))
            .expect("mkdir");

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            Some("4.17.21"),
            SyncMode::Lockfile,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Corrupted);
    }

    #[test]
    fn outdated_when_config_changed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("lodash");
        let mut record = record_for(&package, "4.17.21");
        record.config_hash = Some("0000000000000000".to_string());
        persist(temp.path(), "lodash", "4.17.21", &record);

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            Some("4.17.21"),
            SyncMode::Lockfile,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Outdated);
        assert_eq!(status.reason_code, "lockfile_outdated_config_changed");
    }

    #[test]
    fn latest_mode_flags_upstream_change() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("serde");
        let mut record = record_for(&package, "1.0.219");
        record.sync_mode = Some("latest_docs".to_string());
        persist(temp.path(), "serde", "1.0.219", &record);

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            None,
            SyncMode::LatestDocs,
            Some("1.0.220"),
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Outdated);
        assert_eq!(status.reason_code, "latest_outdated_upstream_changed");
    }

    #[test]
    fn latest_mode_hit_within_ttl() {
        let temp = tempfile::tempdir().expect("tempdir");
        let package = entry("serde");
        let mut record = record_for(&package, "1.0.219");
        record.ttl_expires_at = Some(Utc::now() + chrono::Duration::hours(12));
        persist(temp.path(), "serde", "1.0.219", &record);

        let status = evaluate_package(
            temp.path(),
            &package,
            &config_fingerprint(&package),
            None,
            SyncMode::LatestDocs,
            None,
            Utc::now(),
        );
        assert_eq!(status.status, PackageStatus::Synced);
        assert_eq!(status.reason_code, "latest_cache_hit_ttl");
    }
}
