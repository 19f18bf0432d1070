use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SyncMode;

pub const META_FILE_NAME: &str = ".aifd-meta.toml";
pub const SCHEMA_VERSION: u32 = 2;

/// Reference sentinel recorded when the artifact came from a published
/// archive rather than a git ref.
pub const REGISTRY_ARCHIVE_REF: &str = "registry-archive";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rendered,
    GitFallback,
    Mixed,
    RegistryArchive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rendered => "rendered",
            Self::GitFallback => "git_fallback",
            Self::Mixed => "mixed",
            Self::RegistryArchive => "registry_archive",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaRecord {
    pub schema_version: u32,
    pub version: String,
    pub git_ref: String,
    pub is_fallback: bool,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    // Latest-docs extensions; absent in lockfile mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<SourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_latest_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

/// What a package directory's metadata says, before comparing against the
/// current target version.
#[derive(Clone, Debug)]
pub enum MetaReadOutcome {
    Missing,
    Corrupted(String),
    Valid(Box<MetaRecord>),
}

pub fn read(package_dir: &Path) -> MetaReadOutcome {
    let path = package_dir.join(META_FILE_NAME);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return MetaReadOutcome::Missing,
        Err(err) => return MetaReadOutcome::Corrupted(format!("failed to read metadata: {err}")),
    };

    let record: MetaRecord = match toml::from_str(&raw) {
        Ok(record) => record,
        Err(err) => {
            return MetaReadOutcome::Corrupted(format!("failed to parse metadata: {err}"));
        }
    };

    if record.schema_version > SCHEMA_VERSION {
        return MetaReadOutcome::Corrupted(format!(
            "metadata schema_version {} is newer than supported {}",
            record.schema_version, SCHEMA_VERSION
        ));
    }

    MetaReadOutcome::Valid(Box::new(record))
}

pub fn to_toml(record: &MetaRecord) -> anyhow::Result<String> {
    use anyhow::Context;
    toml::to_string_pretty(record).context("failed to serialize package metadata")
}

/// Outcome of the purely local cache check. Never touches the network.
#[derive(Clone, Debug)]
pub enum CacheDecision {
    Hit(Box<MetaRecord>),
    Miss,
    /// Metadata unreadable or from a future schema; refresh is forced.
    Corrupted(String),
    /// Latest-docs TTL expired; upstream must be re-checked.
    Revalidate(Box<MetaRecord>),
}

pub fn decide(
    package_dir: &Path,
    target_version: &str,
    current_fingerprint: &str,
    mode: SyncMode,
    force: bool,
    now: DateTime<Utc>,
) -> CacheDecision {
    if force {
        return CacheDecision::Miss;
    }

    let record = match read(package_dir) {
        MetaReadOutcome::Missing => return CacheDecision::Miss,
        MetaReadOutcome::Corrupted(reason) => return CacheDecision::Corrupted(reason),
        MetaReadOutcome::Valid(record) => record,
    };

    if record.version != target_version {
        return CacheDecision::Miss;
    }

    match record.config_hash.as_deref() {
        Some(hash) if hash == current_fingerprint => {}
        // Differing hash means the entry's inputs changed; a missing hash is
        // a pre-schema-2 record and must be refreshed to regain invariants.
        Some(_) | None => return CacheDecision::Miss,
    }

    if matches!(mode, SyncMode::LatestDocs)
        && let Some(expires) = record.ttl_expires_at
        && expires < now
    {
        return CacheDecision::Revalidate(record);
    }

    CacheDecision::Hit(record)
}
