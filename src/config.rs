use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "aifd.toml";

const SETTINGS_KEYS: &[&str] = &[
    "output_dir",
    "max_file_size_kb",
    "prune",
    "sync_concurrency",
    "docs_source",
    "sync_mode",
    "latest_ttl_hours",
    "experimental_registry_archive",
];

const PACKAGE_KEYS: &[&str] = &["repo", "subpath", "files", "ai_notes", "sources"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocsSource {
    GitHost,
    RegistryArchive,
}

impl DocsSource {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "git_host" => Ok(Self::GitHost),
            "registry_archive" => Ok(Self::RegistryArchive),
            other => Err(ConfigError::InvalidDocsSource(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHost => "git_host",
            Self::RegistryArchive => "registry_archive",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    Lockfile,
    LatestDocs,
    Hybrid,
}

impl SyncMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "lockfile" => Ok(Self::Lockfile),
            "latest_docs" => Ok(Self::LatestDocs),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ConfigError::InvalidSyncMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lockfile => "lockfile",
            Self::LatestDocs => "latest_docs",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Ecosystem profile. Only supplies defaults and registry endpoints; the
/// engine itself is ecosystem-agnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ecosystem {
    Rust,
    Node,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Node => "node",
        }
    }

    pub fn default_output_dir(&self) -> &'static str {
        match self {
            Self::Rust => "fdocs/rust",
            Self::Node => "fdocs/node",
        }
    }

    pub fn default_max_file_size_kb(&self) -> u64 {
        match self {
            Self::Rust => 512,
            Self::Node => 200,
        }
    }

    pub fn default_docs_source(&self) -> DocsSource {
        match self {
            Self::Rust => DocsSource::GitHost,
            Self::Node => DocsSource::RegistryArchive,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub max_file_size_kb: u64,
    pub prune: bool,
    pub sync_concurrency: usize,
    pub docs_source: DocsSource,
    pub sync_mode: SyncMode,
    pub latest_ttl_hours: u64,
}

#[derive(Clone, Debug)]
pub struct PackageEntry {
    pub name: String,
    pub repo: Option<String>,
    pub subpath: Option<String>,
    /// Explicit files to mirror; empty means the preferred default set.
    pub files: Vec<String>,
    pub ai_notes: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub ecosystem: Ecosystem,
    pub settings: Settings,
    /// Sorted by name; the engine relies on this for deterministic output.
    pub packages: Vec<PackageEntry>,
}

impl Config {
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        if self.settings.output_dir.is_absolute() {
            self.settings.output_dir.clone()
        } else {
            root.join(&self.settings.output_dir)
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawSettings {
    output_dir: Option<String>,
    max_file_size_kb: Option<i64>,
    prune: Option<bool>,
    sync_concurrency: Option<i64>,
    docs_source: Option<String>,
    sync_mode: Option<String>,
    latest_ttl_hours: Option<i64>,
    experimental_registry_archive: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawPackage {
    repo: Option<String>,
    subpath: Option<String>,
    files: Option<toml::Value>,
    ai_notes: Option<String>,
    sources: Option<Vec<RawLegacySource>>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawLegacySource {
    #[serde(rename = "type")]
    _type: Option<String>,
    repo: Option<String>,
}

pub fn load(root: &Path, mode_override: Option<SyncMode>) -> Result<Config, ConfigError> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path));
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let value: toml::Value = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    let table = value
        .as_table()
        .ok_or_else(|| ConfigError::SectionNotTable("<root>".to_string()))?;

    let mut raw_settings = RawSettings::default();
    let mut raw_packages: Vec<(String, RawPackage)> = Vec::new();

    for (key, entry) in table {
        match key.as_str() {
            "settings" => {
                let settings_table = entry
                    .as_table()
                    .ok_or_else(|| ConfigError::SectionNotTable("settings".to_string()))?;
                reject_unknown_keys("settings", settings_table, SETTINGS_KEYS)?;
                raw_settings = entry
                    .clone()
                    .try_into()
                    .map_err(|source| ConfigError::Parse {
                        path: path.clone(),
                        source,
                    })?;
            }
            "packages" => {
                let packages_table = entry
                    .as_table()
                    .ok_or_else(|| ConfigError::SectionNotTable("packages".to_string()))?;
                for (name, package_value) in packages_table {
                    let package_table = package_value.as_table().ok_or_else(|| {
                        ConfigError::SectionNotTable(format!("packages.{name}"))
                    })?;
                    reject_unknown_keys(&format!("packages.{name}"), package_table, PACKAGE_KEYS)?;
                    let raw_package: RawPackage =
                        package_value
                            .clone()
                            .try_into()
                            .map_err(|source| ConfigError::Parse {
                                path: path.clone(),
                                source,
                            })?;
                    raw_packages.push((name.clone(), raw_package));
                }
            }
            other => {
                warn!(key = other, "ignoring unknown top-level configuration key");
            }
        }
    }

    let ecosystem = detect_ecosystem(root);
    let settings = resolve_settings(raw_settings, ecosystem, mode_override)?;
    let packages = resolve_packages(raw_packages, &settings)?;

    Ok(Config {
        ecosystem,
        settings,
        packages,
    })
}

fn reject_unknown_keys(
    table_name: &str,
    table: &toml::Table,
    known: &[&str],
) -> Result<(), ConfigError> {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            return Err(ConfigError::UnknownKey {
                table: table_name.to_string(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}

/// Profile selection is driven by which lockfile the project carries. With no
/// lockfile at all (latest-docs projects) the Rust profile is the default.
pub fn detect_ecosystem(root: &Path) -> Ecosystem {
    if root.join("Cargo.lock").exists() {
        return Ecosystem::Rust;
    }
    let node_lockfiles = ["package-lock.json", "pnpm-lock.yaml", "yarn.lock"];
    if node_lockfiles.iter().any(|name| root.join(name).exists()) {
        return Ecosystem::Node;
    }
    Ecosystem::Rust
}

fn resolve_settings(
    raw: RawSettings,
    ecosystem: Ecosystem,
    mode_override: Option<SyncMode>,
) -> Result<Settings, ConfigError> {
    let max_file_size_kb = match raw.max_file_size_kb {
        Some(value) if value > 0 => value as u64,
        Some(value) => return Err(ConfigError::InvalidMaxFileSize(value)),
        None => ecosystem.default_max_file_size_kb(),
    };

    let sync_concurrency = match raw.sync_concurrency {
        Some(value) if (1..=50).contains(&value) => value as usize,
        Some(value) => return Err(ConfigError::InvalidSyncConcurrency(value)),
        None => 8,
    };

    let latest_ttl_hours = match raw.latest_ttl_hours {
        Some(value) if value > 0 => value as u64,
        Some(value) => return Err(ConfigError::InvalidLatestTtl(value)),
        None => 24,
    };

    // The explicit key always wins over the historical boolean alias.
    let docs_source = match (raw.docs_source.as_deref(), raw.experimental_registry_archive) {
        (Some(value), _) => DocsSource::parse(value)?,
        (None, Some(true)) => DocsSource::RegistryArchive,
        (None, Some(false)) => DocsSource::GitHost,
        (None, None) => ecosystem.default_docs_source(),
    };

    let sync_mode = match mode_override {
        Some(mode) => mode,
        None => match raw.sync_mode.as_deref() {
            Some(value) => SyncMode::parse(value)?,
            None => SyncMode::Lockfile,
        },
    };

    Ok(Settings {
        output_dir: PathBuf::from(
            raw.output_dir
                .unwrap_or_else(|| ecosystem.default_output_dir().to_string()),
        ),
        max_file_size_kb,
        prune: raw.prune.unwrap_or(true),
        sync_concurrency,
        docs_source,
        sync_mode,
        latest_ttl_hours,
    })
}

fn resolve_packages(
    raw_packages: Vec<(String, RawPackage)>,
    settings: &Settings,
) -> Result<Vec<PackageEntry>, ConfigError> {
    let mut packages = Vec::with_capacity(raw_packages.len());

    for (name, raw) in raw_packages {
        let files = parse_files(&name, raw.files)?;

        // Legacy `sources = [{type=..., repo=...}]` shape; the first entry's
        // repo applies unless an explicit `repo` key is present.
        let legacy_repo = raw
            .sources
            .as_ref()
            .and_then(|sources| sources.first())
            .and_then(|source| source.repo.clone());
        let repo = raw.repo.or(legacy_repo);

        if let Some(ref repo) = repo
            && repo.trim().is_empty()
        {
            return Err(ConfigError::EmptyRepo { package: name });
        }

        packages.push(PackageEntry {
            name,
            repo,
            subpath: raw.subpath,
            files,
            ai_notes: raw.ai_notes,
        });
    }

    let repo_required = matches!(settings.sync_mode, SyncMode::Hybrid)
        || (matches!(settings.sync_mode, SyncMode::Lockfile)
            && matches!(settings.docs_source, DocsSource::GitHost));
    if repo_required {
        for package in &packages {
            if package.repo.is_none() {
                return Err(ConfigError::MissingRepo {
                    package: package.name.clone(),
                    mode: match settings.sync_mode {
                        SyncMode::Hybrid => "hybrid".to_string(),
                        _ => "lockfile + git_host".to_string(),
                    },
                });
            }
        }
    }

    packages.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));
    Ok(packages)
}

fn parse_files(name: &str, value: Option<toml::Value>) -> Result<Vec<String>, ConfigError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    let invalid = || ConfigError::InvalidFiles {
        package: name.to_string(),
    };

    let entries = value.as_array().ok_or_else(invalid)?;
    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        let file = entry.as_str().ok_or_else(invalid)?;
        if file.trim().is_empty() {
            return Err(invalid());
        }
        files.push(file.to_string());
    }
    Ok(files)
}

impl std::fmt::Display for DocsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
