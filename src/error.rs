use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid docs_source: {0} (expected one of: registry_archive, git_host)")]
    InvalidDocsSource(String),

    #[error("invalid sync_mode: {0} (expected one of: lockfile, latest_docs, hybrid)")]
    InvalidSyncMode(String),

    #[error("invalid max_file_size_kb: {0} (must be a positive integer)")]
    InvalidMaxFileSize(i64),

    #[error("invalid sync_concurrency: {0} (must be in 1..=50)")]
    InvalidSyncConcurrency(i64),

    #[error("invalid latest_ttl_hours: {0} (must be a positive integer)")]
    InvalidLatestTtl(i64),

    #[error("package '{package}': files must be a sequence of non-empty strings")]
    InvalidFiles { package: String },

    #[error("package '{package}': repo is present but empty")]
    EmptyRepo { package: String },

    #[error("package '{package}': repo is required in {mode} mode")]
    MissingRepo { package: String, mode: String },

    #[error("section '{0}' is not a table")]
    SectionNotTable(String),

    #[error("unknown key '{key}' in [{table}]")]
    UnknownKey { table: String, key: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) | Self::Read { .. } => "FILE_NOT_FOUND",
            _ => "INVALID_CONFIG",
        }
    }
}

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("no supported lockfile found in {0} (looked for Cargo.lock, package-lock.json, pnpm-lock.yaml, yarn.lock)")]
    NotFound(PathBuf),

    #[error("failed to read lockfile {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse lockfile {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl LockfileError {
    pub fn code(&self) -> &'static str {
        "LOCKFILE_NOT_FOUND"
    }
}

/// Classified failure from a source adapter. The kind drives retry and
/// fallback decisions; the message is carried into the report.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchErrorKind {
    Auth,
    RateLimit,
    NotFound,
    Network,
    Parse,
    Server,
    Unknown,
    NoRef,
    ArchiveMalformed,
    TarballNotFound,
    NormalizationDegraded,
}

impl FetchErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::RateLimit => "RATE_LIMIT",
            Self::NotFound => "NOT_FOUND",
            Self::Network => "NETWORK",
            Self::Parse => "PARSE",
            Self::Server => "SERVER",
            Self::Unknown => "UNKNOWN",
            Self::NoRef => "NO_REF",
            Self::ArchiveMalformed => "ARCHIVE_MALFORMED",
            Self::TarballNotFound => "TARBALL_NOT_FOUND",
            Self::NormalizationDegraded => "NORMALIZATION_DEGRADED",
        }
    }

    /// Whether a failure of this kind lets the next adapter in the chain run.
    /// Auth failures do not: a missing or bad token would fail there too, and
    /// degrading silently would hide the misconfiguration.
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            Self::RateLimit
            | Self::NotFound
            | Self::Network
            | Self::Parse
            | Self::Server
            | Self::NoRef
            | Self::ArchiveMalformed
            | Self::TarballNotFound
            | Self::NormalizationDegraded
            | Self::Unknown => true,
            Self::Auth => false,
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
