pub mod git_host;
pub mod http;
pub mod registry_archive;
pub mod rendered_docs;

use crate::config::{DocsSource, PackageEntry, SyncMode};
use crate::error::FetchError;

/// One file as fetched from a remote source, before any transformation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedFile {
    /// Path relative to the package's documentation scope.
    pub original_path: String,
    pub bytes: Vec<u8>,
}

/// Result of a successful adapter fetch. Adapters never write to disk.
#[derive(Clone, Debug)]
pub struct FetchedDocs {
    pub files: Vec<FetchedFile>,
    /// Tag name, branch name, archive sentinel, or rendered-page URL.
    pub reference: String,
    /// True when the content does not correspond to the exact requested
    /// version (for example a default-branch fallback).
    pub is_fallback: bool,
}

/// The uniform fetch contract every adapter implements.
pub trait Source {
    fn name(&self) -> &'static str;
    fn fetch(&self, entry: &PackageEntry, version: &str) -> Result<FetchedDocs, FetchError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    GitHost,
    RegistryArchive,
    RenderedDocs,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHost => "git_host",
            Self::RegistryArchive => "registry_archive",
            Self::RenderedDocs => "rendered_docs",
        }
    }
}

/// Ordered adapter chain for a mode. The first adapter is the primary; later
/// ones run only after a fallback-eligible failure. Hybrid mode does not
/// appear here: it composes two adapters per package and is driven by the
/// orchestrator directly.
pub fn fallback_chain(mode: SyncMode, docs_source: DocsSource) -> Vec<AdapterKind> {
    match (mode, docs_source) {
        (SyncMode::Lockfile, DocsSource::GitHost) => {
            vec![AdapterKind::GitHost, AdapterKind::RegistryArchive]
        }
        (SyncMode::Lockfile, DocsSource::RegistryArchive) => vec![AdapterKind::RegistryArchive],
        (SyncMode::LatestDocs, _) => vec![AdapterKind::RenderedDocs, AdapterKind::GitHost],
        (SyncMode::Hybrid, _) => vec![AdapterKind::GitHost],
    }
}

/// High-value document paths used when a package lists no explicit files.
pub const PREFERRED_PATHS: &[&str] = &[
    "README.md",
    "CHANGELOG.md",
    "CHANGES.md",
    "HISTORY.md",
    "LICENSE",
    "LICENSE.md",
    "index.html",
    "docs/README.md",
];

/// Hard cap on default-selection size; keeps tarball iteration and API
/// download fan-out bounded.
pub const MAX_DEFAULT_FILES: usize = 40;

/// Applies the preferred-set filter to a listing of scope-relative paths:
/// the preferred names plus any top-level `docs/*.md`, lexicographically
/// sorted and capped.
pub fn select_default_files(paths: &[String]) -> Vec<String> {
    let mut selected: Vec<String> = paths
        .iter()
        .filter(|path| is_preferred_path(path))
        .cloned()
        .collect();
    selected.sort();
    selected.dedup();
    selected.truncate(MAX_DEFAULT_FILES);
    selected
}

fn is_preferred_path(path: &str) -> bool {
    if PREFERRED_PATHS.contains(&path) {
        return true;
    }
    match path.strip_prefix("docs/") {
        Some(rest) => !rest.contains('/') && rest.ends_with(".md"),
        None => false,
    }
}

/// Scopes a repository-relative path to the configured subpath, returning
/// the remainder when it matches.
pub fn scope_path<'a>(path: &'a str, subpath: &str) -> Option<&'a str> {
    if subpath.is_empty() {
        return Some(path);
    }
    path.strip_prefix(subpath)
        .and_then(|rest| rest.strip_prefix('/'))
}
