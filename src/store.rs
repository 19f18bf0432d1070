use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{debug, warn};

use crate::config::PackageEntry;
use crate::lockfile::VersionMap;
use crate::meta::{self, MetaRecord};
use crate::transform::{FLATTEN_DELIMITER, TransformedFile};

pub const INDEX_FILE_NAME: &str = "_INDEX.md";
pub const SUMMARY_FILE_NAME: &str = "_SUMMARY.md";

/// Marker attached when the directory swap itself fails, so callers can
/// classify the failure separately from ordinary I/O errors.
#[derive(Debug)]
pub struct AtomicSwapError;

impl std::fmt::Display for AtomicSwapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to swap the package directory into place")
    }
}

impl std::error::Error for AtomicSwapError {}

/// Scoped npm names carry a `/`; it flattens to the same double delimiter
/// used for file names, so `@types/node@22.5.0` becomes
/// `@types__node@22.5.0` on disk.
pub fn package_dir_name(name: &str, version: &str) -> String {
    format!("{}@{version}", name.replace('/', FLATTEN_DELIMITER))
}

pub fn package_dir(output_dir: &Path, name: &str, version: &str) -> PathBuf {
    output_dir.join(package_dir_name(name, version))
}

/// Replaces the package directory as a single observable step: everything is
/// staged into a temporary sibling, then swapped in via rename. A crash
/// leaves either the previous directory or the new one, never a partial mix.
pub fn commit_package(
    output_dir: &Path,
    name: &str,
    version: &str,
    files: &[TransformedFile],
    summary: &str,
    record: &MetaRecord,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(output_dir).with_context(|| {
        format!("failed to create output directory {}", output_dir.display())
    })?;

    let final_dir = package_dir(output_dir, name, version);
    let suffix = unique_suffix();
    let tmp_dir = output_dir.join(format!("{}.tmp-{suffix}", package_dir_name(name, version)));

    let staged = stage_package(&tmp_dir, files, summary, record);
    if let Err(err) = staged {
        let _ = fs::remove_dir_all(&tmp_dir);
        return Err(err);
    }

    if final_dir.exists() {
        let old_dir = output_dir.join(format!("{}.old-{suffix}", package_dir_name(name, version)));
        fs::rename(&final_dir, &old_dir).with_context(|| {
            format!(
                "failed to move previous package directory aside at {}",
                final_dir.display()
            )
        })?;

        if let Err(err) = fs::rename(&tmp_dir, &final_dir) {
            // Put the previous state back before surfacing the failure.
            let _ = fs::rename(&old_dir, &final_dir);
            let _ = fs::remove_dir_all(&tmp_dir);
            return Err(err).context(AtomicSwapError).with_context(|| {
                format!(
                    "failed to swap new package directory into place at {}",
                    final_dir.display()
                )
            });
        }

        if let Err(err) = fs::remove_dir_all(&old_dir) {
            warn!(
                path = %old_dir.display(),
                error = %err,
                "failed to remove replaced package directory"
            );
        }
    } else {
        fs::rename(&tmp_dir, &final_dir).with_context(|| {
            format!(
                "failed to move package directory into place at {}",
                final_dir.display()
            )
        })?;
    }

    Ok(final_dir)
}

fn stage_package(
    tmp_dir: &Path,
    files: &[TransformedFile],
    summary: &str,
    record: &MetaRecord,
) -> anyhow::Result<()> {
    fs::create_dir_all(tmp_dir)
        .with_context(|| format!("failed to create staging directory {}", tmp_dir.display()))?;

    for file in files {
        let path = tmp_dir.join(&file.file_name);
        fs::write(&path, &file.bytes)
            .with_context(|| format!("failed to write staged file {}", path.display()))?;
    }

    fs::write(tmp_dir.join(SUMMARY_FILE_NAME), summary).with_context(|| {
        format!("failed to write staged summary in {}", tmp_dir.display())
    })?;

    let meta_toml = meta::to_toml(record)?;
    fs::write(tmp_dir.join(meta::META_FILE_NAME), meta_toml).with_context(|| {
        format!("failed to write staged metadata in {}", tmp_dir.display())
    })?;

    Ok(())
}

/// Removes every `<name>@<version>` directory whose name is not configured
/// or whose version no longer matches the lock target, plus any leftover
/// staging directories from interrupted runs. Returns the removed directory
/// names, sorted.
pub fn prune_stale(
    output_dir: &Path,
    packages: &[PackageEntry],
    versions: &VersionMap,
) -> anyhow::Result<Vec<String>> {
    let mut removed = Vec::new();
    if !output_dir.exists() {
        return Ok(removed);
    }

    let entries = fs::read_dir(output_dir)
        .with_context(|| format!("failed to read output directory {}", output_dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| {
            format!(
                "failed to read entry from output directory {}",
                output_dir.display()
            )
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let dir_name = entry.file_name().to_string_lossy().to_string();
        if is_live_package_dir(&dir_name, packages, versions) {
            continue;
        }

        debug!(dir = %dir_name, "pruning stale package directory");
        fs::remove_dir_all(&path)
            .with_context(|| format!("failed to prune directory {}", path.display()))?;
        removed.push(dir_name);
    }

    removed.sort();
    Ok(removed)
}

fn is_live_package_dir(
    dir_name: &str,
    packages: &[PackageEntry],
    versions: &VersionMap,
) -> bool {
    packages.iter().any(|package| {
        versions
            .get(&package.name)
            .is_some_and(|target| package_dir_name(&package.name, target) == dir_name)
    })
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    pub is_fallback: bool,
}

/// Rewrites `_INDEX.md` listing the synced set in lexicographic order. The
/// write is skipped when the rendered bytes match what is on disk, so a
/// no-change rerun rewrites nothing.
pub fn write_global_index(output_dir: &Path, entries: &[IndexEntry]) -> anyhow::Result<()> {
    let mut sorted = entries.to_vec();
    sorted.sort();

    let mut content = String::from("# Mirrored dependency docs\n\n");
    if sorted.is_empty() {
        content.push_str("No packages synced.\n");
    } else {
        for entry in &sorted {
            content.push_str(&format!("- {}@{}", entry.name, entry.version));
            if entry.is_fallback {
                content.push_str(" (fallback)");
            }
            content.push('\n');
        }
    }

    let path = output_dir.join(INDEX_FILE_NAME);
    if let Ok(existing) = fs::read_to_string(&path)
        && existing == content
    {
        return Ok(());
    }

    fs::create_dir_all(output_dir).with_context(|| {
        format!("failed to create output directory {}", output_dir.display())
    })?;
    let tmp_path = output_dir.join(format!("{INDEX_FILE_NAME}.tmp-{}", unique_suffix()));
    fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write temporary index {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path)
        .with_context(|| format!("failed to replace index {}", path.display()))?;
    Ok(())
}

/// Renders the per-package `_SUMMARY.md`: AI notes, a files table, and the
/// provenance block.
pub fn render_summary(
    entry: &PackageEntry,
    version: &str,
    record: &MetaRecord,
    files: &[TransformedFile],
) -> String {
    let mut out = format!("# {}@{}\n\n", entry.name, version);

    if let Some(notes) = entry.ai_notes.as_deref()
        && !notes.trim().is_empty()
    {
        out.push_str("## AI Notes\n\n");
        out.push_str(notes.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Files\n\n");
    out.push_str("| File | Origin | Size |\n");
    out.push_str("| --- | --- | --- |\n");
    for file in files {
        out.push_str(&format!(
            "| {} | {} | {} B |\n",
            file.file_name,
            file.original_path,
            file.bytes.len()
        ));
    }
    out.push('\n');

    out.push_str("## Provenance\n\n");
    out.push_str(&format!("- Ref: `{}`\n", record.git_ref));
    if let Some(kind) = record.source_kind {
        out.push_str(&format!("- Source kind: {}\n", kind.as_str()));
    }
    if record.is_fallback {
        out.push_str("- Fallback: the pinned version had no matching tag\n");
    }
    out.push_str(&format!(
        "- Fetched: {}\n",
        record.fetched_at.format("%Y-%m-%d")
    ));

    out
}

fn unique_suffix() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    format!("{}-{}", std::process::id(), timestamp)
}
