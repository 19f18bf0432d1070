use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;

use super::http::Http;
use super::{FetchedDocs, FetchedFile, Source, scope_path, select_default_files};
use crate::config::PackageEntry;
use crate::error::{FetchError, FetchErrorKind};
use crate::fingerprint::canonical_subpath;
use crate::meta::REGISTRY_ARCHIVE_REF;
use crate::registry::RegistryClient;

#[derive(Clone, Debug)]
pub struct RegistryArchiveSource {
    registry: RegistryClient,
    http: Http,
}

impl RegistryArchiveSource {
    pub fn new(registry: RegistryClient, http: Http) -> Self {
        Self { registry, http }
    }
}

impl Source for RegistryArchiveSource {
    fn name(&self) -> &'static str {
        "registry_archive"
    }

    fn fetch(&self, entry: &PackageEntry, version: &str) -> Result<FetchedDocs, FetchError> {
        let subpath = canonical_subpath(entry.subpath.as_deref().unwrap_or(""));
        let info = self.registry.archive_info(&entry.name, version)?;

        // Fast path: a lone README request can be served from the registry
        // metadata document without downloading the archive at all.
        if subpath.is_empty()
            && entry.files.len() == 1
            && entry.files[0] == "README.md"
            && let Some(readme) = info.inline_readme
            && !readme.trim().is_empty()
        {
            debug!(name = %entry.name, version, "serving README from inline registry metadata");
            return Ok(FetchedDocs {
                files: vec![FetchedFile {
                    original_path: "README.md".to_string(),
                    bytes: readme.into_bytes(),
                }],
                reference: REGISTRY_ARCHIVE_REF.to_string(),
                is_fallback: false,
            });
        }

        let archive = self
            .http
            .get(&info.tarball_url, &[])
            .map_err(|err| match err.kind {
                FetchErrorKind::NotFound => FetchError::new(
                    FetchErrorKind::TarballNotFound,
                    format!("archive for {}@{version} is unavailable: {}", entry.name, err.message),
                ),
                _ => err,
            })?;

        let entries = extract_doc_entries(&archive, &subpath)?;

        let files = if entry.files.is_empty() {
            let paths: Vec<String> = entries.iter().map(|(path, _)| path.clone()).collect();
            let selected = select_default_files(&paths);
            selected
                .into_iter()
                .filter_map(|path| {
                    entries
                        .iter()
                        .find(|(candidate, _)| *candidate == path)
                        .map(|(path, bytes)| FetchedFile {
                            original_path: path.clone(),
                            bytes: bytes.clone(),
                        })
                })
                .collect()
        } else {
            let mut files = Vec::with_capacity(entry.files.len());
            for requested in &entry.files {
                let Some((path, bytes)) = entries
                    .iter()
                    .find(|(candidate, _)| candidate == requested)
                else {
                    return Err(FetchError::new(
                        FetchErrorKind::NotFound,
                        format!(
                            "configured file '{requested}' is absent from the {}@{version} archive",
                            entry.name
                        ),
                    ));
                };
                files.push(FetchedFile {
                    original_path: path.clone(),
                    bytes: bytes.clone(),
                });
            }
            files
        };

        Ok(FetchedDocs {
            files,
            reference: REGISTRY_ARCHIVE_REF.to_string(),
            is_fallback: false,
        })
    }
}

/// Streams the gzipped tarball in memory, yielding `(scoped_path, bytes)`
/// for regular files under the subpath. The archive's single top-level
/// directory (`<name>-<version>/` on crates.io, `package/` on npm) is
/// stripped; absolute and parent-escaping paths are rejected.
fn extract_doc_entries(
    archive_bytes: &[u8],
    subpath: &str,
) -> Result<Vec<(String, Vec<u8>)>, FetchError> {
    let decoder = GzDecoder::new(archive_bytes);
    let mut archive = tar::Archive::new(decoder);

    let malformed = |detail: String| FetchError::new(FetchErrorKind::ArchiveMalformed, detail);

    let mut out = Vec::new();
    let entries = archive
        .entries()
        .map_err(|err| malformed(format!("failed to read archive entries: {err}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|err| malformed(format!("failed to read archive entry: {err}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry
            .path()
            .map_err(|err| malformed(format!("archive entry has invalid path: {err}")))?
            .to_string_lossy()
            .replace('\\', "/");

        if raw_path.starts_with('/')
            || raw_path.split('/').any(|segment| segment == "..")
        {
            debug!(path = %raw_path, "rejecting unsafe archive entry path");
            continue;
        }

        // Drop the archive's top-level directory; top-level entries without
        // one are not package content.
        let Some((_, inner)) = raw_path.split_once('/') else {
            continue;
        };
        let Some(scoped) = scope_path(inner, subpath) else {
            continue;
        };
        if scoped.is_empty() {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| malformed(format!("failed to read archive entry '{raw_path}': {err}")))?;
        out.push((scoped.to_string(), bytes));
    }

    Ok(out)
}
