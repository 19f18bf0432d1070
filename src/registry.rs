use std::collections::BTreeMap;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::config::Ecosystem;
use crate::error::{FetchError, FetchErrorKind};
use crate::sources::http::{Http, url_with_segments};

pub const DEFAULT_CRATES_API_BASE: &str = "https://crates.io";
pub const DEFAULT_NPM_REGISTRY_BASE: &str = "https://registry.npmjs.org";

/// Metadata client for the package registry of the active ecosystem:
/// latest-version resolution and archive location lookup.
#[derive(Clone, Debug)]
pub struct RegistryClient {
    http: Http,
    ecosystem: Ecosystem,
    crates_api_base: String,
    npm_base: String,
}

#[derive(Clone, Debug)]
pub struct ArchiveInfo {
    pub tarball_url: String,
    /// Registry-provided README body, when the metadata document carries one
    /// inline (npm does; crates.io does not).
    pub inline_readme: Option<String>,
}

impl RegistryClient {
    pub fn new(http: Http, ecosystem: Ecosystem) -> Self {
        Self {
            http,
            ecosystem,
            crates_api_base: DEFAULT_CRATES_API_BASE.to_string(),
            npm_base: DEFAULT_NPM_REGISTRY_BASE.to_string(),
        }
    }

    pub fn with_bases(
        http: Http,
        ecosystem: Ecosystem,
        crates_api_base: impl Into<String>,
        npm_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            ecosystem,
            crates_api_base: crates_api_base.into(),
            npm_base: npm_base.into(),
        }
    }

    /// Highest stable published version. Prereleases are skipped; the
    /// registry's own "max stable" answer is preferred where it exists.
    pub fn latest_stable_version(&self, name: &str) -> Result<String, FetchError> {
        match self.ecosystem {
            Ecosystem::Rust => self.crates_latest(name),
            Ecosystem::Node => self.npm_latest(name),
        }
    }

    pub fn archive_info(&self, name: &str, version: &str) -> Result<ArchiveInfo, FetchError> {
        match self.ecosystem {
            Ecosystem::Rust => self.crates_archive_info(name, version),
            Ecosystem::Node => self.npm_archive_info(name, version),
        }
    }

    fn crates_latest(&self, name: &str) -> Result<String, FetchError> {
        let url = url_with_segments(&self.crates_api_base, &["api", "v1", "crates", name])?;
        let doc: CratesCrateResponse = self.http.get_json(url.as_str(), &[])?;

        doc.krate
            .max_stable_version
            .or(doc.krate.max_version)
            .ok_or_else(|| {
                FetchError::new(
                    FetchErrorKind::Parse,
                    format!("crates.io metadata for '{name}' carries no version"),
                )
            })
    }

    fn npm_latest(&self, name: &str) -> Result<String, FetchError> {
        let doc = self.npm_metadata(name)?;
        let latest = doc
            .dist_tags
            .as_ref()
            .and_then(|tags| tags.get("latest").cloned());

        match latest {
            Some(version) if !is_prerelease(&version) => Ok(version),
            _ => doc
                .versions
                .as_ref()
                .map(|versions| versions.keys().map(String::as_str))
                .and_then(max_stable_version)
                .ok_or_else(|| {
                    FetchError::new(
                        FetchErrorKind::Parse,
                        format!("npm metadata for '{name}' carries no stable version"),
                    )
                }),
        }
    }

    fn crates_archive_info(&self, name: &str, version: &str) -> Result<ArchiveInfo, FetchError> {
        let url = url_with_segments(&self.crates_api_base, &["api", "v1", "crates", name, version])?;
        let doc: CratesVersionResponse =
            self.http.get_json(url.as_str(), &[]).map_err(tarball_not_found)?;

        let download = join_raw_path(&self.crates_api_base, &doc.version.dl_path)?;
        debug!(name, version, url = %download, "resolved crate archive URL");
        Ok(ArchiveInfo {
            tarball_url: download,
            inline_readme: None,
        })
    }

    fn npm_archive_info(&self, name: &str, version: &str) -> Result<ArchiveInfo, FetchError> {
        let doc = self.npm_metadata(name)?;

        let tarball = doc
            .versions
            .as_ref()
            .and_then(|versions| versions.get(version))
            .and_then(|entry| entry.dist.as_ref())
            .map(|dist| dist.tarball.clone())
            .ok_or_else(|| {
                FetchError::new(
                    FetchErrorKind::TarballNotFound,
                    format!("npm registry has no tarball for {name}@{version}"),
                )
            })?;

        debug!(name, version, url = %tarball, "resolved npm archive URL");
        Ok(ArchiveInfo {
            tarball_url: tarball,
            inline_readme: doc.readme,
        })
    }

    fn npm_metadata(&self, name: &str) -> Result<NpmPackageResponse, FetchError> {
        let url = url_with_segments(&self.npm_base, &[name])?;
        self.http.get_json(url.as_str(), &[])
    }
}

fn tarball_not_found(err: FetchError) -> FetchError {
    match err.kind {
        FetchErrorKind::NotFound => FetchError::new(FetchErrorKind::TarballNotFound, err.message),
        _ => err,
    }
}

fn join_raw_path(base: &str, path: &str) -> Result<String, FetchError> {
    let url = Url::parse(base)
        .and_then(|base| base.join(path))
        .map_err(|err| {
            FetchError::new(
                FetchErrorKind::Parse,
                format!("invalid download path '{path}' relative to {base}: {err}"),
            )
        })?;
    Ok(url.to_string())
}

fn is_prerelease(version: &str) -> bool {
    version.contains('-')
}

/// Picks the numerically greatest `X.Y.Z` among stable versions. Returns
/// None when every candidate is a prerelease or unparsable.
fn max_stable_version<'a>(versions: impl Iterator<Item = &'a str>) -> Option<String> {
    versions
        .filter(|version| !is_prerelease(version))
        .filter_map(|version| parse_triple(version).map(|triple| (triple, version)))
        .max_by_key(|(triple, _)| *triple)
        .map(|(_, version)| version.to_string())
}

fn parse_triple(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

#[derive(Debug, Deserialize)]
struct CratesCrateResponse {
    #[serde(rename = "crate")]
    krate: CratesCrateEntry,
}

#[derive(Debug, Deserialize)]
struct CratesCrateEntry {
    #[serde(default)]
    max_stable_version: Option<String>,
    #[serde(default)]
    max_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CratesVersionResponse {
    version: CratesVersionEntry,
}

#[derive(Debug, Deserialize)]
struct CratesVersionEntry {
    dl_path: String,
}

#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(default, rename = "dist-tags")]
    dist_tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    versions: Option<BTreeMap<String, NpmVersionEntry>>,
    #[serde(default)]
    readme: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NpmVersionEntry {
    #[serde(default)]
    dist: Option<NpmDistEntry>,
}

#[derive(Debug, Deserialize)]
struct NpmDistEntry {
    tarball: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_stable_skips_prereleases() {
        let versions = ["1.0.0", "1.2.0-beta.1", "1.1.3"];
        assert_eq!(
            max_stable_version(versions.iter().copied()).as_deref(),
            Some("1.1.3")
        );
    }

    #[test]
    fn max_stable_none_when_all_prerelease() {
        let versions = ["1.0.0-rc.1", "2.0.0-alpha"];
        assert_eq!(max_stable_version(versions.iter().copied()), None);
    }

    #[test]
    fn segments_are_percent_encoded() {
        let url = url_with_segments("https://registry.npmjs.org", &["@types/node"]).expect("url");
        assert_eq!(url.as_str(), "https://registry.npmjs.org/@types%2Fnode");
    }

    #[test]
    fn raw_download_path_joins_against_base() {
        let url = join_raw_path(
            "https://crates.io",
            "/api/v1/crates/serde/1.0.219/download",
        )
        .expect("url");
        assert_eq!(url, "https://crates.io/api/v1/crates/serde/1.0.219/download");
    }

    #[test]
    fn version_triples_compare_numerically() {
        assert!(parse_triple("1.10.0") > parse_triple("1.9.9"));
        assert_eq!(parse_triple("1.2"), None);
        assert_eq!(parse_triple("1.2.x"), None);
    }
}
