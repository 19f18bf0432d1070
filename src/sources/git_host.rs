use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::http::{Http, url_with_segments};
use super::{FetchedDocs, FetchedFile, Source, scope_path, select_default_files};
use crate::config::PackageEntry;
use crate::error::{FetchError, FetchErrorKind};
use crate::fingerprint::canonical_subpath;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Branches probed when no release tag matches the target version.
const DEFAULT_BRANCHES: &[&str] = &["main", "master"];

#[derive(Clone, Debug)]
pub struct GitHostSource {
    http: Http,
    api_base: String,
    raw_base: String,
    token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ResolvedRef {
    pub reference: String,
    pub is_fallback: bool,
}

impl GitHostSource {
    pub fn new(http: Http, token: Option<String>) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            token,
        }
    }

    pub fn with_bases(
        http: Http,
        token: Option<String>,
        api_base: impl Into<String>,
        raw_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            raw_base: raw_base.into(),
            token,
        }
    }

    /// Credentials for the git host, if the environment carries any.
    pub fn token_from_env() -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Accept", "application/vnd.github+json".to_string())];
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("Bearer {token}")));
        }
        headers
    }

    /// Probes release-tag candidates in order, then the default branches.
    /// A branch hit is a fallback: the content may not match the requested
    /// version exactly.
    pub fn resolve_ref(
        &self,
        repo: &RepoId,
        name: &str,
        version: &str,
    ) -> Result<ResolvedRef, FetchError> {
        let candidates = [
            format!("v{version}"),
            version.to_string(),
            format!("{name}-v{version}"),
            format!("{name}-{version}"),
        ];

        for tag in &candidates {
            let url = self.api_url(&["repos", &repo.owner, &repo.name, "git", "ref", "tags", tag])?;
            match self.http.get(url.as_str(), &self.headers()) {
                Ok(_) => {
                    debug!(repo = %repo, tag = %tag, "resolved release tag");
                    return Ok(ResolvedRef {
                        reference: tag.clone(),
                        is_fallback: false,
                    });
                }
                Err(err) if err.kind == FetchErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            }
        }

        for branch in DEFAULT_BRANCHES {
            let url = self.api_url(&["repos", &repo.owner, &repo.name, "branches", branch])?;
            match self.http.get(url.as_str(), &self.headers()) {
                Ok(_) => {
                    debug!(repo = %repo, branch = %branch, "no version tag; falling back to default branch");
                    return Ok(ResolvedRef {
                        reference: branch.to_string(),
                        is_fallback: true,
                    });
                }
                Err(err) if err.kind == FetchErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            }
        }

        Err(FetchError::new(
            FetchErrorKind::NoRef,
            format!("no tag or default branch found for {repo} at version {version}"),
        ))
    }

    fn list_tree(&self, repo: &RepoId, reference: &str) -> Result<Vec<String>, FetchError> {
        let mut url =
            self.api_url(&["repos", &repo.owner, &repo.name, "git", "trees", reference])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let listing: TreeResponse = self.http.get_json(url.as_str(), &self.headers())?;
        Ok(listing
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    fn download(
        &self,
        repo: &RepoId,
        reference: &str,
        path: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let mut segments = vec![repo.owner.as_str(), repo.name.as_str(), reference];
        segments.extend(path.split('/'));
        let url = url_with_segments(&self.raw_base, &segments)?;
        self.http.get(url.as_str(), &self.headers())
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, FetchError> {
        url_with_segments(&self.api_base, segments)
    }
}

impl Source for GitHostSource {
    fn name(&self) -> &'static str {
        "git_host"
    }

    fn fetch(&self, entry: &PackageEntry, version: &str) -> Result<FetchedDocs, FetchError> {
        let repo = RepoId::parse(entry.repo.as_deref().unwrap_or(""))?;
        let subpath = canonical_subpath(entry.subpath.as_deref().unwrap_or(""));
        let resolved = self.resolve_ref(&repo, &entry.name, version)?;

        let relative_paths = if entry.files.is_empty() {
            let tree = self.list_tree(&repo, &resolved.reference)?;
            let scoped: Vec<String> = tree
                .iter()
                .filter_map(|path| scope_path(path, &subpath))
                .map(str::to_string)
                .collect();
            select_default_files(&scoped)
        } else {
            entry.files.clone()
        };

        let explicit = !entry.files.is_empty();
        let mut files = Vec::with_capacity(relative_paths.len());
        for relative in relative_paths {
            let full = if subpath.is_empty() {
                relative.clone()
            } else {
                format!("{subpath}/{relative}")
            };
            match self.download(&repo, &resolved.reference, &full) {
                Ok(bytes) => files.push(FetchedFile {
                    original_path: relative,
                    bytes,
                }),
                // Every explicit file is mandatory; a listed default that
                // vanished between listing and download is equally fatal.
                Err(err) if err.kind == FetchErrorKind::NotFound && explicit => {
                    return Err(FetchError::new(
                        FetchErrorKind::NotFound,
                        format!("configured file '{relative}' is absent at {repo}@{}", resolved.reference),
                    ));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(FetchedDocs {
            files,
            reference: resolved.reference,
            is_fallback: resolved.is_fallback,
        })
    }
}

/// `owner/name` repository coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let (owner, name) = raw.split_once('/').ok_or_else(|| {
            FetchError::new(
                FetchErrorKind::Unknown,
                format!("repo '{raw}' is not in owner/name form"),
            )
        })?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(FetchError::new(
                FetchErrorKind::Unknown,
                format!("repo '{raw}' is not in owner/name form"),
            ));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}
