use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{Config, DocsSource, PackageEntry, SyncMode};
use crate::error::{FetchError, FetchErrorKind};
use crate::fingerprint::config_fingerprint;
use crate::lockfile::{self, VersionMap};
use crate::meta::{self, CacheDecision, MetaRecord, REGISTRY_ARCHIVE_REF, SourceKind};
use crate::registry::RegistryClient;
use crate::report::{PackageStatus, Report, SourceStats, StatusEntry};
use crate::sources::git_host::GitHostSource;
use crate::sources::http::Http;
use crate::sources::registry_archive::RegistryArchiveSource;
use crate::sources::rendered_docs::RenderedDocsSource;
use crate::sources::{AdapterKind, FetchedDocs, Source, fallback_chain};
use crate::store::{self, IndexEntry};
use crate::transform::{self, TransformContext, TransformedFile, is_changelog_path};

/// Output sink for user-facing progress lines. The engine never touches
/// process globals, so JSON mode can stay silent and tests can capture.
pub trait Reporter: Sync {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

pub struct TextReporter;

impl Reporter for TextReporter {
    fn info(&self, msg: &str) {
        println!("{msg}");
    }
    fn warn(&self, msg: &str) {
        println!("{msg}");
    }
    fn error(&self, msg: &str) {
        eprintln!("{msg}");
    }
}

/// JSON mode: the single report object is the only stdout output.
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// All remote adapters plus the registry metadata client, constructed once
/// per run. Base URLs are injectable for tests.
pub struct SourceSet {
    pub git_host: GitHostSource,
    pub registry_archive: RegistryArchiveSource,
    pub rendered_docs: RenderedDocsSource,
    pub registry: RegistryClient,
}

impl SourceSet {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = Http::new().map_err(|err| anyhow::anyhow!(err.message))?;
        let registry = RegistryClient::new(http.clone(), config.ecosystem);
        Ok(Self {
            git_host: GitHostSource::new(http.clone(), GitHostSource::token_from_env()),
            registry_archive: RegistryArchiveSource::new(registry.clone(), http.clone()),
            rendered_docs: RenderedDocsSource::new(http, config.ecosystem),
            registry,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SyncOptions {
    pub force: bool,
}

struct Job {
    entry: PackageEntry,
    fingerprint: String,
}

enum JobResult {
    CacheHit {
        record: Box<MetaRecord>,
    },
    Committed {
        record: Box<MetaRecord>,
        adapter: &'static str,
        used_fallback_adapter: bool,
        degraded: Option<String>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        code: String,
        reason: String,
        adapter: &'static str,
    },
}

struct JobOutcome {
    name: String,
    lock_version: Option<String>,
    attempted: Vec<&'static str>,
    result: JobResult,
}

/// Runs the full sync pipeline: prune, schedule package jobs across the
/// worker pool, commit artifacts, rewrite the global index, and assemble the
/// report. Single-package failures never abort the run.
pub fn run_sync(
    root: &Path,
    config: &Config,
    sources: &SourceSet,
    options: SyncOptions,
    reporter: &dyn Reporter,
) -> anyhow::Result<Report> {
    let output_dir = config.output_dir(root);
    let mode = config.settings.sync_mode;

    let versions: VersionMap = match mode {
        SyncMode::Lockfile | SyncMode::Hybrid => lockfile::resolve(root)?,
        // Latest mode resolves per package, inside the job, and only on a
        // cache miss.
        SyncMode::LatestDocs => VersionMap::new(),
    };

    if config.settings.prune && matches!(mode, SyncMode::Lockfile) {
        let removed = store::prune_stale(&output_dir, &config.packages, &versions)?;
        for dir_name in &removed {
            reporter.info(&format!("pruned {dir_name}"));
        }
    }

    let jobs: VecDeque<Job> = config
        .packages
        .iter()
        .map(|entry| Job {
            fingerprint: config_fingerprint(entry),
            entry: entry.clone(),
        })
        .collect();

    info!(
        packages = jobs.len(),
        mode = mode.as_str(),
        concurrency = config.settings.sync_concurrency,
        output_dir = %output_dir.display(),
        "starting sync"
    );

    let outcomes = run_pool(config, sources, &output_dir, &versions, options, jobs, reporter);

    let report = assemble_report(config, &outcomes);

    let mut index_entries: Vec<IndexEntry> = Vec::new();
    for outcome in &outcomes {
        let record = match &outcome.result {
            JobResult::CacheHit { record } => record,
            JobResult::Committed { record, .. } => record,
            _ => continue,
        };
        index_entries.push(IndexEntry {
            name: outcome.name.clone(),
            version: record.version.clone(),
            is_fallback: record.is_fallback,
        });
    }
    store::write_global_index(&output_dir, &index_entries)?;

    Ok(report)
}

fn run_pool(
    config: &Config,
    sources: &SourceSet,
    output_dir: &Path,
    versions: &VersionMap,
    options: SyncOptions,
    jobs: VecDeque<Job>,
    reporter: &dyn Reporter,
) -> Vec<JobOutcome> {
    let worker_count = config.settings.sync_concurrency.min(jobs.len()).max(1);
    let queue = Mutex::new(jobs);
    let outcomes: Mutex<Vec<JobOutcome>> = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| {
                loop {
                    let job = queue.lock().expect("job queue poisoned").pop_front();
                    let Some(job) = job else { break };

                    let outcome =
                        run_job(config, sources, output_dir, versions, options, job, reporter);
                    outcomes
                        .lock()
                        .expect("outcome list poisoned")
                        .push(outcome);
                }
            });
        }
    });

    outcomes.into_inner().expect("outcome list poisoned")
}

fn run_job(
    config: &Config,
    sources: &SourceSet,
    output_dir: &Path,
    versions: &VersionMap,
    options: SyncOptions,
    job: Job,
    reporter: &dyn Reporter,
) -> JobOutcome {
    let mode = config.settings.sync_mode;
    match mode {
        SyncMode::LatestDocs => {
            run_latest_job(config, sources, output_dir, options, job, reporter)
        }
        SyncMode::Lockfile | SyncMode::Hybrid => {
            run_lockfile_job(config, sources, output_dir, versions, options, job, reporter)
        }
    }
}

fn run_lockfile_job(
    config: &Config,
    sources: &SourceSet,
    output_dir: &Path,
    versions: &VersionMap,
    options: SyncOptions,
    job: Job,
    reporter: &dyn Reporter,
) -> JobOutcome {
    let name = job.entry.name.clone();
    let mode = config.settings.sync_mode;

    let Some(target_version) = versions.get(&name).cloned() else {
        reporter.warn(&format!("skip {name}: not in lockfile"));
        return JobOutcome {
            name,
            lock_version: None,
            attempted: Vec::new(),
            result: JobResult::Skipped {
                reason: "not present in the lockfile".to_string(),
            },
        };
    };

    let package_dir = store::package_dir(output_dir, &name, &target_version);
    let decision = meta::decide(
        &package_dir,
        &target_version,
        &job.fingerprint,
        mode,
        options.force,
        Utc::now(),
    );

    match decision {
        CacheDecision::Hit(record) => {
            debug!(package = %name, version = %target_version, "cache hit");
            JobOutcome {
                name,
                lock_version: Some(target_version),
                attempted: Vec::new(),
                result: JobResult::CacheHit { record },
            }
        }
        CacheDecision::Corrupted(detail) => {
            reporter.warn(&format!("{name}: metadata unreadable, refreshing ({detail})"));
            fetch_and_commit(config, sources, output_dir, &job, &target_version, reporter)
        }
        CacheDecision::Miss | CacheDecision::Revalidate(_) => {
            fetch_and_commit(config, sources, output_dir, &job, &target_version, reporter)
        }
    }
}

/// Drives the adapter chain for a lockfile or hybrid package and commits the
/// result. Fallback-eligible failures (including an empty fetch) move to the
/// next adapter in the chain.
fn fetch_and_commit(
    config: &Config,
    sources: &SourceSet,
    output_dir: &Path,
    job: &Job,
    target_version: &str,
    reporter: &dyn Reporter,
) -> JobOutcome {
    let name = job.entry.name.clone();
    let mode = config.settings.sync_mode;

    let fetched = if matches!(mode, SyncMode::Hybrid) {
        hybrid_fetch(sources, &job.entry, target_version, reporter)
    } else {
        chain_fetch(
            sources,
            &fallback_chain(mode, config.settings.docs_source),
            &job.entry,
            target_version,
            reporter,
        )
    };

    match fetched {
        Ok(fetch) => match commit_fetch(config, output_dir, job, target_version, &fetch) {
            Ok(record) => {
                reporter.info(&format!(
                    "synced {name}@{target_version} ({} file(s) via {})",
                    fetch.docs.files.len(),
                    fetch.adapter
                ));
                JobOutcome {
                    name,
                    lock_version: Some(target_version.to_string()),
                    attempted: fetch.attempted,
                    result: JobResult::Committed {
                        record: Box::new(record),
                        adapter: fetch.adapter,
                        used_fallback_adapter: fetch.used_fallback_adapter,
                        degraded: fetch.degraded,
                    },
                }
            }
            Err(err) => {
                let code = if err
                    .chain()
                    .any(|cause| cause.downcast_ref::<store::AtomicSwapError>().is_some())
                {
                    "ATOMICITY_FAIL"
                } else {
                    "IO"
                };
                reporter.error(&format!("failed {name}@{target_version}: {err:#}"));
                JobOutcome {
                    name,
                    lock_version: Some(target_version.to_string()),
                    attempted: fetch.attempted,
                    result: JobResult::Failed {
                        code: code.to_string(),
                        reason: format!("{err:#}"),
                        adapter: fetch.adapter,
                    },
                }
            }
        },
        Err(failure) => match failure.empty {
            true => {
                reporter.warn(&format!("skip {name}@{target_version}: no documentation files found"));
                JobOutcome {
                    name,
                    lock_version: Some(target_version.to_string()),
                    attempted: failure.attempted,
                    result: JobResult::Skipped {
                        reason: "no documentation files found at the resolved reference".to_string(),
                    },
                }
            }
            false => {
                reporter.error(&format!(
                    "failed {name}@{target_version}: {}",
                    failure.error.message
                ));
                JobOutcome {
                    name,
                    lock_version: Some(target_version.to_string()),
                    attempted: failure.attempted,
                    result: JobResult::Failed {
                        code: failure.error.kind.code().to_string(),
                        reason: failure.error.message.clone(),
                        adapter: failure.adapter,
                    },
                }
            }
        },
    }
}

struct ChainFetch {
    docs: FetchedDocs,
    adapter: &'static str,
    used_fallback_adapter: bool,
    attempted: Vec<&'static str>,
    source_kind: Option<SourceKind>,
    degraded: Option<String>,
}

struct ChainFailure {
    error: FetchError,
    adapter: &'static str,
    attempted: Vec<&'static str>,
    /// True when every adapter produced an empty listing rather than an
    /// error; reported as a skip, not a failure.
    empty: bool,
}

fn adapter_source<'a>(sources: &'a SourceSet, kind: AdapterKind) -> &'a dyn Source {
    match kind {
        AdapterKind::GitHost => &sources.git_host,
        AdapterKind::RegistryArchive => &sources.registry_archive,
        AdapterKind::RenderedDocs => &sources.rendered_docs,
    }
}

fn chain_fetch(
    sources: &SourceSet,
    chain: &[AdapterKind],
    entry: &PackageEntry,
    target_version: &str,
    reporter: &dyn Reporter,
) -> Result<ChainFetch, ChainFailure> {
    let mut attempted = Vec::new();
    let mut last_error: Option<(FetchError, &'static str)> = None;
    let mut saw_only_empty = true;

    for (position, kind) in chain.iter().enumerate() {
        let source = adapter_source(sources, *kind);
        attempted.push(source.name());
        let is_last = position + 1 == chain.len();

        match source.fetch(entry, target_version) {
            Ok(docs) if docs.files.is_empty() => {
                debug!(package = %entry.name, adapter = source.name(), "fetch returned no files");
                if !is_last {
                    reporter.warn(&format!(
                        "{}: {} returned no files, trying next source",
                        entry.name,
                        source.name()
                    ));
                }
                continue;
            }
            Ok(docs) => {
                let source_kind = match kind {
                    AdapterKind::RegistryArchive => Some(SourceKind::RegistryArchive),
                    AdapterKind::RenderedDocs => Some(SourceKind::Rendered),
                    AdapterKind::GitHost if position > 0 => Some(SourceKind::GitFallback),
                    AdapterKind::GitHost => None,
                };
                return Ok(ChainFetch {
                    docs,
                    adapter: source.name(),
                    used_fallback_adapter: position > 0,
                    attempted,
                    source_kind,
                    degraded: None,
                });
            }
            Err(err) => {
                saw_only_empty = false;
                if !is_last && err.kind.is_fallback_eligible() {
                    // The transition is logged; the absorbed error does not
                    // surface in the package's report entry.
                    warn!(
                        package = %entry.name,
                        adapter = source.name(),
                        error = %err,
                        "source failed, falling back to next in chain"
                    );
                    reporter.warn(&format!(
                        "{}: {} failed ({}), trying next source",
                        entry.name,
                        source.name(),
                        err.kind.code()
                    ));
                    last_error = Some((err, source.name()));
                    continue;
                }
                return Err(ChainFailure {
                    adapter: source.name(),
                    error: err,
                    attempted,
                    empty: false,
                });
            }
        }
    }

    match last_error {
        Some((error, adapter)) => Err(ChainFailure {
            error,
            adapter,
            attempted,
            empty: false,
        }),
        None => Err(ChainFailure {
            error: FetchError::new(FetchErrorKind::NotFound, "no documentation files found"),
            adapter: chain
                .last()
                .map(|kind| adapter_source(sources, *kind).name())
                .unwrap_or("git_host"),
            attempted,
            empty: saw_only_empty,
        }),
    }
}

/// Hybrid mode: changelog-family files come from the git host, everything
/// else from the registry archive. A registry failure falls back entirely to
/// the git host; a changelog failure yields a partial, degraded artifact.
fn hybrid_fetch(
    sources: &SourceSet,
    entry: &PackageEntry,
    target_version: &str,
    reporter: &dyn Reporter,
) -> Result<ChainFetch, ChainFailure> {
    let changelog_files: Vec<String> = entry
        .files
        .iter()
        .filter(|file| is_changelog_path(file))
        .cloned()
        .collect();
    let other_files: Vec<String> = entry
        .files
        .iter()
        .filter(|file| !is_changelog_path(file))
        .cloned()
        .collect();

    let registry_entry = PackageEntry {
        files: other_files,
        ..entry.clone()
    };

    let mut attempted = vec![sources.registry_archive.name()];
    let registry_docs = match sources.registry_archive.fetch(&registry_entry, target_version) {
        Ok(docs) => docs,
        Err(err) if err.kind.is_fallback_eligible() => {
            reporter.warn(&format!(
                "{}: registry archive failed ({}), falling back to git host entirely",
                entry.name,
                err.kind.code()
            ));
            attempted.push(sources.git_host.name());
            return match sources.git_host.fetch(entry, target_version) {
                Ok(docs) => Ok(ChainFetch {
                    docs,
                    adapter: sources.git_host.name(),
                    used_fallback_adapter: true,
                    attempted,
                    source_kind: Some(SourceKind::GitFallback),
                    degraded: None,
                }),
                Err(err) => Err(ChainFailure {
                    adapter: sources.git_host.name(),
                    error: err,
                    attempted,
                    empty: false,
                }),
            };
        }
        Err(err) => {
            return Err(ChainFailure {
                adapter: sources.registry_archive.name(),
                error: err,
                attempted,
                empty: false,
            });
        }
    };

    // Changelogs bundled into archives are often stale; the git host owns
    // that family in hybrid mode.
    let mut files: Vec<_> = registry_docs
        .files
        .into_iter()
        .filter(|file| !is_changelog_path(&file.original_path))
        .collect();

    let git_entry = PackageEntry {
        files: changelog_files,
        ..entry.clone()
    };
    attempted.push(sources.git_host.name());

    match sources.git_host.fetch(&git_entry, target_version) {
        Ok(git_docs) => {
            let reference = git_docs.reference.clone();
            let is_fallback = git_docs.is_fallback;
            files.extend(
                git_docs
                    .files
                    .into_iter()
                    .filter(|file| is_changelog_path(&file.original_path)),
            );
            Ok(ChainFetch {
                docs: FetchedDocs {
                    files,
                    reference,
                    is_fallback,
                },
                adapter: sources.registry_archive.name(),
                used_fallback_adapter: false,
                attempted,
                source_kind: Some(SourceKind::Mixed),
                degraded: None,
            })
        }
        Err(err) if err.kind.is_fallback_eligible() => {
            // Partial artifact: registry content without the changelog.
            reporter.warn(&format!(
                "{}: changelog fetch failed ({}), emitting partial artifact",
                entry.name,
                err.kind.code()
            ));
            Ok(ChainFetch {
                docs: FetchedDocs {
                    files,
                    reference: REGISTRY_ARCHIVE_REF.to_string(),
                    is_fallback: true,
                },
                adapter: sources.registry_archive.name(),
                used_fallback_adapter: false,
                attempted,
                source_kind: Some(SourceKind::Mixed),
                degraded: Some(format!(
                    "changelog unavailable from the git host: {}",
                    err.message
                )),
            })
        }
        Err(err) => Err(ChainFailure {
            adapter: sources.git_host.name(),
            error: err,
            attempted,
            empty: false,
        }),
    }
}

fn commit_fetch(
    config: &Config,
    output_dir: &Path,
    job: &Job,
    target_version: &str,
    fetch: &ChainFetch,
) -> anyhow::Result<MetaRecord> {
    let now = Utc::now();
    let is_fallback = fetch.docs.is_fallback || fetch.used_fallback_adapter;

    let source_label = if fetch.docs.reference == REGISTRY_ARCHIVE_REF {
        REGISTRY_ARCHIVE_REF.to_string()
    } else {
        job.entry
            .repo
            .clone()
            .unwrap_or_else(|| fetch.docs.reference.clone())
    };

    let ctx = TransformContext {
        source: source_label,
        reference: fetch.docs.reference.clone(),
        is_fallback,
        fetched_date: now.format("%Y-%m-%d").to_string(),
        target_version: target_version.to_string(),
        max_file_size_kb: config.settings.max_file_size_kb,
    };

    let transformed: Vec<TransformedFile> = fetch
        .docs
        .files
        .iter()
        .map(|file| transform::transform_file(&ctx, &file.original_path, file.bytes.clone()))
        .collect();

    let truncated_any = transformed.iter().any(|file| file.truncated);
    let artifact_bytes: u64 = transformed.iter().map(|file| file.bytes.len() as u64).sum();
    let artifact_sha256 = artifact_digest(&transformed);

    let latest_mode = matches!(config.settings.sync_mode, SyncMode::LatestDocs);
    let record = MetaRecord {
        schema_version: meta::SCHEMA_VERSION,
        version: target_version.to_string(),
        git_ref: fetch.docs.reference.clone(),
        is_fallback,
        fetched_at: now,
        config_hash: Some(job.fingerprint.clone()),
        sync_mode: latest_mode.then(|| config.settings.sync_mode.as_str().to_string()),
        source_kind: fetch.source_kind,
        upstream_latest_version: latest_mode.then(|| target_version.to_string()),
        upstream_checked_at: latest_mode.then_some(now),
        ttl_expires_at: latest_mode
            .then(|| now + Duration::hours(config.settings.latest_ttl_hours as i64)),
        artifact_format: latest_mode.then(|| "markdown".to_string()),
        artifact_bytes: latest_mode.then_some(artifact_bytes),
        artifact_sha256: latest_mode.then_some(artifact_sha256),
        truncated: latest_mode.then_some(truncated_any),
    };

    let summary = store::render_summary(&job.entry, target_version, &record, &transformed);
    store::commit_package(
        output_dir,
        &job.entry.name,
        target_version,
        &transformed,
        &summary,
        &record,
    )
    .with_context(|| format!("failed to commit {}@{target_version}", job.entry.name))?;

    Ok(record)
}

fn artifact_digest(files: &[TransformedFile]) -> String {
    let mut sorted: Vec<&TransformedFile> = files.iter().collect();
    sorted.sort_by(|lhs, rhs| lhs.file_name.cmp(&rhs.file_name));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(file.file_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(&file.bytes);
    }
    format!("{:x}", hasher.finalize())
}

fn run_latest_job(
    config: &Config,
    sources: &SourceSet,
    output_dir: &Path,
    options: SyncOptions,
    job: Job,
    reporter: &dyn Reporter,
) -> JobOutcome {
    let name = job.entry.name.clone();
    let now = Utc::now();

    // The cache decision is purely local: a fresh TTL short-circuits before
    // any upstream traffic.
    if !options.force
        && let Some(record) = fresh_latest_record(output_dir, &job, now)
    {
        debug!(package = %name, version = %record.version, "latest docs within TTL");
        return JobOutcome {
            name,
            lock_version: None,
            attempted: Vec::new(),
            result: JobResult::CacheHit { record },
        };
    }

    let latest = match sources.registry.latest_stable_version(&name) {
        Ok(latest) => latest,
        Err(err) => {
            reporter.error(&format!("failed {name}: could not resolve latest version ({err})"));
            return JobOutcome {
                name,
                lock_version: None,
                attempted: Vec::new(),
                result: JobResult::Failed {
                    code: err.kind.code().to_string(),
                    reason: format!("latest version resolution failed: {}", err.message),
                    adapter: "rendered_docs",
                },
            };
        }
    };

    let mut outcome = fetch_and_commit(config, sources, output_dir, &job, &latest, reporter);
    outcome.lock_version = None;
    outcome
}

fn fresh_latest_record(output_dir: &Path, job: &Job, now: chrono::DateTime<Utc>) -> Option<Box<MetaRecord>> {
    let dir_name_prefix = format!(
        "{}@",
        job.entry.name.replace('/', transform::FLATTEN_DELIMITER)
    );
    let entries = std::fs::read_dir(output_dir).ok()?;
    let mut candidates: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| {
            name.starts_with(&dir_name_prefix)
                && !name.contains(".tmp-")
                && !name.contains(".old-")
        })
        .collect();
    candidates.sort();
    let dir_name = candidates.pop()?;

    // decide() needs a target version latest mode does not know before the
    // upstream check, so the freshness test reads the record directly.
    match meta::read(&output_dir.join(dir_name)) {
        meta::MetaReadOutcome::Valid(record) => {
            let fingerprint_ok = record.config_hash.as_deref() == Some(job.fingerprint.as_str());
            let within_ttl = record.ttl_expires_at.is_some_and(|expires| expires >= now);
            (fingerprint_ok && within_ttl).then_some(record)
        }
        _ => None,
    }
}

fn assemble_report(config: &Config, outcomes: &[JobOutcome]) -> Report {
    let mode = config.settings.sync_mode;
    let latest_mode = matches!(mode, SyncMode::LatestDocs);

    let mut statuses = Vec::with_capacity(outcomes.len());
    let mut source_stats: BTreeMap<String, SourceStats> = BTreeMap::new();
    let mut error_codes: BTreeMap<String, u64> = BTreeMap::new();
    let mut issues = Vec::new();

    for outcome in outcomes {
        for adapter in &outcome.attempted {
            source_stats.entry(adapter.to_string()).or_default().attempted += 1;
        }

        let entry = match &outcome.result {
            JobResult::CacheHit { record } => {
                let status = if record.is_fallback {
                    PackageStatus::SyncedFallback
                } else {
                    PackageStatus::Synced
                };
                StatusEntry {
                    name: outcome.name.clone(),
                    lock_version: outcome.lock_version.clone(),
                    docs_version: Some(record.version.clone()),
                    status,
                    reason: "cache hit".to_string(),
                    mode: mode.as_str().to_string(),
                    source_kind: record.source_kind.map(|kind| kind.as_str().to_string()),
                    reason_code: if latest_mode {
                        "latest_cache_hit_ttl".to_string()
                    } else {
                        "lockfile_ok".to_string()
                    },
                }
            }
            JobResult::Committed {
                record,
                adapter,
                used_fallback_adapter,
                degraded,
            } => {
                let stats = source_stats.entry(adapter.to_string()).or_default();
                stats.synced += 1;
                if record.is_fallback || *used_fallback_adapter {
                    stats.fallback += 1;
                }

                let status = if record.is_fallback {
                    PackageStatus::SyncedFallback
                } else {
                    PackageStatus::Synced
                };
                let reason_code = if latest_mode {
                    match record.source_kind {
                        Some(SourceKind::Rendered) => "latest_ok_rendered",
                        _ => "latest_ok_fallback",
                    }
                } else {
                    "lockfile_ok"
                };
                let reason = match degraded {
                    Some(detail) => {
                        issues.push(format!("{}: degraded artifact ({detail})", outcome.name));
                        format!("synced with a degraded artifact: {detail}")
                    }
                    None => format!("synced via {adapter}"),
                };

                StatusEntry {
                    name: outcome.name.clone(),
                    lock_version: outcome.lock_version.clone(),
                    docs_version: Some(record.version.clone()),
                    status,
                    reason,
                    mode: mode.as_str().to_string(),
                    source_kind: record.source_kind.map(|kind| kind.as_str().to_string()),
                    reason_code: reason_code.to_string(),
                }
            }
            JobResult::Skipped { reason } => {
                issues.push(format!("{}: {reason}", outcome.name));
                StatusEntry {
                    name: outcome.name.clone(),
                    lock_version: outcome.lock_version.clone(),
                    docs_version: None,
                    status: PackageStatus::Missing,
                    reason: reason.clone(),
                    mode: mode.as_str().to_string(),
                    source_kind: None,
                    reason_code: "lockfile_missing".to_string(),
                }
            }
            JobResult::Failed { code, reason, .. } => {
                *error_codes.entry(code.clone()).or_default() += 1;
                issues.push(format!("{}: {reason}", outcome.name));
                let reason_code = if latest_mode {
                    "latest_outdated_refresh_failed"
                } else {
                    "lockfile_missing"
                };
                StatusEntry {
                    name: outcome.name.clone(),
                    lock_version: outcome.lock_version.clone(),
                    docs_version: None,
                    status: PackageStatus::Missing,
                    reason: reason.clone(),
                    mode: mode.as_str().to_string(),
                    source_kind: None,
                    reason_code: reason_code.to_string(),
                }
            }
        };
        statuses.push(entry);
    }

    issues.sort();
    Report::new(statuses, source_stats, error_codes, issues)
}
