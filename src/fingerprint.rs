use sha2::{Digest, Sha256};

use crate::config::PackageEntry;

/// Digest width in hex chars. Collisions are across a single project's
/// package list, so 64 bits is comfortable.
const FINGERPRINT_LEN: usize = 16;

/// Stable digest over the inputs that affect fetch output: repo, canonical
/// subpath, and the sorted file list. Descriptive fields (`ai_notes`) are
/// excluded so editing them never invalidates the cache.
pub fn config_fingerprint(entry: &PackageEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.repo.as_deref().unwrap_or("").trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_subpath(entry.subpath.as_deref().unwrap_or("")).as_bytes());
    hasher.update(b"\n");

    let mut files = entry.files.clone();
    files.sort();
    for file in &files {
        hasher.update(file.as_bytes());
        hasher.update(b"\n");
    }

    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    hex[..FINGERPRINT_LEN].to_string()
}

/// Forward-slash separators, empty boundary segments stripped:
/// `"/docs\api/"` and `"docs/api"` canonicalize identically.
pub fn canonical_subpath(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
