mod cargo_lock;
mod npm_package_lock;
mod pnpm_lock;
mod yarn_lock;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LockfileError;

/// Exact pinned versions for every package the lockfile knows about.
pub type VersionMap = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockfileKind {
    CargoLock,
    NpmPackageLock,
    PnpmLock,
    YarnLock,
}

impl LockfileKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::CargoLock => "Cargo.lock",
            Self::NpmPackageLock => "package-lock.json",
            Self::PnpmLock => "pnpm-lock.yaml",
            Self::YarnLock => "yarn.lock",
        }
    }
}

/// Probe order; the first lockfile present at the project root wins.
const DETECTION_ORDER: &[LockfileKind] = &[
    LockfileKind::CargoLock,
    LockfileKind::NpmPackageLock,
    LockfileKind::PnpmLock,
    LockfileKind::YarnLock,
];

pub fn detect(root: &Path) -> Option<(LockfileKind, PathBuf)> {
    DETECTION_ORDER.iter().find_map(|kind| {
        let path = root.join(kind.file_name());
        path.exists().then_some((*kind, path))
    })
}

pub fn resolve(root: &Path) -> Result<VersionMap, LockfileError> {
    let Some((kind, path)) = detect(root) else {
        return Err(LockfileError::NotFound(root.to_path_buf()));
    };

    let raw = std::fs::read_to_string(&path).map_err(|source| LockfileError::Read {
        path: path.clone(),
        source,
    })?;

    let versions = match kind {
        LockfileKind::CargoLock => cargo_lock::parse(&path, &raw)?,
        LockfileKind::NpmPackageLock => npm_package_lock::parse(&path, &raw)?,
        LockfileKind::PnpmLock => pnpm_lock::parse(&path, &raw)?,
        LockfileKind::YarnLock => yarn_lock::parse(&raw),
    };

    debug!(
        lockfile = kind.file_name(),
        entries = versions.len(),
        "resolved version map from lockfile"
    );

    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_prefers_cargo_lock() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("yarn.lock"), "").expect("write");
        std::fs::write(temp.path().join("Cargo.lock"), "").expect("write");

        let (kind, _) = detect(temp.path()).expect("detected");
        assert_eq!(kind, LockfileKind::CargoLock);
    }

    #[test]
    fn missing_lockfile_is_typed_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve(temp.path()).expect_err("should fail");
        assert!(matches!(err, LockfileError::NotFound(_)));
        assert_eq!(err.code(), "LOCKFILE_NOT_FOUND");
    }
}
