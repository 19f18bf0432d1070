use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::VersionMap;
use crate::error::LockfileError;

#[derive(Debug, Deserialize)]
struct PnpmLock {
    #[serde(default)]
    packages: Option<BTreeMap<String, serde_yml::Value>>,
}

pub(super) fn parse(path: &Path, raw: &str) -> Result<VersionMap, LockfileError> {
    let lock: PnpmLock = serde_yml::from_str(raw).map_err(|source| LockfileError::Parse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let mut versions = VersionMap::new();
    let Some(packages) = lock.packages else {
        return Ok(versions);
    };

    for key in packages.keys() {
        if let Some((name, version)) = split_package_key(key) {
            versions.entry(name).or_insert(version);
        }
    }

    Ok(versions)
}

/// Keys look like `/lodash@4.17.21` or `/@types/node@22.5.0(peer@1.0.0)`;
/// pnpm 9 drops the leading slash. Peer-dependency suffixes in parentheses
/// are not part of the version.
fn split_package_key(key: &str) -> Option<(String, String)> {
    let key = key.strip_prefix('/').unwrap_or(key);
    let key = match key.find('(') {
        Some(idx) => &key[..idx],
        None => key,
    };

    let (name, version) = key.rsplit_once('@')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}
