use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::VersionMap;
use crate::error::LockfileError;

#[derive(Debug, Deserialize)]
struct NpmPackageLock {
    #[serde(default)]
    packages: Option<BTreeMap<String, NpmPackageEntry>>,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, NpmLegacyDependency>>,
}

#[derive(Debug, Deserialize)]
struct NpmPackageEntry {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NpmLegacyDependency {
    #[serde(default)]
    version: Option<String>,
}

pub(super) fn parse(path: &Path, raw: &str) -> Result<VersionMap, LockfileError> {
    let lock: NpmPackageLock = serde_json::from_str(raw).map_err(|source| LockfileError::Parse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let mut versions = VersionMap::new();

    if let Some(packages) = lock.packages {
        // Key depth tracks nesting under node_modules; the shallowest entry
        // is the project's direct install and wins over hoisted duplicates.
        let mut best_depth: BTreeMap<String, usize> = BTreeMap::new();
        for (key, entry) in packages {
            if key.is_empty() {
                continue;
            }
            let Some(name) = package_name_from_lock_key(&key) else {
                continue;
            };
            let Some(version) = entry.version else {
                continue;
            };

            let depth = key.matches("node_modules/").count();
            match best_depth.get(&name) {
                Some(existing) if *existing <= depth => {}
                _ => {
                    best_depth.insert(name.clone(), depth);
                    versions.insert(name, version);
                }
            }
        }
    }

    if versions.is_empty()
        && let Some(dependencies) = lock.dependencies
    {
        for (name, dep) in dependencies {
            if let Some(version) = dep.version {
                versions.insert(name, version);
            }
        }
    }

    Ok(versions)
}

fn package_name_from_lock_key(key: &str) -> Option<String> {
    let marker = "node_modules/";
    key.rfind(marker)
        .and_then(|idx| key.get(idx + marker.len()..))
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
}
