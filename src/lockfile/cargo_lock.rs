use std::path::Path;

use serde::Deserialize;

use super::VersionMap;
use crate::error::LockfileError;

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
}

pub(super) fn parse(path: &Path, raw: &str) -> Result<VersionMap, LockfileError> {
    let lock: CargoLock = toml::from_str(raw).map_err(|source| LockfileError::Parse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let mut versions = VersionMap::new();
    for package in lock.package {
        // Cargo.lock is sorted; on duplicate names the first (lowest) entry
        // stays, matching the deterministic tie-break used elsewhere.
        versions.entry(package.name).or_insert(package.version);
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_package_entries() {
        let raw = r#"
version = 3

[[package]]
name = "serde"
version = "1.0.219"

[[package]]
name = "tokio"
version = "1.44.0"
dependencies = ["mio"]
"#;
        let versions = parse(Path::new("Cargo.lock"), raw).expect("parse");
        assert_eq!(versions.get("serde").map(String::as_str), Some("1.0.219"));
        assert_eq!(versions.get("tokio").map(String::as_str), Some("1.44.0"));
    }

    #[test]
    fn first_duplicate_wins() {
        let raw = r#"
[[package]]
name = "windows-sys"
version = "0.52.0"

[[package]]
name = "windows-sys"
version = "0.59.0"
"#;
        let versions = parse(Path::new("Cargo.lock"), raw).expect("parse");
        assert_eq!(
            versions.get("windows-sys").map(String::as_str),
            Some("0.52.0")
        );
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = parse(Path::new("Cargo.lock"), "[[package]\n").expect_err("should fail");
        assert!(matches!(err, LockfileError::Parse { .. }));
    }
}
