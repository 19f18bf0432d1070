use super::VersionMap;

/// Parses the classic flat yarn.lock format:
///
/// ```text
/// "lodash@^4.17.0", "lodash@^4.17.15":
///   version "4.17.21"
/// ```
///
/// The format has no schema to violate; unrecognized blocks are skipped, so
/// parsing never fails.
pub(super) fn parse(raw: &str) -> VersionMap {
    let mut versions = VersionMap::new();
    let mut current_names: Vec<String> = Vec::new();

    for line in raw.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        if !line.starts_with(' ') {
            // Header line: comma-separated specs, optionally quoted.
            current_names = line
                .trim_end_matches(':')
                .split(',')
                .filter_map(|spec| package_name_from_spec(spec.trim().trim_matches('"')))
                .collect();
            current_names.sort();
            current_names.dedup();
            continue;
        }

        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("version ") {
            let version = rest.trim().trim_matches('"');
            if version.is_empty() {
                continue;
            }
            for name in current_names.drain(..) {
                versions.entry(name).or_insert_with(|| version.to_string());
            }
        }
    }

    versions
}

/// `lodash@^4.17.0` → `lodash`; `@types/node@^22.0.0` → `@types/node`.
fn package_name_from_spec(spec: &str) -> Option<String> {
    let idx = spec.rfind('@').filter(|idx| *idx > 0)?;
    let name = &spec[..idx];
    (!name.is_empty()).then(|| name.to_string())
}
