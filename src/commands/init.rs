use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::config::{self, CONFIG_FILE_NAME, Ecosystem};

const RUST_TEMPLATE: &str = r#"# aifd configuration.
#
# Each [packages.<name>] entry mirrors that dependency's documentation into
# the output directory, pinned to the version in Cargo.lock.

[settings]
# output_dir = "fdocs/rust"
# max_file_size_kb = 512
# sync_concurrency = 8
# docs_source = "git_host"        # or "registry_archive"
# sync_mode = "lockfile"          # or "latest_docs", "hybrid"

[packages]
# [packages.serde]
# repo = "serde-rs/serde"
# files = ["README.md", "CHANGELOG.md"]
# ai_notes = "Prefer derive macros over manual impls."
"#;

const NODE_TEMPLATE: &str = r#"# aifd configuration.
#
# Each [packages.<name>] entry mirrors that dependency's documentation into
# the output directory, pinned to the version in the project lockfile.

[settings]
# output_dir = "fdocs/node"
# max_file_size_kb = 200
# sync_concurrency = 8
# docs_source = "registry_archive"  # or "git_host"
# sync_mode = "lockfile"            # or "latest_docs", "hybrid"

[packages]
# [packages.lodash]
# repo = "lodash/lodash"
# files = ["README.md"]
"#;

pub(super) fn run(root: &Path, force: bool) -> anyhow::Result<i32> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        println!(
            "No-op: {} already exists; pass --force to replace it",
            path.display()
        );
        return Ok(0);
    }

    let ecosystem = config::detect_ecosystem(root);
    let template = match ecosystem {
        Ecosystem::Rust => RUST_TEMPLATE,
        Ecosystem::Node => NODE_TEMPLATE,
    };

    std::fs::write(&path, template)
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), ecosystem = ecosystem.as_str(), "wrote starter configuration");
    println!(
        "Created {} ({} profile). Add packages and run `aifd sync`.",
        path.display(),
        ecosystem.as_str()
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_template_and_refuses_overwrite() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("Cargo.lock"), "").expect("write lockfile");

        assert_eq!(run(temp.path(), false).expect("init"), 0);
        let written =
            std::fs::read_to_string(temp.path().join(CONFIG_FILE_NAME)).expect("read config");
        assert!(written.contains("fdocs/rust"));

        // A second init without --force must not clobber edits.
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "[packages]\n").expect("edit config");
        assert_eq!(run(temp.path(), false).expect("init"), 0);
        let kept =
            std::fs::read_to_string(temp.path().join(CONFIG_FILE_NAME)).expect("read config");
        assert_eq!(kept, "[packages]\n");

        assert_eq!(run(temp.path(), true).expect("init"), 0);
        let replaced =
            std::fs::read_to_string(temp.path().join(CONFIG_FILE_NAME)).expect("read config");
        assert!(replaced.contains("fdocs/rust"));
    }

    #[test]
    fn template_is_loadable() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("package-lock.json"), "{}").expect("write lockfile");

        run(temp.path(), false).expect("init");
        let config = config::load(temp.path(), None).expect("load template");
        assert!(config.packages.is_empty());
        assert_eq!(config.ecosystem, Ecosystem::Node);
    }
}
