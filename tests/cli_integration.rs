use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use sha2::{Digest, Sha256};

fn aifd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("aifd").expect("binary");
    cmd.current_dir(dir);
    cmd
}

fn write_npm_lockfile(dir: &Path, packages: &[(&str, &str)]) {
    let mut lock_packages = serde_json::Map::new();
    for (name, version) in packages {
        lock_packages.insert(
            format!("node_modules/{name}"),
            serde_json::json!({ "version": version }),
        );
    }
    let lock = serde_json::json!({ "packages": lock_packages });
    std::fs::write(
        dir.join("package-lock.json"),
        serde_json::to_string_pretty(&lock).expect("serialize"),
    )
    .expect("write lockfile");
}

/// Mirrors the engine's fingerprint: sha256 over repo, canonical subpath,
/// and sorted files, truncated to 16 hex chars.
fn fingerprint(repo: &str, subpath: &str, files: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo.as_bytes());
    hasher.update(b"\n");
    hasher.update(subpath.as_bytes());
    hasher.update(b"\n");
    let mut sorted: Vec<&str> = files.to_vec();
    sorted.sort();
    for file in sorted {
        hasher.update(file.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())[..16].to_string()
}

fn write_synced_package(
    output_dir: &Path,
    name: &str,
    version: &str,
    config_hash: &str,
    is_fallback: bool,
) {
    let dir = output_dir.join(format!("{name}@{version}"));
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("README.md"), "# docs").expect("write file");
    std::fs::write(dir.join("_SUMMARY.md"), format!("# {name}@{version}\n")).expect("write summary");
    std::fs::write(
        dir.join(".aifd-meta.toml"),
        format!(
            "schema_version = 2\nversion = \"{version}\"\ngit_ref = \"v{version}\"\nis_fallback = {is_fallback}\nfetched_at = \"2026-01-15T00:00:00Z\"\nconfig_hash = \"{config_hash}\"\n"
        ),
    )
    .expect("write meta");
}

#[test]
fn sync_without_config_fails() {
    let temp = tempfile::tempdir().expect("tempdir");

    aifd(temp.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn sync_without_lockfile_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    aifd(temp.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no supported lockfile"));
}

#[test]
fn invalid_config_key_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[settings]\nmax_fil_size_kb = 100\n",
    )
    .expect("write config");

    aifd(temp.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown key"));
}

#[test]
fn init_writes_profile_template() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[]);

    aifd(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("node profile"));

    let config = std::fs::read_to_string(temp.path().join("aifd.toml")).expect("read config");
    assert!(config.contains("fdocs/node"));

    // Re-running without --force must not clobber the file.
    std::fs::write(temp.path().join("aifd.toml"), "[packages]\n").expect("edit");
    aifd(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("No-op"));
    assert_eq!(
        std::fs::read_to_string(temp.path().join("aifd.toml")).expect("read"),
        "[packages]\n"
    );
}

#[test]
fn sync_skips_packages_missing_from_lockfile() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.ghost]\nrepo = \"acme/ghost\"\n",
    )
    .expect("write config");

    // The skip happens before any network work, and partial results never
    // fail the sync exit code.
    aifd(temp.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("skip ghost: not in lockfile"))
        .stdout(predicate::str::contains(
            "Sync completed: total=1 synced=0 missing=1",
        ));

    let index = std::fs::read_to_string(temp.path().join("fdocs/node/_INDEX.md")).expect("index");
    assert!(index.contains("No packages synced."));
}

#[test]
fn sync_json_emits_single_report_object() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.ghost]\nrepo = \"acme/ghost\"\n",
    )
    .expect("write config");

    let output = aifd(temp.path())
        .args(["sync", "--report-format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value =
        serde_json::from_slice(&output).expect("stdout is one JSON object");
    assert_eq!(report["summary"]["total"], 1);
    assert_eq!(report["summary"]["missing"], 1);
    assert_eq!(report["statuses"][0]["name"], "ghost");
    assert_eq!(report["statuses"][0]["status"], "Missing");
    assert_eq!(report["statuses"][0]["lock_version"], serde_json::Value::Null);
    assert!(report.get("sourceStats").is_some());
    assert!(report.get("errorCodes").is_some());
}

#[test]
fn check_fails_before_first_sync() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    aifd(temp.path())
        .arg("check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Docs check failed"))
        .stdout(predicate::str::contains("Missing"));
}

#[test]
fn check_passes_on_synced_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    let hash = fingerprint("lodash/lodash", "", &[]);
    write_synced_package(
        &temp.path().join("fdocs/node"),
        "lodash",
        "4.17.21",
        &hash,
        false,
    );

    aifd(temp.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 package(s)"));
}

#[test]
fn check_flags_fallback_as_synced() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    let hash = fingerprint("lodash/lodash", "", &[]);
    write_synced_package(
        &temp.path().join("fdocs/node"),
        "lodash",
        "4.17.21",
        &hash,
        true,
    );

    // SyncedFallback still satisfies check.
    aifd(temp.path()).arg("check").assert().success();

    let output = aifd(temp.path())
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(report["statuses"][0]["status"], "SyncedFallback");
}

#[test]
fn check_reports_version_mismatch_as_outdated() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    let hash = fingerprint("lodash/lodash", "", &[]);
    write_synced_package(
        &temp.path().join("fdocs/node"),
        "lodash",
        "4.17.20",
        &hash,
        false,
    );

    let output = aifd(temp.path())
        .args(["check", "--format", "json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(report["statuses"][0]["status"], "Outdated");
    assert_eq!(
        report["statuses"][0]["reason_code"],
        "lockfile_outdated_version_mismatch"
    );
    assert_eq!(report["statuses"][0]["docs_version"], "4.17.20");
    assert_eq!(report["statuses"][0]["lock_version"], "4.17.21");
}

#[test]
fn check_reports_corrupted_metadata() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    let dir = temp.path().join("fdocs/node/lodash@4.17.21");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join(".aifd-meta.toml"), "schema_version = [broken").expect("write");

    let output = aifd(temp.path())
        .args(["check", "--format", "json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(report["statuses"][0]["status"], "Corrupted");
    assert_eq!(report["summary"]["corrupted"], 1);
}

#[test]
fn future_schema_version_reads_as_corrupted() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    let dir = temp.path().join("fdocs/node/lodash@4.17.21");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(
        dir.join(".aifd-meta.toml"),
        "schema_version = 3\nversion = \"4.17.21\"\ngit_ref = \"v4.17.21\"\nis_fallback = false\nfetched_at = \"2026-01-15T00:00:00Z\"\n",
    )
    .expect("write");

    let output = aifd(temp.path())
        .args(["check", "--format", "json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(report["statuses"][0]["status"], "Corrupted");
    assert!(
        report["statuses"][0]["reason"]
            .as_str()
            .expect("reason")
            .contains("newer than supported")
    );
}

#[test]
fn status_is_informational_and_exits_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\n",
    )
    .expect("write config");

    aifd(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Docs status (lockfile mode):"))
        .stdout(predicate::str::contains("Missing"));
}

#[test]
fn mode_override_changes_validation() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    // No repo: fine under registry_archive, rejected by hybrid.
    std::fs::write(temp.path().join("aifd.toml"), "[packages.lodash]\n").expect("write config");

    aifd(temp.path()).arg("status").assert().success();

    aifd(temp.path())
        .args(["status", "--mode", "hybrid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("repo is required"));
}

#[test]
fn renamed_ai_notes_keep_cache_valid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_npm_lockfile(temp.path(), &[("lodash", "4.17.21")]);
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\nai_notes = \"v1\"\n",
    )
    .expect("write config");

    let hash = fingerprint("lodash/lodash", "", &[]);
    write_synced_package(
        &temp.path().join("fdocs/node"),
        "lodash",
        "4.17.21",
        &hash,
        false,
    );

    aifd(temp.path()).arg("check").assert().success();

    // Notes are not part of the fingerprint: the cache stays valid and sync
    // needs no network (it would fail here if it tried).
    std::fs::write(
        temp.path().join("aifd.toml"),
        "[packages.lodash]\nrepo = \"lodash/lodash\"\nai_notes = \"v2\"\n",
    )
    .expect("rewrite config");

    aifd(temp.path()).arg("check").assert().success();
    aifd(temp.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync completed: total=1 synced=1"));
}

#[test]
fn fingerprint_ignores_file_order() {
    let reordered = fingerprint("a/b", "docs/api", &["b.md", "a.md"]);
    assert_eq!(fingerprint("a/b", "docs/api", &["a.md", "b.md"]), reordered);
}
