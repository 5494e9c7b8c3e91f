//! Integration tests for the `verifyr` binary's CLI surface.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn verifyr() -> Command {
    Command::cargo_bin("verifyr").expect("binary should build")
}

#[test]
fn help_lists_both_subcommands() {
    verifyr().arg("--help").assert().success().stdout(predicate::str::contains("ingest")).stdout(predicate::str::contains("serve"));
}

#[test]
fn ingest_rejects_directory_with_no_product_subdirectories() {
    let empty = TempDir::new().expect("tempdir");
    verifyr().arg("ingest").arg(empty.path()).assert().failure().stderr(predicate::str::contains("no product subdirectories"));
}

#[test]
fn ingest_rejects_missing_input_directory() {
    let missing = TempDir::new().expect("tempdir").path().join("does-not-exist");
    verifyr().arg("ingest").arg(&missing).assert().failure();
}

#[test]
fn serve_without_prior_ingest_fails_fast() {
    let data_dir = TempDir::new().expect("tempdir");
    let config_path = data_dir.path().join("verifyr.toml");
    std::fs::write(&config_path, format!("data_dir = \"{}\"\n", data_dir.path().join("data").display())).expect("write config");

    verifyr()
        .arg("--config")
        .arg(&config_path)
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ingest").or(predicate::str::contains("chunks.json")));
}
