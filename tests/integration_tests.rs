//! CLI integration tests.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn prodtrack() -> Command {
    cargo_bin_cmd!("prodtrack")
}

#[test]
fn help_lists_commands() {
    prodtrack()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn version_prints() {
    prodtrack().arg("--version").assert().success();
}

#[test]
fn init_creates_the_database_file() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("data/tracker.db");

    prodtrack()
        .arg("init")
        .arg("--db")
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Database initialized"));

    assert!(db_path.exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tracker.db");

    for _ in 0..2 {
        prodtrack()
            .arg("init")
            .arg("--db")
            .arg(&db_path)
            .assert()
            .success();
    }
}

#[test]
fn unknown_subcommand_fails() {
    prodtrack().arg("bogus").assert().failure();
}
