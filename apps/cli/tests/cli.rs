//! 命令行端到端测试

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn cli() -> Command {
    Command::cargo_bin("stacker-cli").unwrap()
}

#[test]
fn test_keywords_lists_table() {
    cli()
        .arg("keywords")
        .assert()
        .success()
        .stdout(predicate::str::contains("FRONTSEEKTOTE"))
        .stdout(predicate::str::contains("CLICKERDOWN"));
}

#[test]
fn test_check_reports_unknown_keyword() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("auto.txt");
    fs::write(&script, "BEGIN a\nHOVERCRAFT 1\nEND\n").unwrap();

    cli()
        .args(["check", "--json", "--script"])
        .arg(&script)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"severity\": \"error\""));
}

#[test]
fn test_run_simple_script_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("auto.txt");
    fs::write(
        &script,
        "# demo\nBEGIN demo\nMESSAGE hello\nSTRAIGHT 0.4 0.1\nEND\n",
    )
    .unwrap();

    cli()
        .args(["run", "--json", "--block", "demo", "--script"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"completed\""));
}

#[test]
fn test_run_missing_block_fails() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("auto.txt");
    fs::write(&script, "BEGIN demo\nEND\n").unwrap();

    cli()
        .args(["run", "--block", "other", "--script"])
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_config_init_and_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("robot.toml");

    cli().args(["config", "init"]).arg(&path).assert().success();
    cli()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[drivetrain]"));
}

#[test]
fn test_demo_script_is_clean() {
    let demo = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/two_tote.auto");

    cli()
        .args(["check", "--json", "--script"])
        .arg(&demo)
        .assert()
        .success()
        .stdout(predicate::str::contains("two_tote"))
        .stdout(predicate::str::contains("drive_only"));
}
