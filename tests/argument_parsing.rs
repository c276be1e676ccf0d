//! Command line parsing and batch runs through the built binary.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn polyglot_repl(config_dir: &Path) -> Command {
    let mut command = Command::cargo_bin("polyglot-repl").unwrap();
    command
        .env_remove("POLYGLOT_REPL_DEFAULT_KERNEL")
        .arg("--config")
        .arg(config_dir.join("config.toml"));
    command
}

#[test]
fn help_flag_shows_usage() {
    Command::cargo_bin("polyglot-repl")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--exit-after-run"))
        .stdout(predicate::str::contains("--default-kernel"));
}

#[test]
fn version_flag_shows_version() {
    Command::cargo_bin("polyglot-repl")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn input_without_equals_sign_is_rejected() {
    Command::cargo_bin("polyglot-repl")
        .unwrap()
        .args(["--input", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn unknown_default_kernel_is_rejected() {
    Command::cargo_bin("polyglot-repl")
        .unwrap()
        .args(["--default-kernel", "cobol"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cobol"));
}

#[test]
fn exit_after_run_requires_run() {
    let temp = TempDir::new().unwrap();

    polyglot_repl(temp.path())
        .arg("--exit-after-run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--exit-after-run requires --run"));
}

#[cfg(unix)]
#[test]
fn batch_run_writes_notebook_to_stdout() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("hello.sh");
    std::fs::write(&script, "echo hello from bash\n").unwrap();

    polyglot_repl(temp.path())
        .arg("--run")
        .arg(&script)
        .args(["--output-format", "ipynb"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"nbformat\": 4"))
        .stdout(predicate::str::contains("hello from bash"));
}

#[cfg(unix)]
#[test]
fn failing_cell_sets_exit_code_and_trx_outcome() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("fail.sh");
    let output = temp.path().join("results.trx");
    std::fs::write(&script, "echo before\nexit 3\n").unwrap();

    polyglot_repl(temp.path())
        .arg("--run")
        .arg(&script)
        .args(["--output-format", "trx", "--output-path"])
        .arg(&output)
        .assert()
        .code(2);

    let trx = std::fs::read_to_string(&output).unwrap();
    assert!(trx.contains("testName=\"Cell    1: echo before\""));
    assert!(trx.contains("outcome=\"Failed\""));
}

#[cfg(unix)]
#[test]
fn input_values_reach_the_script() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("greet.sh");
    std::fs::write(&script, "echo hi @input:name\n").unwrap();

    polyglot_repl(temp.path())
        .arg("--run")
        .arg(&script)
        .args(["--input", "NAME=alice", "--output-format", "ipynb"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hi alice"));
}
