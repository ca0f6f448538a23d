//! End-to-end CLI tests exercising the `pkgr` binary through `assert_cmd`.
//! The `env` provider needs no external tooling, so it's the one we can
//! exercise deterministically in CI.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn env_abspath_finds_a_binary_on_path() {
    let mut cmd = Command::cargo_bin("pkgr").unwrap();
    cmd.args(["env", "abspath", "sh"]);
    cmd.assert().success().stdout(predicate::str::contains("/sh"));
}

#[test]
fn env_abspath_reports_not_found_for_a_bogus_name() {
    let mut cmd = Command::cargo_bin("pkgr").unwrap();
    cmd.args(["env", "abspath", "definitely-not-a-real-binary-xyz"]);
    cmd.assert().success().stdout(predicate::str::contains("not found"));
}

#[test]
fn resolve_without_any_provider_match_reports_all_failures() {
    let mut cmd = Command::cargo_bin("pkgr").unwrap();
    cmd.args(["resolve", "definitely-not-a-real-binary-xyz", "--provider", "env"]);
    cmd.assert().failure().stderr(predicate::str::contains("pkgr:"));
}

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = Command::cargo_bin("pkgr").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("env"))
        .stdout(predicate::str::contains("npm"));
}
