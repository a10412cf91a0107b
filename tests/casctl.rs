// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use assert_cmd::Command;
use predicates::prelude::predicate;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// casctl parser tests

#[test]
// Test casctl -V produces version string.
fn test_casctl_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("casctl")?;
    cmd.arg("-V");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(VERSION));
    Ok(())
}

#[test]
// Test casctl when no subcommand is given.
fn test_casctl_no_subcommand() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("casctl")?;
    cmd.assert().failure().code(2);
    Ok(())
}

#[test]
// Test that casctl rejects an unknown subcommand.
fn test_casctl_bad_subcommand() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("casctl")?;
    cmd.arg("notasub");
    cmd.assert().failure().code(2);
    Ok(())
}

#[test]
// Test that casctl rejects a log level it does not know.
fn test_casctl_bad_log_level() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("casctl")?;
    cmd.arg("report").arg("--log-level").arg("loud");
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("loud"));
    Ok(())
}

#[test]
// Test that settle rejects a timeout which is not a number of seconds.
fn test_casctl_settle_bad_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("casctl")?;
    cmd.arg("settle").arg("--timeout").arg("-1");
    cmd.assert().failure().code(2);
    Ok(())
}

#[test]
// Test that casctl recognizes a good subcommand.
fn test_casctl_good_subcommand() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("casctl")?;
    cmd.arg("stop").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--flush"));
    Ok(())
}

#[test]
// Test that a missing configuration file, or the missing management tools
// which are looked for first, make settle fail with status 1.
fn test_casctl_settle_missing_config() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("casctl")?;
    cmd.arg("settle")
        .arg("--config")
        .arg("/nonexistent/opencas.conf")
        .arg("--timeout")
        .arg("0");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error encountered"));
    Ok(())
}
