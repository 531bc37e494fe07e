// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::hostwright;

use anyhow::Result;
use predicates::prelude::*;
use simple_test_case::test_case;

#[test_case(&["frobnicate"]; "unknown command")]
#[test_case(&["config", "line", "only-a-file"]; "missing arguments")]
#[test_case(&["gh", "delete", "--org", "acme", "--all", "--match", "x*"]; "all conflicts with match")]
#[test_case(&["update", "https://example.com/nanorc"]; "url without target")]
#[test]
fn usage_errors_exit_one(args: &[&str]) -> Result<()> {
    let dir = tempfile::tempdir()?;
    hostwright(dir.path()).args(args).assert().code(1);
    Ok(())
}

#[test]
fn missing_selection_is_usage_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    hostwright(dir.path())
        .args(["gh", "delete", "--org", "acme"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("select repositories with --all or --match"));
    Ok(())
}

#[test]
fn unknown_sync_backend_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    hostwright(dir.path())
        .args(["sync", "a", "b", "--backend", "scp"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unknown sync backend"));
    Ok(())
}

#[test]
fn help_is_not_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    hostwright(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Commands"));
    Ok(())
}
