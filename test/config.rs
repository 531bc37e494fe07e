// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::hostwright;

use anyhow::Result;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use std::fs::{read_dir, read_to_string, write};

const TABSIZE_KEY: &str = r"^\s*set\s+tabsize\b";

#[test]
fn config_line_twice_changes_nothing_second_time() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let nanorc = dir.path().join("nanorc");
    write(&nanorc, "set tabsize 8\nset mouse\n")?;

    hostwright(dir.path())
        .args(["config", "line"])
        .arg(&nanorc)
        .args([TABSIZE_KEY, "set tabsize 4"])
        .assert()
        .success();
    let first = read_to_string(&nanorc)?;
    assert!(first.contains("] set tabsize 8\n"));
    assert!(first.ends_with("set tabsize 4\n"));
    assert_eq!(first.matches("set tabsize 4").count(), 1);

    hostwright(dir.path())
        .args(["config", "line"])
        .arg(&nanorc)
        .args([TABSIZE_KEY, "set tabsize 4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));
    assert_eq!(read_to_string(&nanorc)?, first);

    // INVARIANT: Only one backup, taken by the run that changed the file.
    let backups = read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("nanorc.bak."))
        .count();
    assert_eq!(backups, 1);

    Ok(())
}

#[test]
fn config_line_dry_run_leaves_file_alone() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let nanorc = dir.path().join("nanorc");

    hostwright(dir.path())
        .args(["config", "line", "--dry-run"])
        .arg(&nanorc)
        .args([TABSIZE_KEY, "set tabsize 4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would append"));
    assert!(!nanorc.exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn screen_profile_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let screenrc = dir.path().join(".screenrc");

    hostwright(dir.path())
        .args(["config", "screen"])
        .env("HOME", dir.path())
        .assert()
        .success();
    let first = read_to_string(&screenrc)?;
    assert!(first.contains("startup_message off\n"));
    assert!(first.contains("defscrollback 10000\n"));

    hostwright(dir.path())
        .args(["config", "screen"])
        .env("HOME", dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));
    assert_eq!(read_to_string(&screenrc)?, first);

    Ok(())
}

#[test]
fn config_line_rejects_key_that_misses_its_line() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let profile = dir.path().join("profile");

    hostwright(dir.path())
        .args(["config", "line"])
        .arg(&profile)
        .args([r"^\s*export\s+EDITOR\b", "EDITOR=nano"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("does not match line"));
    assert!(!profile.exists());

    Ok(())
}
