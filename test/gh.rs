// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

#![cfg(unix)]

use crate::hostwright;

use anyhow::Result;
use indoc::indoc;
use predicates::prelude::*;
use std::{
    env,
    ffi::OsString,
    fs::{create_dir, read_to_string, set_permissions, write, Permissions},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// Stand-in `gh` that logs its arguments and lists three repositories.
const FAKE_GH: &str = indoc! {r#"
    #!/bin/sh
    echo "$*" >> "$GH_LOG"
    case "$*" in
        *"&page=1") echo '[{"name":"tools"},{"name":"docs"},{"name":"site"}]' ;;
        *"&page="*) echo '[]' ;;
    esac
"#};

struct FakeGh {
    log: PathBuf,
    path: OsString,
}

impl FakeGh {
    fn install(dir: &Path) -> Result<Self> {
        let bin = dir.join("bin");
        create_dir(&bin)?;
        let gh = bin.join("gh");
        write(&gh, FAKE_GH)?;
        set_permissions(&gh, Permissions::from_mode(0o755))?;

        let inherited = env::var_os("PATH").unwrap_or_default();
        let path = env::join_paths(std::iter::once(bin).chain(env::split_paths(&inherited)))?;
        Ok(Self {
            log: dir.join("gh.log"),
            path,
        })
    }

    fn calls(&self) -> Result<String> {
        Ok(read_to_string(&self.log)?)
    }
}

#[test]
fn delete_without_yes_only_lists() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gh = FakeGh::install(dir.path())?;

    hostwright(dir.path())
        .args(["gh", "delete", "--org", "acme", "--match", "t*", "--match", "d*"])
        .args(["--exclude", "docs"])
        .env("PATH", &gh.path)
        .env("GH_LOG", &gh.log)
        .assert()
        .success()
        .stdout(predicate::str::contains("would delete acme/tools"))
        .stdout(predicate::str::contains("acme/docs").not())
        .stdout(predicate::str::contains("acme/site").not());

    let calls = gh.calls()?;
    assert!(calls.contains("auth status"));
    assert!(calls.contains("orgs/acme/repos"));
    assert!(!calls.contains("repo delete"));

    Ok(())
}

#[test]
fn dry_run_env_overrides_yes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gh = FakeGh::install(dir.path())?;

    hostwright(dir.path())
        .args(["gh", "delete", "--org", "acme", "--all", "--yes"])
        .env("PATH", &gh.path)
        .env("GH_LOG", &gh.log)
        .env("DRY_RUN", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("would delete acme/site"));
    assert!(!gh.calls()?.contains("repo delete"));

    Ok(())
}

#[test]
fn yes_deletes_selection() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gh = FakeGh::install(dir.path())?;

    hostwright(dir.path())
        .args(["gh", "delete", "--org", "acme", "--all", "--exclude", "site", "--yes"])
        .env("PATH", &gh.path)
        .env("GH_LOG", &gh.log)
        .assert()
        .success();

    let calls = gh.calls()?;
    assert!(calls.contains("repo delete acme/tools --yes"));
    assert!(calls.contains("repo delete acme/docs --yes"));
    assert!(!calls.contains("repo delete acme/site"));

    Ok(())
}

#[test]
fn missing_gh_is_tool_error() -> Result<()> {
    let dir = tempfile::tempdir()?;

    hostwright(dir.path())
        .args(["gh", "delete", "--org", "acme", "--all"])
        .env("PATH", dir.path())
        .assert()
        .code(2);

    Ok(())
}

#[test]
fn dry_run_summary_is_logged_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gh = FakeGh::install(dir.path())?;

    let output = hostwright(dir.path())
        .args(["gh", "delete", "--org", "acme", "--all"])
        .env("PATH", &gh.path)
        .env("GH_LOG", &gh.log)
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.matches("3 repositories would be deleted").count(), 1);

    Ok(())
}
