// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed file updates.
//!
//! Refresh a local file from a remote copy. The change is shown as a diff
//! first, and nothing is written until the user agrees. Fetched content is
//! only ever written to disk, it is never run.

use crate::{
    backup::{BackupError, Backups},
    exit::ConnectivityError,
    prompt::{PromptError, Prompter},
    syscall::{Shell, Syscall},
};

use std::{
    fs::{metadata, read_to_string, set_permissions, write},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Source of remote file content.
pub trait Fetcher {
    /// Fetch content at URL.
    ///
    /// # Errors
    ///
    /// - Return [`UpdateError`] if content cannot be fetched.
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetch content over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Construct new HTTP fetcher.
    ///
    /// # Errors
    ///
    /// - Return [`UpdateError::Http`] if HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("hostwright/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(skip(self), level = "debug")]
    fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                UpdateError::Connectivity(ConnectivityError::new(url, err.to_string()))
            } else {
                UpdateError::Http(err)
            }
        })?;

        Ok(response.error_for_status()?.text()?)
    }
}

/// What updating a file did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,

    /// User said no, nothing was written.
    Declined,

    Updated { backup: Option<PathBuf> },
}

/// Updates local files from remote sources.
#[derive(Debug)]
pub struct Updater<'a, F: Fetcher, S: Shell, P: Prompter> {
    fetcher: &'a F,
    shell: &'a S,
    prompter: &'a P,
    backups: Backups,
}

impl<'a, F: Fetcher, S: Shell, P: Prompter> Updater<'a, F, S, P> {
    pub fn new(fetcher: &'a F, shell: &'a S, prompter: &'a P, backups: Backups) -> Self {
        Self {
            fetcher,
            shell,
            prompter,
            backups,
        }
    }

    /// Update target file from URL.
    ///
    /// Shows a diff of the change and asks before overwriting. The target is
    /// backed up first, and keeps its permissions.
    ///
    /// # Errors
    ///
    /// - Return [`UpdateError`] if fetching, prompting, backing up, or
    ///   writing fails.
    #[instrument(skip(self, target), fields(target = %target.as_ref().display()), level = "debug")]
    pub fn update(&mut self, url: &str, target: impl AsRef<Path>) -> Result<UpdateOutcome> {
        let target = target.as_ref();
        let remote = self.fetcher.fetch(url)?;
        let local = if target.exists() {
            Some(read_to_string(target).map_err(|err| UpdateError::Read {
                source: err,
                path: target.to_path_buf(),
            })?)
        } else {
            None
        };

        if local.as_deref() == Some(remote.as_str()) {
            info!("{} is up to date", target.display());
            return Ok(UpdateOutcome::UpToDate);
        }

        match &local {
            Some(local) => {
                let diff = self.diff(target, local, &remote);
                info!("changes to {}:\n{diff}", target.display());
            }
            None => info!("{} does not exist yet, {} lines to write", target.display(), remote.lines().count()),
        }

        let question = format!("Overwrite {} with {url}?", target.display());
        if !self.prompter.confirm(&question, false)? {
            info!("left {} untouched", target.display());
            return Ok(UpdateOutcome::Declined);
        }

        let backup = self.backups.backup(target)?;
        self.overwrite(target, &remote)?;
        info!("updated {}", target.display());

        Ok(UpdateOutcome::Updated { backup })
    }

    /// Render unified diff through `diff -u`, or a line count summary when
    /// `diff` is unavailable.
    fn diff(&self, target: &Path, local: &str, remote: &str) -> String {
        if self.shell.has_program("diff") {
            let call = Syscall::new("diff")
                .args(["-u", "--label", "local", "--label", "remote"])
                .arg(target.to_string_lossy())
                .arg("-")
                .stdin(remote);
            match self.shell.capture(&call) {
                // INVARIANT: `diff` exits 1 when inputs differ.
                Ok(output) if matches!(output.code, Some(0 | 1)) => return output.stdout,
                Ok(output) => warn!("diff failed: {}", output.message()),
                Err(error) => warn!("diff failed: {error}"),
            }
        }

        summary(local, remote)
    }

    fn overwrite(&self, target: &Path, content: &str) -> Result<()> {
        let write_error = |err| UpdateError::Write {
            source: err,
            path: target.to_path_buf(),
        };

        let permissions = metadata(target).ok().map(|meta| meta.permissions());
        if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(write_error)?;
        }
        write(target, content).map_err(write_error)?;
        if let Some(permissions) = permissions {
            set_permissions(target, permissions).map_err(write_error)?;
        }

        Ok(())
    }
}

fn summary(local: &str, remote: &str) -> String {
    format!(
        "local has {} lines, remote has {} lines",
        local.lines().count(),
        remote.lines().count()
    )
}

/// Managed file update error types.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("failed to read {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to write {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("update source unreachable")]
    Connectivity(#[from] ConnectivityError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Friendly result alias :3
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        prompt::{fake::ScriptedPrompter, AssumeYes},
        syscall::{fake::ScriptedShell, SyscallOutput},
    };
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, fs::read_to_string};

    #[derive(Default)]
    struct StaticFetcher {
        content: HashMap<String, String>,
    }

    impl StaticFetcher {
        fn with(url: &str, content: &str) -> Self {
            Self {
                content: HashMap::from([(url.to_string(), content.to_string())]),
            }
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            self.content
                .get(url)
                .cloned()
                .ok_or_else(|| ConnectivityError::new(url, "no such fixture").into())
        }
    }

    const URL: &str = "https://example.com/nanorc";

    fn backups() -> Backups {
        Backups::new(
            NaiveDate::from_ymd_opt(2026, 10, 18)
                .and_then(|date| date.and_hms_opt(9, 30, 0))
                .unwrap(),
        )
    }

    #[test]
    fn declined_update_writes_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("nanorc");
        write(&target, "set mouse\n")?;

        let fetcher = StaticFetcher::with(URL, "set mouse\nset linenumbers\n");
        let shell = ScriptedShell::new();
        shell.respond("diff", SyscallOutput::failed(1, ""));
        let prompter = ScriptedPrompter::new().confirms([false]);

        let mut updater = Updater::new(&fetcher, &shell, &prompter, backups());
        assert_eq!(updater.update(URL, &target)?, UpdateOutcome::Declined);
        assert_eq!(read_to_string(&target)?, "set mouse\n");
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

        // INVARIANT: Diff is the only thing ever run.
        let calls = shell.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program(), "diff");
        assert_eq!(calls[0].input(), Some("set mouse\nset linenumbers\n"));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn accepted_update_backs_up_and_keeps_permissions() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let target = dir.path().join("bootstrap.sh");
        write(&target, "echo old\n")?;
        set_permissions(&target, std::fs::Permissions::from_mode(0o750))?;

        let fetcher = StaticFetcher::with(URL, "echo new\n");
        let shell = ScriptedShell::new().without("diff");
        let mut updater = Updater::new(&fetcher, &shell, &AssumeYes, backups());

        let backup = dir.path().join("bootstrap.sh.bak.20261018093000");
        assert_eq!(
            updater.update(URL, &target)?,
            UpdateOutcome::Updated {
                backup: Some(backup.clone())
            }
        );
        assert_eq!(read_to_string(&target)?, "echo new\n");
        assert_eq!(read_to_string(&backup)?, "echo old\n");
        assert_eq!(metadata(&target)?.permissions().mode() & 0o777, 0o750);
        assert!(shell.calls().is_empty());

        Ok(())
    }

    #[test]
    fn identical_content_is_up_to_date() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("screenrc");
        write(&target, "startup_message off\n")?;

        let fetcher = StaticFetcher::with(URL, "startup_message off\n");
        let shell = ScriptedShell::new();
        let prompter = ScriptedPrompter::new();

        let mut updater = Updater::new(&fetcher, &shell, &prompter, backups());
        assert_eq!(updater.update(URL, &target)?, UpdateOutcome::UpToDate);
        assert!(prompter.asked().is_empty());
        assert!(shell.calls().is_empty());

        Ok(())
    }

    #[test]
    fn missing_target_is_created() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("nested").join("nanorc");

        let fetcher = StaticFetcher::with(URL, "set mouse\n");
        let shell = ScriptedShell::new();
        let prompter = ScriptedPrompter::new().confirms([true]);

        let mut updater = Updater::new(&fetcher, &shell, &prompter, backups());
        assert_eq!(
            updater.update(URL, &target)?,
            UpdateOutcome::Updated { backup: None }
        );
        assert_eq!(read_to_string(&target)?, "set mouse\n");

        Ok(())
    }

    #[test]
    fn summary_counts_lines() {
        assert_eq!(summary("a\nb\n", "a\n"), "local has 2 lines, remote has 1 lines");
    }
}
