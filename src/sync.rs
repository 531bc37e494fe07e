// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory synchronization.
//!
//! Thin wrapper over `rsync` on Unix-like systems and `robocopy` on Windows.
//! Both get the same set of options: mirror deletion, exclusion patterns,
//! and dry runs.

use crate::{
    exit::ConnectivityError,
    syscall::{self, Shell, Syscall},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::{info, instrument};

/// Copy tool to synchronize with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Rsync,
    Robocopy,
}

impl Backend {
    /// Native backend of the current platform.
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Robocopy
        } else {
            Self::Rsync
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Rsync => "rsync",
            Self::Robocopy => "robocopy",
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::native()
    }
}

impl Display for Backend {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program())
    }
}

impl FromStr for Backend {
    type Err = SyncError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "rsync" => Ok(Self::Rsync),
            "robocopy" => Ok(Self::Robocopy),
            other => Err(SyncError::UnknownBackend(other.into())),
        }
    }
}

/// What to synchronize.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    source: String,
    destination: String,
    delete: bool,
    excludes: Vec<String>,
    dry_run: bool,
}

impl SyncPlan {
    /// Construct new plan to copy contents of source into destination.
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }

    /// Remove files from destination that are absent in source.
    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Skip paths matching given patterns. Patterns ending in `/` only
    /// match directories.
    pub fn exclude(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excludes.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn call(&self, backend: Backend) -> Syscall {
        match backend {
            Backend::Rsync => self.rsync_call(),
            Backend::Robocopy => self.robocopy_call(),
        }
    }

    /// Build `rsync` call.
    ///
    /// Source gets a trailing slash so its contents are synchronized, not the
    /// directory itself.
    pub fn rsync_call(&self) -> Syscall {
        let source = if self.source.ends_with('/') {
            self.source.clone()
        } else {
            format!("{}/", self.source)
        };

        let mut call = Syscall::new("rsync").args(["-a", "--human-readable", "--info=progress2"]);
        if self.delete {
            call = call.arg("--delete");
        }
        for pattern in &self.excludes {
            call = call.arg(format!("--exclude={pattern}"));
        }
        if self.dry_run {
            call = call.arg("--dry-run");
        }

        call.arg(source).arg(self.destination.as_str())
    }

    /// Build `robocopy` call.
    pub fn robocopy_call(&self) -> Syscall {
        let mut call = Syscall::new("robocopy")
            .arg(self.source.as_str())
            .arg(self.destination.as_str())
            .arg(if self.delete { "/MIR" } else { "/E" });

        let (dirs, files): (Vec<&String>, Vec<&String>) =
            self.excludes.iter().partition(|pattern| pattern.ends_with('/'));
        if !dirs.is_empty() {
            call = call
                .arg("/XD")
                .args(dirs.iter().map(|dir| dir.trim_end_matches('/').to_string()));
        }
        if !files.is_empty() {
            call = call.arg("/XF").args(files.iter().map(|file| file.to_string()));
        }
        if self.dry_run {
            call = call.arg("/L");
        }

        call.args(["/R:2", "/W:5"])
    }

    /// Remote hosts this plan talks to.
    pub fn remote_hosts(&self) -> Vec<&str> {
        [self.source.as_str(), self.destination.as_str()]
            .into_iter()
            .filter_map(remote_host)
            .collect()
    }
}

/// Host part of an rsync `host:path` endpoint.
///
/// Single letters before the colon are Windows drive letters, not hosts.
pub fn remote_host(endpoint: &str) -> Option<&str> {
    let (host, _) = endpoint.split_once(':')?;
    if host.len() < 2 || host.contains('/') || host.contains('\\') {
        return None;
    }

    Some(host)
}

/// Check that host accepts non-interactive ssh logins.
///
/// # Errors
///
/// - Return [`SyncError::Connectivity`] if host cannot be reached.
/// - Return [`SyncError::Syscall`] if `ssh` is missing.
pub fn check_remote(shell: &impl Shell, host: &str) -> Result<()> {
    let call = Syscall::new("ssh").args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=5", host, "true"]);
    let output = shell.capture(&call)?;
    if !output.success() {
        return Err(ConnectivityError::new(host, output.message()).into());
    }

    Ok(())
}

/// Robocopy reports success with any exit code below 8.
pub fn robocopy_succeeded(code: Option<i32>) -> bool {
    matches!(code, Some(code) if (0..8).contains(&code))
}

/// Synchronize directories.
///
/// # Errors
///
/// - Return [`SyncError::Syscall`] if backend is missing or fails.
/// - Return [`SyncError::Connectivity`] if a remote endpoint is unreachable.
#[instrument(skip(shell, plan), level = "debug")]
pub fn sync(shell: &impl Shell, backend: Backend, plan: &SyncPlan) -> Result<()> {
    shell.require(backend.program())?;

    if backend == Backend::Rsync {
        for host in plan.remote_hosts() {
            shell.require("ssh")?;
            check_remote(shell, host)?;
        }
    }

    let call = plan.call(backend);
    info!("{call}");
    match backend {
        Backend::Rsync => shell.run_interactive(&call)?,
        Backend::Robocopy => {
            let code = shell.interactive(&call)?;
            if !robocopy_succeeded(code) {
                return Err(syscall::Error::Failed {
                    call: call.to_string(),
                    code,
                    message: "robocopy reported failure".into(),
                }
                .into());
            }
        }
    }

    if plan.dry_run {
        info!("dry run, nothing was copied");
    }

    Ok(())
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unknown sync backend {0:?}, use rsync or robocopy")]
    UnknownBackend(String),

    #[error("remote endpoint unreachable")]
    Connectivity(#[from] ConnectivityError),

    #[error("failed to run sync tool")]
    Syscall(#[from] syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
