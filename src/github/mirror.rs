// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git ref, LFS, and wiki mirroring.
//!
//! Refs are fetched into a scratch bare repository through libgit2, then
//! pushed to the destination with `git push --mirror`. LFS objects follow
//! through `git lfs` when the source tracks any.

use crate::syscall::{Shell, Syscall};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{Config, FetchOptions, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    fs::remove_dir_all,
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument, warn};

/// Result of mirroring a wiki.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WikiOutcome {
    Copied,

    /// Source repository has no wiki content to copy.
    NoSourceWiki,
}

/// Copies git content between remotes.
pub trait Mirror {
    /// Mirror all branches and tags from source to destination.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError`] if fetch or push fails.
    fn mirror_repo(&self, src_url: &str, dst_url: &str, default_branch: &str, workdir: &Path) -> Result<()>;

    /// Mirror wiki repository from source to destination.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError`] if fetch or push fails for any reason other
    ///   than a missing source wiki.
    fn mirror_wiki(&self, src_url: &str, dst_url: &str, workdir: &Path) -> Result<WikiOutcome>;
}

/// Mirror through libgit2 fetches and `git` pushes.
#[derive(Debug)]
pub struct GitMirror<'s, S: Shell> {
    shell: &'s S,
}

impl<'s, S: Shell> GitMirror<'s, S> {
    pub fn new(shell: &'s S) -> Self {
        Self { shell }
    }

    /// Make sure `git` is installed.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Syscall`] if `git` is missing.
    pub fn ensure_git(&self) -> Result<()> {
        Ok(self.shell.require("git")?)
    }

    fn push(&self, repo: &Path, dst_url: &str) -> Result<()> {
        let call = Syscall::new("git")
            .arg("--git-dir")
            .arg(repo.to_string_lossy())
            .args(["push", "--mirror", dst_url]);
        self.shell.run(&call)?;
        Ok(())
    }

    fn push_all(&self, repo: &Repository, path: &Path, dst_url: &str, default_branch: &str) -> Result<()> {
        if is_empty(repo)? {
            info!("nothing to push to {dst_url}, source has no refs");
            return Ok(());
        }

        self.push(path, dst_url)?;
        if uses_lfs(repo, default_branch)? {
            self.push_lfs(path, dst_url)?;
        }

        Ok(())
    }

    fn push_lfs(&self, repo: &Path, dst_url: &str) -> Result<()> {
        if !self.shell.has_program("git-lfs") {
            warn!("repository uses git-lfs, but git-lfs is not installed, skipping lfs objects");
            return Ok(());
        }

        let git_dir = repo.to_string_lossy();
        let fetch = Syscall::new("git")
            .args(["--git-dir", git_dir.as_ref(), "lfs", "fetch", "--all", "origin"]);
        let push = Syscall::new("git")
            .args(["--git-dir", git_dir.as_ref(), "lfs", "push", "--all", dst_url]);
        self.shell.run(&fetch)?;
        self.shell.run(&push)?;
        info!("copied lfs objects to {dst_url}");

        Ok(())
    }
}

impl<S: Shell> Mirror for GitMirror<'_, S> {
    #[instrument(skip(self, workdir), level = "debug")]
    fn mirror_repo(&self, src_url: &str, dst_url: &str, default_branch: &str, workdir: &Path) -> Result<()> {
        let path = workdir.join(scratch_name(src_url));
        let result = fetch_bare(src_url, &path)
            .and_then(|repo| self.push_all(&repo, &path, dst_url, default_branch));
        cleanup(&path);

        result
    }

    #[instrument(skip(self, workdir), level = "debug")]
    fn mirror_wiki(&self, src_url: &str, dst_url: &str, workdir: &Path) -> Result<WikiOutcome> {
        let path = workdir.join(scratch_name(src_url));
        let repo = match fetch_bare(src_url, &path) {
            Ok(repo) => repo,
            Err(MirrorError::Git2(err)) if is_missing_remote(&err) => {
                cleanup(&path);
                return Ok(WikiOutcome::NoSourceWiki);
            }
            Err(error) => {
                cleanup(&path);
                return Err(error);
            }
        };

        let result = match is_empty(&repo) {
            Ok(true) => Ok(WikiOutcome::NoSourceWiki),
            Ok(false) => self.push(&path, dst_url).map(|_| WikiOutcome::Copied),
            Err(error) => Err(error),
        };
        drop(repo);
        cleanup(&path);

        result
    }
}

/// Fetch branches and tags of remote into fresh bare repository.
///
/// Progress is shown through a progress bar. If credentials are needed, the
/// user is prompted with the progress bar suspended.
fn fetch_bare(url: &str, path: &Path) -> Result<Repository> {
    if path.exists() {
        remove_dir_all(path).map_err(|err| MirrorError::Scratch {
            source: err,
            path: path.to_path_buf(),
        })?;
    }
    mkdirp::mkdirp(path).map_err(|err| MirrorError::Scratch {
        source: err,
        path: path.to_path_buf(),
    })?;

    let repo = Repository::init_bare(path)?;
    repo.remote_with_fetch("origin", url, "+refs/heads/*:refs/heads/*")?;
    repo.remote_add_fetch("origin", "+refs/tags/*:refs/tags/*")?;

    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(url.to_string());
    bar.enable_steady_tick(time::Duration::from_millis(100));

    let prompter = IndicatifPrompter::new(bar);
    let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
    let config = Config::open_default()?;

    let mut throttle = time::Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(&config));
    rc.transfer_progress(|progress| {
        if throttle.elapsed() > time::Duration::from_millis(10) {
            throttle = time::Instant::now();
            prompter.bar.set_length(progress.total_objects() as u64);
            prompter.bar.set_position(progress.received_objects() as u64);
        }
        true
    });

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(rc);
    let fetched = repo
        .find_remote("origin")
        .and_then(|mut remote| remote.fetch::<&str>(&[], Some(&mut fo), None));
    prompter.bar.finish_and_clear();
    fetched?;
    debug!("fetched {url} into {}", path.display());

    Ok(repo)
}

fn is_empty(repo: &Repository) -> Result<bool> {
    Ok(repo.references()?.next().is_none())
}

/// Check if default branch marks any path as LFS tracked.
fn uses_lfs(repo: &Repository, branch: &str) -> Result<bool> {
    let Ok(reference) = repo.find_reference(&format!("refs/heads/{branch}")) else {
        return Ok(false);
    };

    let tree = reference.peel_to_tree()?;
    let Some(entry) = tree.get_name(".gitattributes") else {
        return Ok(false);
    };

    let blob = entry.to_object(repo)?.peel_to_blob()?;
    Ok(String::from_utf8_lossy(blob.content()).contains("filter=lfs"))
}

fn is_missing_remote(err: &git2::Error) -> bool {
    let message = err.message().to_lowercase();
    err.code() == git2::ErrorCode::NotFound || message.contains("not found") || message.contains("404")
}

fn scratch_name(url: &str) -> String {
    url.trim_end_matches(".git")
        .rsplit(['/', ':'])
        .take(2)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("-")
}

fn cleanup(path: &Path) {
    if let Err(err) = remove_dir_all(path) {
        warn!("failed to remove scratch mirror {}: {err}", path.display());
    }
}

/// HTTPS URL of repository on GitHub.
pub fn repo_url(owner: &str, name: &str) -> String {
    format!("https://github.com/{owner}/{name}.git")
}

/// HTTPS URL of repository's wiki on GitHub.
pub fn wiki_url(owner: &str, name: &str) -> String {
    format!("https://github.com/{owner}/{name}.wiki.git")
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Mirroring error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Scratch repository directory cannot be prepared.
    #[error("failed to prepare scratch mirror at {path:?}")]
    Scratch {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// `git` or `git lfs` fails.
    #[error("failed to run git")]
    Syscall(#[from] crate::syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
