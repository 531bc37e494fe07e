// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bulk repository deletion.

use crate::{
    github::{
        api::{ApiError, GitHubApi},
        client::Client,
    },
    syscall::{Shell, Syscall},
};

use tracing::{info, instrument, warn};

/// Which repositories of an organization to delete.
#[derive(Debug, Clone)]
pub struct Selection {
    all: bool,
    matches: Vec<glob::Pattern>,
    excludes: Vec<glob::Pattern>,
}

impl Selection {
    /// Construct new selection.
    ///
    /// Either `all` or at least one match pattern is required. Excludes
    /// always win over matches.
    ///
    /// # Errors
    ///
    /// - Return [`DeleteError::NoSelection`] if nothing is selected.
    /// - Return [`DeleteError::Pattern`] if a pattern is invalid.
    pub fn new(
        all: bool,
        matches: impl IntoIterator<Item = impl AsRef<str>>,
        excludes: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let matches = compile(matches)?;
        let excludes = compile(excludes)?;
        if !all && matches.is_empty() {
            return Err(DeleteError::NoSelection);
        }

        Ok(Self {
            all,
            matches,
            excludes,
        })
    }

    pub fn selects(&self, name: &str) -> bool {
        let matched = self.all || self.matches.iter().any(|pattern| pattern.matches(name));
        matched && !self.excludes.iter().any(|pattern| pattern.matches(name))
    }
}

fn compile(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Vec<glob::Pattern>> {
    patterns
        .into_iter()
        .map(|pattern| glob::Pattern::new(pattern.as_ref()).map_err(DeleteError::from))
        .collect()
}

/// Result of a deletion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    /// Repositories deleted, or that would be deleted on a dry run.
    pub selected: Vec<String>,
    pub deleted: usize,
    pub failures: usize,
}

/// Delete selected repositories of an organization.
///
/// A dry run only lists what would be deleted, and never runs
/// `gh repo delete`. Archived repositories are included.
///
/// # Errors
///
/// - Return [`DeleteError::Api`] if the organization cannot be listed.
#[instrument(skip(client, shell, selection), level = "debug")]
pub fn delete_repos<A: GitHubApi>(
    client: &Client<'_, A>,
    shell: &impl Shell,
    org: &str,
    selection: &Selection,
    dry_run: bool,
) -> Result<DeleteReport> {
    let mut report = DeleteReport::default();
    for repo in client.list_org_repos(org)? {
        if !selection.selects(&repo.name) {
            continue;
        }

        let target = format!("{org}/{}", repo.name);
        report.selected.push(repo.name.clone());
        if dry_run {
            info!("would delete {target}");
            continue;
        }

        let call = Syscall::new("gh").args(["repo", "delete", target.as_str(), "--yes"]);
        match shell.run(&call) {
            Ok(_) => {
                info!("deleted {target}");
                report.deleted += 1;
            }
            Err(error) => {
                warn!("failed to delete {target}: {error}");
                report.failures += 1;
            }
        }
    }

    if dry_run {
        info!(
            "dry run, {} repositories would be deleted, pass --yes to delete them",
            report.selected.len()
        );
    } else {
        info!("{} deleted, {} failed", report.deleted, report.failures);
    }

    Ok(report)
}

/// Repository deletion error types.
#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    /// Neither `--all` nor `--match` was given.
    #[error("select repositories with --all or --match")]
    NoSelection,

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Friendly result alias :3
pub type Result<T, E = DeleteError> = std::result::Result<T, E>;
