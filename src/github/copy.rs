// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Organization copy.
//!
//! Copies every selected repository of one organization into another:
//! git refs, wiki, labels, milestones, issues, pull requests (archived as
//! issues), and discussions. Each stage is best effort. A failing item is
//! logged, counted, and skipped.
//!
//! # Deduplication
//!
//! A copied issue is created now, so its own creation date says nothing about
//! the source. Every copied body therefore starts with a provenance line:
//!
//! ```text
//! > Originally opened by @octocat on 2024-01-02T03:04:05Z (https://github.com/...)
//! ```
//!
//! Items whose title and original creation date match an existing
//! destination item are skipped, along with their comments. That makes
//! re-running a copy safe.

use crate::github::{
    api::{ApiError, GitHubApi},
    client::Client,
    mirror::{repo_url, wiki_url, Mirror, MirrorError, WikiOutcome},
    model::{login, Label, NewIssue, NewMilestone, NewRepository, PullRequest, Repository},
};

use chrono::{DateTime, SecondsFormat, Utc};
use std::{
    collections::{HashMap, HashSet},
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{debug, info, instrument, warn};

/// Default label of issues that archive pull requests.
pub const ARCHIVE_LABEL: &str = "archived-pr";

/// Stages of a copy that can be switched off.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Skip {
    pub git: bool,
    pub wiki: bool,
    pub labels: bool,
    pub issues: bool,
    pub prs: bool,
    pub discussions: bool,
}

/// What to copy, and where.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    src_org: String,
    dst_org: String,
    repos: Vec<glob::Pattern>,
    skip: Skip,
    archive_label: String,
    workdir: PathBuf,
}

impl CopyOptions {
    /// Construct new options to copy all repositories between organizations.
    pub fn new(src_org: impl Into<String>, dst_org: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            src_org: src_org.into(),
            dst_org: dst_org.into(),
            repos: Vec::new(),
            skip: Skip::default(),
            archive_label: ARCHIVE_LABEL.into(),
            workdir: workdir.into(),
        }
    }

    /// Only copy repositories matching any of given glob patterns.
    ///
    /// # Errors
    ///
    /// - Return [`CopyError::Pattern`] if a pattern is invalid.
    pub fn repos(mut self, patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        self.repos = patterns
            .into_iter()
            .map(|pattern| glob::Pattern::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self)
    }

    pub fn skip(mut self, skip: Skip) -> Self {
        self.skip = skip;
        self
    }

    pub fn archive_label(mut self, label: impl Into<String>) -> Self {
        self.archive_label = label.into();
        self
    }

    fn selects(&self, name: &str) -> bool {
        self.repos.is_empty() || self.repos.iter().any(|pattern| pattern.matches(name))
    }
}

/// Tally of a finished copy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    pub repos: usize,
    pub repos_created: usize,
    pub issues_created: usize,
    pub issues_skipped: usize,
    pub prs_archived: usize,
    pub prs_skipped: usize,
    pub discussions_created: usize,
    pub discussions_skipped: usize,
    pub failures: usize,
}

impl Display for CopyReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} repos processed ({} created), issues {} created / {} skipped, \
             pull requests {} archived / {} skipped, discussions {} created / {} skipped, \
             {} failures",
            self.repos,
            self.repos_created,
            self.issues_created,
            self.issues_skipped,
            self.prs_archived,
            self.prs_skipped,
            self.discussions_created,
            self.discussions_skipped,
            self.failures,
        )
    }
}

/// Copies repositories from one organization to another.
#[derive(Debug)]
pub struct OrgCopier<'a, A: GitHubApi, M: Mirror> {
    client: Client<'a, A>,
    mirror: &'a M,
    options: CopyOptions,
}

impl<'a, A: GitHubApi, M: Mirror> OrgCopier<'a, A, M> {
    pub fn new(client: Client<'a, A>, mirror: &'a M, options: CopyOptions) -> Self {
        Self {
            client,
            mirror,
            options,
        }
    }

    /// Copy every selected repository.
    ///
    /// Only failing to list the source organization aborts the copy. All
    /// other failures are counted in the returned report.
    ///
    /// # Errors
    ///
    /// - Return [`CopyError::Api`] if source repositories cannot be listed.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self) -> Result<CopyReport> {
        let mut report = CopyReport::default();
        let repos = self.client.list_org_repos(&self.options.src_org)?;
        info!(
            "copying {} -> {}, {} repositories found",
            self.options.src_org,
            self.options.dst_org,
            repos.len()
        );

        for repo in repos.iter().filter(|repo| self.options.selects(&repo.name)) {
            report.repos += 1;
            if let Err(error) = self.copy_repo(repo, &mut report) {
                warn!("failed to copy {}: {error}", repo.name);
                report.failures += 1;
            }
        }

        info!("{report}");
        Ok(report)
    }

    fn copy_repo(&self, repo: &Repository, report: &mut CopyReport) -> Result<()> {
        let (src, dst) = (self.options.src_org.as_str(), self.options.dst_org.as_str());
        let name = repo.name.as_str();
        info!("copying {src}/{name}");

        if self.client.find_repo(dst, name)?.is_none() {
            self.client.create_org_repo(dst, &NewRepository::from(repo))?;
            info!("created {dst}/{name}");
            report.repos_created += 1;
        }

        if !self.options.skip.git {
            let branch = repo.default_branch.as_deref().unwrap_or("main");
            let result = self.mirror.mirror_repo(
                &repo_url(src, name),
                &repo_url(dst, name),
                branch,
                &self.options.workdir,
            );
            self.tally(report, "git mirror", result.map_err(CopyError::from));
        }

        if !self.options.skip.wiki && repo.has_wiki {
            match self
                .mirror
                .mirror_wiki(&wiki_url(src, name), &wiki_url(dst, name), &self.options.workdir)
            {
                Ok(WikiOutcome::Copied) => info!("copied wiki of {name}"),
                Ok(WikiOutcome::NoSourceWiki) => info!("{src}/{name} has no wiki, skipping"),
                Err(error) => self.tally(report, "wiki mirror", Err(error.into())),
            }
        }

        let milestones = self.copy_labels(name, report)?;

        if !self.options.skip.issues && repo.has_issues {
            let result = self.copy_issues(name, &milestones, report);
            self.tally(report, "issues", result);
        }

        if !self.options.skip.prs {
            let result = self.copy_pulls(name, report);
            self.tally(report, "pull requests", result);
        }

        if !self.options.skip.discussions && repo.has_discussions {
            let result = self.copy_discussions(name, report);
            self.tally(report, "discussions", result);
        }

        Ok(())
    }

    /// Recreate missing labels and milestones, returning destination
    /// milestone numbers by title.
    fn copy_labels(&self, name: &str, report: &mut CopyReport) -> Result<HashMap<String, u64>> {
        let (src, dst) = (self.options.src_org.as_str(), self.options.dst_org.as_str());
        let mut milestones = self
            .client
            .list_milestones(dst, name)?
            .into_iter()
            .map(|milestone| (milestone.title, milestone.number))
            .collect::<HashMap<_, _>>();

        if self.options.skip.labels {
            return Ok(milestones);
        }

        let existing = self
            .client
            .list_labels(dst, name)?
            .into_iter()
            .map(|label| label.name)
            .collect::<HashSet<_>>();
        for label in self.client.list_labels(src, name)? {
            if existing.contains(&label.name) {
                continue;
            }

            let result = self.client.create_label(dst, name, &label);
            if result.is_ok() {
                debug!("created label {}", label.name);
            }
            self.tally(report, "label", result.map_err(CopyError::from));
        }

        for milestone in self.client.list_milestones(src, name)? {
            if milestones.contains_key(&milestone.title) {
                continue;
            }

            match self.client.create_milestone(dst, name, &NewMilestone::from(&milestone)) {
                Ok(number) => {
                    debug!("created milestone {}", milestone.title);
                    milestones.insert(milestone.title, number);
                }
                Err(error) => self.tally(report, "milestone", Err(error.into())),
            }
        }

        Ok(milestones)
    }

    fn copy_issues(&self, name: &str, milestones: &HashMap<String, u64>, report: &mut CopyReport) -> Result<()> {
        let (src, dst) = (self.options.src_org.as_str(), self.options.dst_org.as_str());
        let mut index = self.dedup_index(name)?;

        for issue in self.client.list_issues(src, name)? {
            if issue.is_pull_request() {
                continue;
            }

            if index.contains(&issue.title, issue.created_at) {
                info!("skipping issue #{} {:?}, already copied", issue.number, issue.title);
                report.issues_skipped += 1;
                continue;
            }

            let author = login(issue.user.as_ref());
            let new = NewIssue {
                title: issue.title.clone(),
                body: with_provenance(
                    "opened",
                    author,
                    issue.created_at,
                    &issue.html_url,
                    issue.body.as_deref(),
                ),
                labels: issue.labels.iter().map(|label| label.name.clone()).collect(),
                milestone: issue
                    .milestone
                    .as_ref()
                    .and_then(|milestone| milestones.get(&milestone.title).copied()),
            };

            let number = match self.client.create_issue(dst, name, &new) {
                Ok(number) => number,
                Err(error) => {
                    self.tally(report, "issue", Err(error.into()));
                    continue;
                }
            };
            index.insert(&issue.title, issue.created_at);
            report.issues_created += 1;
            info!("copied issue #{} to #{number}", issue.number);

            let thread = self
                .client
                .list_issue_comments(src, name, issue.number)
                .map(|comments| {
                    comments
                        .into_iter()
                        .map(|comment| ThreadEntry {
                            at: comment.created_at,
                            header: provenance("posted", login(comment.user.as_ref()), comment.created_at, &comment.html_url),
                            body: comment.body.unwrap_or_default(),
                        })
                        .collect::<Vec<_>>()
                });
            match thread {
                Ok(thread) => self.post_thread(name, number, thread, report),
                Err(error) => self.tally(report, "issue comments", Err(error.into())),
            }

            if issue.is_closed() {
                let reason = issue.state_reason.as_deref().unwrap_or("completed");
                let result = self.client.close_issue(dst, name, number, reason);
                self.tally(report, "issue close", result.map_err(CopyError::from));
            }
        }

        Ok(())
    }

    fn copy_pulls(&self, name: &str, report: &mut CopyReport) -> Result<()> {
        let (src, dst) = (self.options.src_org.as_str(), self.options.dst_org.as_str());
        let pulls = self.client.list_pulls(src, name)?;
        if pulls.is_empty() {
            return Ok(());
        }

        self.ensure_archive_label(name)?;
        let mut index = self.dedup_index(name)?;
        for pull in pulls {
            let title = format!("[PR #{}] {}", pull.number, pull.title);
            if index.contains(&title, pull.created_at) {
                info!("skipping pull request #{} {:?}, already archived", pull.number, pull.title);
                report.prs_skipped += 1;
                continue;
            }

            let thread = match self.pull_thread(name, &pull) {
                Ok(thread) => thread,
                Err(error) => {
                    self.tally(report, "pull request thread", Err(error));
                    continue;
                }
            };

            let new = NewIssue {
                title: title.clone(),
                body: archive_body(&pull),
                labels: vec![self.options.archive_label.clone()],
                milestone: None,
            };
            let number = match self.client.create_issue(dst, name, &new) {
                Ok(number) => number,
                Err(error) => {
                    self.tally(report, "pull request archive", Err(error.into()));
                    continue;
                }
            };
            index.insert(&title, pull.created_at);
            report.prs_archived += 1;
            info!("archived pull request #{} as #{number}", pull.number);

            self.post_thread(name, number, thread, report);

            if pull.state == "closed" {
                let reason = if pull.merged_at.is_some() { "completed" } else { "not_planned" };
                let result = self.client.close_issue(dst, name, number, reason);
                self.tally(report, "pull request close", result.map_err(CopyError::from));
            }
        }

        Ok(())
    }

    /// Merge issue comments, review comments, and reviews of a pull request
    /// into one chronological thread.
    fn pull_thread(&self, name: &str, pull: &PullRequest) -> Result<Vec<ThreadEntry>> {
        let src = self.options.src_org.as_str();
        let mut thread = Vec::new();

        for comment in self.client.list_issue_comments(src, name, pull.number)? {
            thread.push(ThreadEntry {
                at: comment.created_at,
                header: provenance("posted", login(comment.user.as_ref()), comment.created_at, &comment.html_url),
                body: comment.body.unwrap_or_default(),
            });
        }

        for comment in self.client.list_review_comments(src, name, pull.number)? {
            let line = comment
                .line
                .or(comment.original_line)
                .map(|line| format!(" line {line}"))
                .unwrap_or_default();
            thread.push(ThreadEntry {
                at: comment.created_at,
                header: format!(
                    "{} on `{}`{line}",
                    provenance("posted", login(comment.user.as_ref()), comment.created_at, ""),
                    comment.path,
                ),
                body: comment.body.unwrap_or_default(),
            });
        }

        for review in self.client.list_reviews(src, name, pull.number)? {
            let Some(at) = review.submitted_at else {
                continue;
            };

            let body = review.body.unwrap_or_default();
            if body.trim().is_empty() && review.state == "COMMENTED" {
                continue;
            }

            thread.push(ThreadEntry {
                at,
                header: format!(
                    "{}: **{}**",
                    provenance("reviewed", login(review.user.as_ref()), at, ""),
                    review.state
                ),
                body,
            });
        }

        // INVARIANT: Stable sort keeps same-second entries in listing order.
        thread.sort_by_key(|entry| entry.at);
        Ok(thread)
    }

    fn copy_discussions(&self, name: &str, report: &mut CopyReport) -> Result<()> {
        let (src, dst) = (self.options.src_org.as_str(), self.options.dst_org.as_str());
        let board = self.client.discussion_board(dst, name)?;
        let mut index = DedupIndex::from_bodies(
            self.client
                .list_discussions(dst, name)?
                .iter()
                .map(|discussion| (discussion.title.as_str(), discussion.body.as_str())),
        );

        for discussion in self.client.list_discussions(src, name)? {
            let Some(category) = board.category(&discussion.category.name) else {
                info!(
                    "skipping discussion {:?}, category {:?} does not exist in {dst}/{name}",
                    discussion.title, discussion.category.name
                );
                report.discussions_skipped += 1;
                continue;
            };

            if index.contains(&discussion.title, discussion.created_at) {
                info!("skipping discussion {:?}, already copied", discussion.title);
                report.discussions_skipped += 1;
                continue;
            }

            let body = with_provenance(
                "opened",
                login(discussion.author.as_ref()),
                discussion.created_at,
                &discussion.url,
                Some(discussion.body.as_str()),
            );
            let id = match self.client.create_discussion(&board.repository_id, &category.id, &discussion.title, &body) {
                Ok(id) => id,
                Err(error) => {
                    self.tally(report, "discussion", Err(error.into()));
                    continue;
                }
            };
            index.insert(&discussion.title, discussion.created_at);
            report.discussions_created += 1;
            info!("copied discussion {:?}", discussion.title);

            for comment in &discussion.comments.nodes {
                let body = with_provenance(
                    "posted",
                    login(comment.author.as_ref()),
                    comment.created_at,
                    "",
                    Some(comment.body.as_str()),
                );
                let result = self.client.add_discussion_comment(&id, &body);
                self.tally(report, "discussion comment", result.map_err(CopyError::from));
            }
        }

        Ok(())
    }

    fn post_thread(&self, name: &str, number: u64, thread: Vec<ThreadEntry>, report: &mut CopyReport) {
        let dst = self.options.dst_org.as_str();
        for entry in thread {
            let body = format!("{}\n\n{}", entry.header, entry.body);
            let result = self.client.create_comment(dst, name, number, &body);
            self.tally(report, "comment", result.map_err(CopyError::from));
        }
    }

    fn ensure_archive_label(&self, name: &str) -> Result<()> {
        let dst = self.options.dst_org.as_str();
        let exists = self
            .client
            .list_labels(dst, name)?
            .iter()
            .any(|label| label.name == self.options.archive_label);
        if !exists {
            let label = Label {
                name: self.options.archive_label.clone(),
                color: "ededed".into(),
                description: Some("Pull request archived from another organization".into()),
            };
            self.client.create_label(dst, name, &label)?;
        }

        Ok(())
    }

    fn dedup_index(&self, name: &str) -> Result<DedupIndex> {
        let existing = self.client.list_issues(&self.options.dst_org, name)?;
        Ok(DedupIndex::from_bodies(existing.iter().map(|issue| {
            (issue.title.as_str(), issue.body.as_deref().unwrap_or_default())
        })))
    }

    fn tally(&self, report: &mut CopyReport, what: &str, result: Result<()>) {
        if let Err(error) = result {
            warn!("{what} failed: {error}");
            report.failures += 1;
        }
    }
}

#[derive(Debug)]
struct ThreadEntry {
    at: DateTime<Utc>,
    header: String,
    body: String,
}

/// Render provenance line of a copied item.
pub fn provenance(verb: &str, author: &str, at: DateTime<Utc>, url: &str) -> String {
    let at = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    if url.is_empty() {
        format!("> Originally {verb} by @{author} on {at}")
    } else {
        format!("> Originally {verb} by @{author} on {at} ({url})")
    }
}

fn with_provenance(verb: &str, author: &str, at: DateTime<Utc>, url: &str, body: Option<&str>) -> String {
    let header = provenance(verb, author, at, url);
    match body.map(str::trim_end).filter(|body| !body.is_empty()) {
        Some(body) => format!("{header}\n\n{body}"),
        None => header,
    }
}

fn archive_body(pull: &PullRequest) -> String {
    let author = login(pull.user.as_ref());
    let state = match pull.merged_at {
        Some(merged) => format!("merged on {}", merged.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => pull.state.clone(),
    };
    let description = pull
        .body
        .as_deref()
        .map(str::trim_end)
        .filter(|body| !body.is_empty())
        .unwrap_or("_No description provided._");

    format!(
        "{}\n\n\
         - Author: @{author}\n\
         - Branches: `{}` → `{}`\n\
         - State: {state}\n\
         - Original: {}\n\n\
         {description}",
        provenance("opened", author, pull.created_at, &pull.html_url),
        pull.head.name,
        pull.base.name,
        pull.html_url,
    )
}

/// Pull original creation date out of a provenance line.
pub fn original_created_at(body: &str) -> Option<DateTime<Utc>> {
    let line = body
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("> Originally "))?;
    let (_, rest) = line.split_once(" on ")?;
    let stamp = rest.split_whitespace().next()?;

    DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|stamp| stamp.with_timezone(&Utc))
}

/// Titles and original creation dates of already copied items.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupIndex {
    seen: HashSet<(String, DateTime<Utc>)>,
}

impl DedupIndex {
    /// Index destination items by title and provenance.
    ///
    /// Items without a provenance line were not copied and are ignored.
    pub fn from_bodies<'i>(items: impl IntoIterator<Item = (&'i str, &'i str)>) -> Self {
        let seen = items
            .into_iter()
            .filter_map(|(title, body)| original_created_at(body).map(|at| (title.to_string(), at)))
            .collect();
        Self { seen }
    }

    pub fn contains(&self, title: &str, created_at: DateTime<Utc>) -> bool {
        self.seen.contains(&(title.to_string(), created_at))
    }

    pub fn insert(&mut self, title: &str, created_at: DateTime<Utc>) {
        self.seen.insert((title.to_string(), created_at));
    }
}

/// Organization copy error types.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Repository filter pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

/// Friendly result alias :3
pub type Result<T, E = CopyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{api::fake::FakeGitHub, api::Method, mirror::fake::RecordingMirror};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::path::Path;

    const PAGE: &str = "per_page=100&page=1";

    fn repo(name: &str) -> Value {
        json!({
            "name": name,
            "description": "handy tools",
            "private": true,
            "has_issues": true,
            "has_wiki": true,
            "has_discussions": true,
            "default_branch": "trunk",
        })
    }

    fn github_with(repos: Vec<Value>) -> FakeGitHub {
        let github = FakeGitHub::new();
        github.fixture(&format!("orgs/old/repos?type=all&{PAGE}"), Value::Array(repos));
        github.fixture("repos/new/tools", repo("tools"));
        github
    }

    fn options() -> CopyOptions {
        CopyOptions::new("old", "new", Path::new("/tmp/hostwright-test"))
    }

    fn issues_only() -> Skip {
        Skip {
            prs: true,
            discussions: true,
            ..Default::default()
        }
    }

    #[test]
    fn provenance_round_trips_through_other_offsets() {
        let at = "2024-02-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let line = provenance("opened", "bob", at, "https://github.com/old/tools/issues/2");
        assert_eq!(
            line,
            "> Originally opened by @bob on 2024-02-01T10:00:00Z (https://github.com/old/tools/issues/2)"
        );
        assert_eq!(original_created_at(&line), Some(at));

        let shifted = "> Originally opened by @bob on 2024-02-01T12:00:00+02:00\n\nbody";
        assert_eq!(original_created_at(shifted), Some(at));
        assert_eq!(original_created_at("no provenance here"), None);
    }

    #[test]
    fn duplicate_issues_are_skipped_with_their_comments() -> anyhow::Result<()> {
        let github = github_with(vec![repo("tools")]);
        github.fixture(
            &format!("repos/old/tools/labels?{PAGE}"),
            json!([{ "name": "bug", "color": "d73a4a" }, { "name": "docs", "color": "0075ca" }]),
        );
        github.fixture(&format!("repos/new/tools/labels?{PAGE}"), json!([{ "name": "bug", "color": "d73a4a" }]));
        github.fixture(
            &format!("repos/old/tools/milestones?state=all&{PAGE}"),
            json!([{ "number": 1, "title": "v1", "state": "open" }]),
        );
        github.respond(Method::Post, "repos/new/tools/milestones", json!({ "number": 7 }));
        github.fixture(
            &format!("repos/old/tools/issues?state=all&sort=created&direction=asc&{PAGE}"),
            json!([
                {
                    "number": 1,
                    "title": "Crash on start",
                    "body": "It crashes.",
                    "state": "closed",
                    "state_reason": "completed",
                    "user": { "login": "alice" },
                    "created_at": "2024-01-02T03:04:05Z",
                    "html_url": "https://github.com/old/tools/issues/1",
                    "labels": [{ "name": "bug" }],
                    "milestone": { "number": 1, "title": "v1" },
                },
                {
                    "number": 2,
                    "title": "Docs typo",
                    "state": "open",
                    "user": { "login": "bob" },
                    "created_at": "2024-02-01T10:00:00Z",
                },
                {
                    "number": 3,
                    "title": "Add thing",
                    "state": "open",
                    "created_at": "2024-03-01T10:00:00Z",
                    "pull_request": {},
                },
            ]),
        );
        github.fixture(
            &format!("repos/new/tools/issues?state=all&sort=created&direction=asc&{PAGE}"),
            json!([{
                "number": 9,
                "title": "Docs typo",
                "body": "> Originally opened by @bob on 2024-02-01T12:00:00+02:00\n\nold copy",
                "state": "open",
                "created_at": "2025-06-01T00:00:00Z",
            }]),
        );
        github.fixture(
            &format!("repos/old/tools/issues/1/comments?{PAGE}"),
            json!([{ "body": "Same here", "user": { "login": "carol" }, "created_at": "2024-01-03T00:00:00Z" }]),
        );
        github.fixture(
            &format!("repos/old/tools/issues/2/comments?{PAGE}"),
            json!([{ "body": "Never posted", "user": { "login": "dave" }, "created_at": "2024-02-02T00:00:00Z" }]),
        );
        github.respond(Method::Post, "repos/new/tools/issues", json!({ "number": 42 }));

        let mirror = RecordingMirror::default();
        let copier = OrgCopier::new(Client::new(&github), &mirror, options().skip(issues_only()));
        let report = copier.run()?;

        assert_eq!(report.issues_created, 1);
        assert_eq!(report.issues_skipped, 1);
        assert_eq!(report.failures, 0);

        let issues = github.mutations_to(Method::Post, "repos/new/tools/issues");
        assert_eq!(
            issues,
            vec![json!({
                "title": "Crash on start",
                "body": "> Originally opened by @alice on 2024-01-02T03:04:05Z (https://github.com/old/tools/issues/1)\n\nIt crashes.",
                "labels": ["bug"],
                "milestone": 7,
            })]
        );

        let comments = github
            .mutations()
            .into_iter()
            .filter(|(_, endpoint, _)| endpoint.ends_with("/comments"))
            .collect::<Vec<_>>();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].1, "repos/new/tools/issues/42/comments");
        assert_eq!(
            comments[0].2,
            json!({ "body": "> Originally posted by @carol on 2024-01-03T00:00:00Z\n\nSame here" })
        );

        assert_eq!(
            github.mutations_to(Method::Patch, "repos/new/tools/issues/42"),
            vec![json!({ "state": "closed", "state_reason": "completed" })]
        );
        assert_eq!(
            github.mutations_to(Method::Post, "repos/new/tools/labels"),
            vec![json!({ "name": "docs", "color": "0075ca" })]
        );

        Ok(())
    }

    #[test]
    fn missing_repos_are_created_and_mirrored() -> anyhow::Result<()> {
        let github = FakeGitHub::new();
        github.fixture(&format!("orgs/old/repos?type=all&{PAGE}"), json!([repo("tools"), repo("other")]));

        let mirror = RecordingMirror::default();
        let skip = Skip {
            labels: true,
            issues: true,
            prs: true,
            discussions: true,
            ..Default::default()
        };
        let options = options().skip(skip).repos(["tool*"])?;
        let report = OrgCopier::new(Client::new(&github), &mirror, options).run()?;

        assert_eq!(report.repos, 1);
        assert_eq!(report.repos_created, 1);
        assert_eq!(
            github.mutations_to(Method::Post, "orgs/new/repos"),
            vec![json!({
                "name": "tools",
                "description": "handy tools",
                "private": true,
                "has_issues": true,
                "has_wiki": true,
                "has_projects": false,
            })]
        );
        assert_eq!(
            mirror.repos.borrow().clone(),
            vec![("https://github.com/old/tools.git".to_string(), "https://github.com/new/tools.git".to_string())]
        );
        assert_eq!(
            mirror.wikis.borrow().clone(),
            vec![(
                "https://github.com/old/tools.wiki.git".to_string(),
                "https://github.com/new/tools.wiki.git".to_string()
            )]
        );

        Ok(())
    }

    #[test]
    fn pull_requests_are_archived_with_merged_thread() -> anyhow::Result<()> {
        let github = github_with(vec![repo("tools")]);
        github.fixture(
            &format!("repos/old/tools/pulls?state=all&sort=created&direction=asc&{PAGE}"),
            json!([{
                "number": 3,
                "title": "Add thing",
                "body": "Adds the thing.",
                "state": "closed",
                "user": { "login": "alice" },
                "created_at": "2024-03-01T10:00:00Z",
                "merged_at": "2024-03-02T10:00:00Z",
                "html_url": "https://github.com/old/tools/pull/3",
                "head": { "ref": "feature" },
                "base": { "ref": "trunk" },
            }]),
        );
        github.fixture(
            &format!("repos/old/tools/issues/3/comments?{PAGE}"),
            json!([{ "body": "Looks good", "user": { "login": "bob" }, "created_at": "2024-03-01T10:05:00Z" }]),
        );
        github.fixture(
            &format!("repos/old/tools/pulls/3/comments?{PAGE}"),
            json!([{
                "body": "Typo here",
                "user": { "login": "carol" },
                "created_at": "2024-03-01T10:02:00Z",
                "path": "src/lib.rs",
                "line": 12,
            }]),
        );
        github.fixture(
            &format!("repos/old/tools/pulls/3/reviews?{PAGE}"),
            json!([
                { "body": "", "user": { "login": "carol" }, "state": "COMMENTED", "submitted_at": "2024-03-01T10:02:00Z" },
                { "body": "Ship it", "user": { "login": "dave" }, "state": "APPROVED", "submitted_at": "2024-03-01T10:10:00Z" },
            ]),
        );
        github.respond(Method::Post, "repos/new/tools/issues", json!({ "number": 50 }));

        let mirror = RecordingMirror::default();
        let skip = Skip {
            git: true,
            wiki: true,
            labels: true,
            issues: true,
            discussions: true,
            ..Default::default()
        };
        let report = OrgCopier::new(Client::new(&github), &mirror, options().skip(skip)).run()?;
        assert_eq!(report.prs_archived, 1);

        assert_eq!(
            github.mutations_to(Method::Post, "repos/new/tools/labels"),
            vec![json!({
                "name": "archived-pr",
                "color": "ededed",
                "description": "Pull request archived from another organization",
            })]
        );

        let archived = github.mutations_to(Method::Post, "repos/new/tools/issues");
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0]["title"], "[PR #3] Add thing");
        assert_eq!(archived[0]["labels"], json!(["archived-pr"]));
        let body = archived[0]["body"].as_str().unwrap_or_default();
        assert!(body.starts_with("> Originally opened by @alice on 2024-03-01T10:00:00Z"));
        assert!(body.contains("- Branches: `feature` → `trunk`"));
        assert!(body.contains("- State: merged on 2024-03-02T10:00:00Z"));
        assert!(body.ends_with("Adds the thing."));

        let thread = github
            .mutations_to(Method::Post, "repos/new/tools/issues/50/comments")
            .into_iter()
            .map(|comment| comment["body"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            thread,
            vec![
                "> Originally posted by @carol on 2024-03-01T10:02:00Z on `src/lib.rs` line 12\n\nTypo here",
                "> Originally posted by @bob on 2024-03-01T10:05:00Z\n\nLooks good",
                "> Originally reviewed by @dave on 2024-03-01T10:10:00Z: **APPROVED**\n\nShip it",
            ]
        );
        assert_eq!(
            github.mutations_to(Method::Patch, "repos/new/tools/issues/50"),
            vec![json!({ "state": "closed", "state_reason": "completed" })]
        );

        Ok(())
    }

    #[test]
    fn discussions_skip_unknown_categories() -> anyhow::Result<()> {
        let github = github_with(vec![repo("tools")]);
        github.graphql_fixture(
            "discussionCategories",
            "new/tools",
            json!({ "repository": {
                "id": "R_new",
                "discussionCategories": { "nodes": [{ "id": "C_general", "name": "General" }] },
            }}),
        );
        github.graphql_fixture(
            "discussions(",
            "new/tools",
            json!({ "repository": { "discussions": {
                "pageInfo": { "hasNextPage": false, "endCursor": null },
                "nodes": [],
            }}}),
        );
        github.graphql_fixture(
            "discussions(",
            "old/tools",
            json!({ "repository": { "discussions": {
                "pageInfo": { "hasNextPage": false, "endCursor": null },
                "nodes": [
                    {
                        "id": "D_1",
                        "title": "Welcome",
                        "body": "Hello all",
                        "createdAt": "2024-04-01T08:00:00Z",
                        "url": "https://github.com/old/tools/discussions/1",
                        "author": { "login": "alice" },
                        "category": { "name": "General" },
                        "comments": { "nodes": [
                            { "body": "Hi!", "createdAt": "2024-04-01T09:00:00Z", "author": { "login": "bob" } },
                        ]},
                    },
                    {
                        "id": "D_2",
                        "title": "Wild idea",
                        "body": "",
                        "createdAt": "2024-04-02T08:00:00Z",
                        "url": "https://github.com/old/tools/discussions/2",
                        "author": null,
                        "category": { "name": "Ideas" },
                        "comments": { "nodes": [] },
                    },
                ],
            }}}),
        );

        let mirror = RecordingMirror::default();
        let skip = Skip {
            git: true,
            wiki: true,
            labels: true,
            issues: true,
            prs: true,
            ..Default::default()
        };
        let report = OrgCopier::new(Client::new(&github), &mirror, options().skip(skip)).run()?;
        assert_eq!(report.discussions_created, 1);
        assert_eq!(report.discussions_skipped, 1);

        let graphql = github.mutations_to(Method::Post, "graphql");
        assert_eq!(graphql.len(), 2);
        assert_eq!(graphql[0]["categoryId"], "C_general");
        assert_eq!(graphql[0]["title"], "Welcome");
        assert_eq!(
            graphql[1]["body"],
            "> Originally posted by @bob on 2024-04-01T09:00:00Z\n\nHi!"
        );

        Ok(())
    }

    #[test]
    fn failing_repo_is_counted_and_skipped() -> anyhow::Result<()> {
        let github = FakeGitHub::new();
        github.fixture(&format!("orgs/old/repos?type=all&{PAGE}"), json!([repo("tools")]));
        github.rate_limit(Method::Post, "orgs/new/repos", 10);

        let mirror = RecordingMirror::default();
        let client = Client::new(&github).retry_floor(std::time::Duration::ZERO);
        let report = OrgCopier::new(client, &mirror, options()).run()?;
        assert_eq!(report.repos, 1);
        assert_eq!(report.failures, 1);
        assert!(mirror.repos.borrow().is_empty());

        Ok(())
    }
}
