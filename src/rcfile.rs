// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent configuration file editing.
//!
//! Most of the files hostwright manages are plain line based configuration
//! files: `.nanorc`, `.screenrc`, shell rc files, `dhcpcd.conf`. All of them
//! use `#` for comments. Edits are expressed as [`LineRule`]s, i.e., a regex
//! that identifies the setting by key, and the full line that setting should
//! read.
//!
//! # Edit Semantics
//!
//! For each rule, the active (uncommented) lines matching the key are looked
//! up:
//!
//! - No match: the desired line is appended.
//! - Matches, but some differ from the desired line: each differing line is
//!   commented out with a timestamp marker, and the desired line is appended
//!   once, unless it is already there.
//! - Only exact matches: nothing happens.
//!
//! Commented lines never match, so applying the same rules twice leaves the
//! file untouched the second time around.
//!
//! Before the first append into a file during a run, a header comment is
//! added. Before the first write into an existing file during a run, the file
//! is backed up through [`Backups`].
//!
//! # Managed Blocks
//!
//! Settings that span several lines are kept between marker comments, see
//! [`RcEdit::ensure_block`]. The block is replaced as a whole when its body
//! changes.

use crate::backup::{BackupError, Backups};

use chrono::NaiveDateTime;
use regex::Regex;
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

const COMMENT: &str = "#";

/// One desired setting in a configuration file.
#[derive(Debug, Clone)]
pub struct LineRule {
    key: Regex,
    line: String,
}

impl LineRule {
    /// Construct new rule from key pattern and desired line.
    ///
    /// # Errors
    ///
    /// - Return [`RcError::Pattern`] if key pattern is invalid.
    /// - Return [`RcError::KeyMismatch`] if key does not match the desired
    ///   line itself.
    pub fn new(key: &str, line: impl Into<String>) -> Result<Self> {
        let rule = Self {
            key: Regex::new(key)?,
            line: line.into(),
        };

        // INVARIANT: Rule must find the line it writes, or every run appends again.
        if !rule.matches(&rule.line) {
            return Err(RcError::KeyMismatch {
                key: key.into(),
                line: rule.line,
            });
        }

        Ok(rule)
    }

    pub fn line(&self) -> &str {
        self.line.as_str()
    }

    fn matches(&self, line: &str) -> bool {
        !is_comment(line) && self.key.is_match(line)
    }
}

/// Result of applying one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// File already had the desired content.
    Unchanged,

    /// Desired content was added.
    Appended,

    /// Stale content was commented out or replaced.
    Replaced { old: Vec<String> },
}

impl Outcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// In-memory editor for line based configuration.
///
/// # Invariant
///
/// - Stale lines are commented out, never deleted.
/// - Header is added at most once, right before the first appended line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcEdit {
    lines: Vec<String>,
    stamp: String,
    header: Option<String>,
    headed: bool,
    changed: bool,
}

impl RcEdit {
    /// Construct new editor over existing content.
    ///
    /// The header, if any, is written before the first appended line.
    pub fn new(content: &str, stamp: impl Into<String>, header: Option<String>) -> Self {
        Self {
            lines: content.lines().map(str::to_owned).collect(),
            stamp: stamp.into(),
            header,
            headed: false,
            changed: false,
        }
    }

    /// Make sure a setting reads exactly like the rule's desired line.
    pub fn ensure_line(&mut self, rule: &LineRule) -> Outcome {
        let desired = rule.line().trim();
        let matched: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| rule.matches(line))
            .map(|(idx, _)| idx)
            .collect();
        let present = matched.iter().any(|idx| self.lines[*idx].trim() == desired);
        let stale: Vec<usize> = matched
            .into_iter()
            .filter(|idx| self.lines[*idx].trim() != desired)
            .collect();

        if stale.is_empty() && present {
            return Outcome::Unchanged;
        }

        let mut old = Vec::new();
        for idx in stale {
            old.push(self.lines[idx].clone());
            self.lines[idx] = format!("{COMMENT} [hostwright {}] {}", self.stamp, self.lines[idx]);
            self.changed = true;
        }

        if !present {
            self.append([rule.line().to_string()]);
        }

        if old.is_empty() {
            Outcome::Appended
        } else {
            Outcome::Replaced { old }
        }
    }

    /// Make sure a named block of lines is present with given body.
    ///
    /// Blocks are fenced by `# >>> hostwright <name> >>>` and
    /// `# <<< hostwright <name> <<<`.
    ///
    /// # Errors
    ///
    /// - Return [`RcError::UnterminatedBlock`] if the opening marker has no
    ///   closing marker after it.
    pub fn ensure_block(
        &mut self,
        name: &str,
        body: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Outcome> {
        let body: Vec<String> = body.into_iter().map(Into::into).collect();
        let (begin, end) = block_markers(name);

        let Some(start) = self.lines.iter().position(|line| line.trim() == begin) else {
            let mut block = vec![begin];
            block.extend(body);
            block.push(end);
            self.append(block);
            return Ok(Outcome::Appended);
        };

        let stop = self.lines[start + 1..]
            .iter()
            .position(|line| line.trim() == end)
            .map(|offset| start + 1 + offset)
            .ok_or_else(|| RcError::UnterminatedBlock { name: name.into() })?;

        if self.lines[start + 1..stop] == body[..] {
            return Ok(Outcome::Unchanged);
        }

        let old = self.lines.splice(start + 1..stop, body).collect();
        self.changed = true;

        Ok(Outcome::Replaced { old })
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Whether the header line was written by this editor.
    pub fn is_headed(&self) -> bool {
        self.headed
    }

    fn append(&mut self, lines: impl IntoIterator<Item = String>) {
        if !self.headed {
            if let Some(header) = self.header.take() {
                self.lines.push(header);
                self.headed = true;
            }
        }

        self.lines.extend(lines);
        self.changed = true;
    }
}

impl Display for RcEdit {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for line in &self.lines {
            writeln!(fmt, "{line}")?;
        }

        Ok(())
    }
}

/// Configuration editing over one run.
///
/// Tracks which files were already backed up and given a header, so both
/// happen at most once per file no matter how many edits are applied.
#[derive(Debug, Clone)]
pub struct RcSession {
    backups: Backups,
    stamp: String,
    headed: HashSet<PathBuf>,
    dry_run: bool,
}

impl RcSession {
    /// Construct new session for a run started at given time.
    pub fn new(started: NaiveDateTime) -> Self {
        Self {
            backups: Backups::new(started),
            stamp: started.format("%Y-%m-%d %H:%M:%S").to_string(),
            headed: HashSet::new(),
            dry_run: false,
        }
    }

    /// Compute outcomes without writing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Edit configuration file.
    ///
    /// Reads current content (a missing file reads as empty), hands it to the
    /// editor, and writes the result back only if something changed. Returns
    /// whether the file changed (or would have, in dry run mode).
    ///
    /// # Errors
    ///
    /// - Return [`RcError::Read`] if file cannot be read.
    /// - Return [`RcError::Backup`] if file cannot be backed up.
    /// - Return [`RcError::Write`] if file cannot be written.
    /// - Return any error produced by the editor itself.
    pub fn edit<E>(&mut self, path: impl AsRef<Path>, editor: E) -> Result<bool>
    where
        E: FnOnce(&mut RcEdit) -> Result<()>,
    {
        let path = path.as_ref();
        let content = match read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(RcError::Read {
                    source: err,
                    path: path.to_path_buf(),
                })
            }
        };

        let header = (!self.headed.contains(path))
            .then(|| format!("{COMMENT} Managed by hostwright ({})", self.stamp));
        let mut edit = RcEdit::new(&content, self.stamp.clone(), header);
        editor(&mut edit)?;

        if !edit.is_changed() || self.dry_run {
            return Ok(edit.is_changed());
        }

        self.backups.backup(path)?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(|err| RcError::Write {
                source: err,
                path: path.to_path_buf(),
            })?;
        }
        write(path, edit.to_string()).map_err(|err| RcError::Write {
            source: err,
            path: path.to_path_buf(),
        })?;

        if edit.is_headed() {
            self.headed.insert(path.to_path_buf());
        }

        Ok(true)
    }

    /// Apply listing of line rules to configuration file.
    ///
    /// Returns outcome of each rule in the order given.
    ///
    /// # Errors
    ///
    /// - Return [`RcError`] if file cannot be read, backed up, or written.
    #[instrument(skip(self, path, rules), fields(path = %path.as_ref().display()), level = "debug")]
    pub fn apply_rules<'r>(
        &mut self,
        path: impl AsRef<Path>,
        rules: impl IntoIterator<Item = &'r LineRule>,
    ) -> Result<Vec<Outcome>> {
        let path = path.as_ref();
        let verb = if self.dry_run { "would" } else { "will" };
        let mut outcomes = Vec::new();
        self.edit(path, |edit| {
            for rule in rules {
                let outcome = edit.ensure_line(rule);
                match &outcome {
                    Outcome::Unchanged => {}
                    Outcome::Appended => {
                        info!("{}: {verb} append `{}`", path.display(), rule.line());
                    }
                    Outcome::Replaced { old } => {
                        info!(
                            "{}: {verb} replace `{}` with `{}`",
                            path.display(),
                            old.join("`, `"),
                            rule.line()
                        );
                    }
                }
                outcomes.push(outcome);
            }

            Ok(())
        })?;

        if outcomes.iter().all(|outcome| !outcome.is_change()) {
            info!("{}: already up to date", path.display());
        }

        Ok(outcomes)
    }
}

fn block_markers(name: &str) -> (String, String) {
    (
        format!("{COMMENT} >>> hostwright {name} >>>"),
        format!("{COMMENT} <<< hostwright {name} <<<"),
    )
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with(COMMENT)
}

/// Configuration editing error types.
#[derive(Debug, thiserror::Error)]
pub enum RcError {
    /// Key pattern of rule is not a valid regex.
    #[error(transparent)]
    Pattern(#[from] regex::Error),

    /// Configuration file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be backed up.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Key pattern would never find the line it writes.
    #[error("key {key:?} does not match line {line:?}")]
    KeyMismatch { key: String, line: String },

    /// Managed block is missing its closing marker.
    #[error("managed block {name:?} has no closing marker")]
    UnterminatedBlock { name: String },
}

/// Friendly result alias :3
pub type Result<T, E = RcError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs::{read_dir, read_to_string, write};

    const STAMP: &str = "2026-10-18 09:30:05";

    fn started() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .and_then(|date| date.and_hms_opt(9, 30, 5))
            .unwrap()
    }

    fn tabsize(n: u8) -> LineRule {
        LineRule::new(r"^\s*set\s+tabsize\b", format!("set tabsize {n}")).unwrap()
    }

    #[test]
    fn rule_must_match_its_own_line() {
        let result = LineRule::new(r"^\s*export\s+EDITOR\b", "EDITOR=nano");
        assert!(matches!(result, Err(RcError::KeyMismatch { .. })));

        let result = LineRule::new(r"tabsize", "# set tabsize 4");
        assert!(matches!(result, Err(RcError::KeyMismatch { .. })));

        assert!(LineRule::new(r"^\s*export\s+EDITOR\b", "export EDITOR=nano").is_ok());
    }

    #[test]
    fn rc_edit_appends_missing_line_after_header() {
        let mut edit = RcEdit::new("set mouse\n", STAMP, Some("# header".into()));
        assert_eq!(edit.ensure_line(&tabsize(4)), Outcome::Appended);
        assert_eq!(
            edit.ensure_line(&LineRule::new(r"^\s*set\s+autoindent\b", "set autoindent").unwrap()),
            Outcome::Appended
        );

        let expect = indoc! {"
            set mouse
            # header
            set tabsize 4
            set autoindent
        "};
        assert_eq!(edit.to_string(), expect);
    }

    #[test]
    fn rc_edit_comments_out_stale_line() {
        let mut edit = RcEdit::new("set tabsize 8\nset mouse\n", STAMP, None);
        let outcome = edit.ensure_line(&tabsize(4));
        assert_eq!(
            outcome,
            Outcome::Replaced {
                old: vec!["set tabsize 8".into()]
            }
        );

        let expect = indoc! {"
            # [hostwright 2026-10-18 09:30:05] set tabsize 8
            set mouse
            set tabsize 4
        "};
        assert_eq!(edit.to_string(), expect);
    }

    #[test]
    fn rc_edit_keeps_exact_line_and_comments_out_conflicts() {
        let mut edit = RcEdit::new("set tabsize 4\nset tabsize 2\n", STAMP, None);
        let outcome = edit.ensure_line(&tabsize(4));
        assert_eq!(
            outcome,
            Outcome::Replaced {
                old: vec!["set tabsize 2".into()]
            }
        );

        // Desired line was already there, so it must not be appended again.
        let expect = indoc! {"
            set tabsize 4
            # [hostwright 2026-10-18 09:30:05] set tabsize 2
        "};
        assert_eq!(edit.to_string(), expect);
    }

    #[test]
    fn rc_edit_ignores_commented_lines() {
        let mut edit = RcEdit::new("# set tabsize 8\nset tabsize 4\n", STAMP, None);
        assert_eq!(edit.ensure_line(&tabsize(4)), Outcome::Unchanged);
        assert!(!edit.is_changed());
    }

    #[test]
    fn rc_edit_block_lifecycle() -> anyhow::Result<()> {
        let mut edit = RcEdit::new("hostname\n", STAMP, None);
        let outcome = edit.ensure_block("eth0", ["interface eth0", "static routers=10.0.0.1"])?;
        assert_eq!(outcome, Outcome::Appended);

        let outcome = edit.ensure_block("eth0", ["interface eth0", "static routers=10.0.0.1"])?;
        assert_eq!(outcome, Outcome::Unchanged);

        let outcome = edit.ensure_block("eth0", ["interface eth0", "static routers=10.0.0.254"])?;
        assert_eq!(
            outcome,
            Outcome::Replaced {
                old: vec!["interface eth0".into(), "static routers=10.0.0.1".into()]
            }
        );

        let expect = indoc! {"
            hostname
            # >>> hostwright eth0 >>>
            interface eth0
            static routers=10.0.0.254
            # <<< hostwright eth0 <<<
        "};
        assert_eq!(edit.to_string(), expect);

        Ok(())
    }

    #[test]
    fn rc_edit_unterminated_block() {
        let mut edit = RcEdit::new("# >>> hostwright eth0 >>>\ninterface eth0\n", STAMP, None);
        let result = edit.ensure_block("eth0", ["interface eth0"]);
        assert!(matches!(result, Err(RcError::UnterminatedBlock { .. })));
    }

    #[test]
    fn session_second_run_produces_no_diff() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let nanorc = dir.path().join(".nanorc");
        write(&nanorc, "set tabsize 8\n")?;
        let rules = [tabsize(4)];

        let mut session = RcSession::new(started());
        session.apply_rules(&nanorc, &rules)?;
        let first = read_to_string(&nanorc)?;

        let mut session = RcSession::new(started());
        let outcomes = session.apply_rules(&nanorc, &rules)?;
        assert_eq!(outcomes, vec![Outcome::Unchanged]);
        assert_eq!(read_to_string(&nanorc)?, first);

        let expect = indoc! {"
            # [hostwright 2026-10-18 09:30:05] set tabsize 8
            # Managed by hostwright (2026-10-18 09:30:05)
            set tabsize 4
        "};
        assert_eq!(first, expect);

        Ok(())
    }

    #[test]
    fn session_backs_up_and_heads_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let screenrc = dir.path().join(".screenrc");
        write(&screenrc, "startup_message on\n")?;

        let mut session = RcSession::new(started());
        let startup = LineRule::new(r"^\s*startup_message\b", "startup_message off")?;
        let scrollback = LineRule::new(r"^\s*defscrollback\b", "defscrollback 10000")?;
        session.apply_rules(&screenrc, [&startup])?;
        session.apply_rules(&screenrc, [&scrollback])?;

        let content = read_to_string(&screenrc)?;
        assert_eq!(content.matches("Managed by hostwright").count(), 1);
        assert_eq!(content.matches("startup_message off").count(), 1);

        let backups: Vec<_> = read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".bak."))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(read_to_string(backups[0].path())?, "startup_message on\n");

        Ok(())
    }

    #[test]
    fn session_creates_missing_file_without_backup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let rc = dir.path().join("nested").join(".bashrc");

        let mut session = RcSession::new(started());
        let rule = LineRule::new(r"^\s*export\s+EDITOR=", "export EDITOR=nano")?;
        session.apply_rules(&rc, [&rule])?;

        assert_eq!(
            read_to_string(&rc)?,
            "# Managed by hostwright (2026-10-18 09:30:05)\nexport EDITOR=nano\n"
        );
        assert_eq!(read_dir(dir.path().join("nested"))?.count(), 1);

        Ok(())
    }

    #[test]
    fn session_dry_run_leaves_file_alone() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let nanorc = dir.path().join(".nanorc");
        write(&nanorc, "set tabsize 8\n")?;

        let mut session = RcSession::new(started()).dry_run(true);
        let outcomes = session.apply_rules(&nanorc, &[tabsize(4)])?;
        assert!(outcomes[0].is_change());
        assert_eq!(read_to_string(&nanorc)?, "set tabsize 8\n");
        assert_eq!(read_dir(dir.path())?.count(), 1);

        Ok(())
    }
}
