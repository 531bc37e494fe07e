// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Editor and terminal dotfile profiles.
//!
//! Each profile is a fixed listing of [`LineRule`]s applied to either the
//! user's own dotfile or the system-wide equivalent under `/etc`.

use crate::{
    rcfile::{LineRule, Outcome, RcError, RcSession},
    syscall::{Shell, Syscall},
    system::privilege::{Privilege, PrivilegeError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::instrument;

const SCREEN_HARDSTATUS: &str = "hardstatus string '%{= kG}[ %{G}%H %{g}][%= %{= kw}%?%-Lw%?%{r}(%{W}%n*%f%t%?(%u)%?%{r})%{w}%?%+Lw%?%?%= %{g}][%{B} %m-%d %{W}%c %{g}]'";

/// Managed dotfile kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dotfile {
    Nano,
    Screen,
    Shell,
}

/// Where a dotfile lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Current user's home directory.
    #[default]
    User,

    /// System-wide configuration under `/etc`.
    System,
}

impl Dotfile {
    /// Determine path of dotfile for given scope.
    ///
    /// Shell rc files follow the login shell: zsh gets `.zshrc`, anything
    /// else gets `.bashrc`.
    pub fn target(&self, scope: Scope, home: &Path, login_shell: Option<&str>) -> PathBuf {
        let zsh = login_shell.is_some_and(|shell| shell.ends_with("zsh"));
        match (self, scope) {
            (Self::Nano, Scope::User) => home.join(".nanorc"),
            (Self::Nano, Scope::System) => PathBuf::from("/etc/nanorc"),
            (Self::Screen, Scope::User) => home.join(".screenrc"),
            (Self::Screen, Scope::System) => PathBuf::from("/etc/screenrc"),
            (Self::Shell, Scope::User) if zsh => home.join(".zshrc"),
            (Self::Shell, Scope::User) => home.join(".bashrc"),
            (Self::Shell, Scope::System) if zsh => PathBuf::from("/etc/zsh/zshrc"),
            (Self::Shell, Scope::System) => PathBuf::from("/etc/bash.bashrc"),
        }
    }

    /// Desired settings of this dotfile.
    ///
    /// Nano's syntax highlighting include depends on where nano keeps its
    /// syntax files, see [`nano_syntax_dir`].
    ///
    /// # Errors
    ///
    /// - Return [`RcError::Pattern`] if a key pattern is invalid.
    pub fn rules(&self, nano_syntax_dir: &Path) -> Result<Vec<LineRule>> {
        let rules = match self {
            Self::Nano => vec![
                LineRule::new(r"^\s*(set|unset)\s+linenumbers\b", "set linenumbers")?,
                LineRule::new(r"^\s*(set|unset)\s+mouse\b", "set mouse")?,
                LineRule::new(r"^\s*set\s+tabsize\b", "set tabsize 4")?,
                LineRule::new(r"^\s*(set|unset)\s+tabstospaces\b", "set tabstospaces")?,
                LineRule::new(r"^\s*(set|unset)\s+autoindent\b", "set autoindent")?,
                LineRule::new(r"^\s*(set|unset)\s+softwrap\b", "set softwrap")?,
                LineRule::new(
                    r#"^\s*include\s+"[^"]*/nano/\*\.nanorc""#,
                    format!("include \"{}/*.nanorc\"", nano_syntax_dir.display()),
                )?,
            ],
            Self::Screen => vec![
                LineRule::new(r"^\s*startup_message\b", "startup_message off")?,
                LineRule::new(r"^\s*defscrollback\b", "defscrollback 10000")?,
                LineRule::new(r"^\s*altscreen\b", "altscreen on")?,
                LineRule::new(r"^\s*termcapinfo\s+xterm\*", "termcapinfo xterm* ti@:te@")?,
                LineRule::new(
                    r"^\s*hardstatus\s+(on|off|ignore|lastline|firstline|alwayslastline|alwaysfirstline)\b",
                    "hardstatus alwayslastline",
                )?,
                LineRule::new(r"^\s*hardstatus\s+string\b", SCREEN_HARDSTATUS)?,
            ],
            Self::Shell => vec![
                LineRule::new(r"^\s*export\s+EDITOR=", "export EDITOR=nano")?,
                LineRule::new(r"^\s*export\s+VISUAL=", "export VISUAL=nano")?,
                LineRule::new(r"^\s*alias\s+ll=", "alias ll='ls -alF'")?,
                LineRule::new(r"^\s*alias\s+la=", "alias la='ls -A'")?,
            ],
        };

        Ok(rules)
    }

    /// Apply dotfile profile.
    ///
    /// System scope requires root, and is checked before anything is read.
    ///
    /// # Errors
    ///
    /// - Return [`DotfileError::Privilege`] if system scope is used without
    ///   root.
    /// - Return [`DotfileError::Rc`] if the dotfile cannot be edited.
    #[instrument(skip(self, session, privilege, target, nano_syntax_dir), level = "debug")]
    pub fn apply(
        &self,
        session: &mut RcSession,
        privilege: Privilege,
        scope: Scope,
        target: &Path,
        nano_syntax_dir: &Path,
    ) -> Result<Vec<Outcome>> {
        if scope == Scope::System && !session.is_dry_run() {
            privilege.require_root(&format!("editing {}", target.display()))?;
        }

        let rules = self.rules(nano_syntax_dir)?;
        Ok(session.apply_rules(target, &rules)?)
    }
}

impl Display for Dotfile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Nano => "nano",
            Self::Screen => "screen",
            Self::Shell => "shell",
        })
    }
}

/// Locate nano's syntax highlighting directory.
///
/// Homebrew keeps it under its own prefix on macOS, everywhere else it is
/// `/usr/share/nano`.
pub fn nano_syntax_dir(shell: &impl Shell) -> PathBuf {
    if cfg!(target_os = "macos") {
        if let Ok(prefix) = shell.run(&Syscall::new("brew").arg("--prefix")) {
            return PathBuf::from(prefix.trim()).join("share").join("nano");
        }
    }

    PathBuf::from("/usr/share/nano")
}

/// Dotfile error types.
#[derive(Debug, thiserror::Error)]
pub enum DotfileError {
    #[error(transparent)]
    Rc(#[from] RcError),

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
}

/// Friendly result alias :3
pub type Result<T, E = DotfileError> = std::result::Result<T, E>;
