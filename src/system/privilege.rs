// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Privilege checks.
//!
//! System-wide changes need root. Checks happen before any work starts, so
//! a command never stops halfway through because of missing privileges.

use crate::syscall::{Shell, Syscall};

use tracing::debug;

/// Privilege level of the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Running as root.
    Root,

    /// Not root, but `sudo` is available.
    Sudo,

    /// Not root, and no way to become root.
    Unprivileged,
}

impl Privilege {
    /// Determine privilege level of current user.
    pub fn detect(shell: &impl Shell) -> Self {
        let uid = shell.run(&Syscall::new("id").arg("-u")).ok();
        debug!("effective uid {uid:?}");

        if uid.as_deref() == Some("0") {
            Self::Root
        } else if shell.has_program("sudo") {
            Self::Sudo
        } else {
            Self::Unprivileged
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// Make sure current user is root.
    ///
    /// # Errors
    ///
    /// - Return [`PrivilegeError::RootRequired`] if not root.
    pub fn require_root(&self, action: &str) -> Result<()> {
        if self.is_root() {
            Ok(())
        } else {
            Err(PrivilegeError::RootRequired {
                action: action.into(),
            })
        }
    }

    /// Make sure current user is _not_ root.
    ///
    /// # Errors
    ///
    /// - Return [`PrivilegeError::RootForbidden`] if root.
    pub fn forbid_root(&self, action: &str) -> Result<()> {
        if self.is_root() {
            Err(PrivilegeError::RootForbidden {
                action: action.into(),
            })
        } else {
            Ok(())
        }
    }

    /// Run call with root privileges.
    ///
    /// Root runs the call as is. Other users go through `sudo`.
    ///
    /// # Errors
    ///
    /// - Return [`PrivilegeError::RootRequired`] if there is no way to
    ///   become root.
    pub fn elevate(&self, call: Syscall, action: &str) -> Result<Syscall> {
        match self {
            Self::Root => Ok(call),
            Self::Sudo => Ok(call.wrapped_by("sudo")),
            Self::Unprivileged => Err(PrivilegeError::RootRequired {
                action: action.into(),
            }),
        }
    }
}

/// Privilege error types.
#[derive(Debug, thiserror::Error)]
pub enum PrivilegeError {
    #[error("{action} requires root, re-run with sudo")]
    RootRequired { action: String },

    #[error("{action} must not be run as root")]
    RootForbidden { action: String },
}

/// Friendly result alias :3
pub type Result<T, E = PrivilegeError> = std::result::Result<T, E>;
