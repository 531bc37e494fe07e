// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::{env, path::PathBuf};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to hostwright's settings file.
///
/// Uses `$HOSTWRIGHT_CONFIG` if set. Otherwise falls back to XDG Base
/// Directory path `$XDG_CONFIG_HOME/hostwright/config.toml`. Does not check if
/// the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os("HOSTWRIGHT_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|path| path.join("hostwright").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to scratch space for repository mirrors.
///
/// Uses `$XDG_CACHE_HOME/hostwright/mirrors`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_mirror_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|path| path.join("hostwright").join("mirrors"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
