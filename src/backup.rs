// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Timestamped backups.
//!
//! Before hostwright touches a file that already exists, a copy is placed
//! beside it as `<file>.bak.<YYYYmmddHHMMSS>`. A file is backed up at most
//! once per run, so the backup always holds the content from before the run
//! started.

use chrono::NaiveDateTime;
use std::{
    collections::HashSet,
    fs::copy,
    path::{Path, PathBuf},
};
use tracing::info;

/// Backups taken during one run.
#[derive(Debug, Clone)]
pub struct Backups {
    stamp: String,
    taken: HashSet<PathBuf>,
}

impl Backups {
    /// Construct new backup tracker for a run started at given time.
    pub fn new(started: NaiveDateTime) -> Self {
        Self {
            stamp: started.format("%Y%m%d%H%M%S").to_string(),
            taken: HashSet::new(),
        }
    }

    /// Back up target file once.
    ///
    /// Returns path of the new backup, or `None` if the file does not exist
    /// or was already backed up during this run.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError`] if the copy fails.
    pub fn backup(&mut self, path: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let path = path.as_ref();
        if !path.is_file() || self.taken.contains(path) {
            return Ok(None);
        }

        let backup = backup_path(path, &self.stamp);
        copy(path, &backup).map_err(|err| BackupError {
            source: err,
            path: path.to_path_buf(),
            backup: backup.clone(),
        })?;
        info!("backed up {:?} to {:?}", path.display(), backup.display());
        self.taken.insert(path.to_path_buf());

        Ok(Some(backup))
    }
}

/// Determine backup file path for a file and timestamp.
pub fn backup_path(path: impl AsRef<Path>, stamp: &str) -> PathBuf {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.bak.{stamp}"))
}

/// File could not be backed up.
#[derive(Debug, thiserror::Error)]
#[error("failed to back up {:?} to {:?}", path.display(), backup.display())]
pub struct BackupError {
    #[source]
    source: std::io::Error,
    path: PathBuf,
    backup: PathBuf,
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
