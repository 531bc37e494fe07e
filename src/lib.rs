// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host setup and administration toolkit.
//!
//! hostwright bundles a set of small host chores: dotfile profiles for nano,
//! screen, and the shell, package installation, static IP configuration,
//! GitHub organization migration and cleanup, directory synchronization,
//! ollama screen sessions, and refreshing managed files from a remote copy.
//!
//! Each chore is a sequence of calls to tools that already exist on the host
//! (`apt-get`, `brew`, `gh`, `git`, `rsync`, `screen`, ...). What hostwright
//! adds on top is idempotency, backups, and confirmation prompts.
//!
//! # Idempotent Edits
//!
//! Configuration files are never rewritten wholesale. Each desired setting is
//! a [`rcfile::LineRule`]: a key pattern plus the line that should be there.
//! Matching lines that differ are commented out, not deleted, and the desired
//! line is appended once. Running the same edit twice changes nothing the
//! second time.

pub mod backup;
pub mod config;
pub mod dotfiles;
pub mod exit;
pub mod github;
pub mod ollama;
pub mod path;
pub mod prompt;
pub mod rcfile;
pub mod sync;
pub mod syscall;
pub mod system;
pub mod update;
