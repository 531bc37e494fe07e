// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod config;
mod gh;
mod usage;

use assert_cmd::cargo;
use std::path::Path;

/// Binary under test, isolated from the caller's settings and log filter.
pub(crate) fn hostwright(scratch: impl AsRef<Path>) -> assert_cmd::Command {
    let mut cmd = cargo::cargo_bin_cmd!("hostwright");
    cmd.env("RUST_LOG", "info")
        .env("HOSTWRIGHT_CONFIG", scratch.as_ref().join("config.toml"))
        .env_remove("DRY_RUN")
        .env_remove("SRC_ORG")
        .env_remove("DST_ORG")
        .env_remove("THROTTLE");
    cmd
}
