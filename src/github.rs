// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub organization tooling.
//!
//! Copying an organization into another, and deleting repositories of an
//! organization in bulk. All API access goes through the `gh` CLI.

pub mod api;
pub mod client;
pub mod copy;
pub mod delete;
pub mod mirror;
pub mod model;
