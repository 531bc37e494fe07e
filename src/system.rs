// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host system setup.
//!
//! Package installation, privilege checks, and static network
//! configuration.

pub mod net;
pub mod pkg;
pub mod privilege;
