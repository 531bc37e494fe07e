// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Process exit codes.

use crate::syscall;

pub const SUCCESS: i32 = 0;

/// Usage errors, and anything not covered by a more specific code.
pub const GENERAL: i32 = 1;

/// Required external tool is missing, or exited with failure.
pub const TOOL: i32 = 2;

pub const CONNECTIVITY: i32 = 3;

/// Remote host or service cannot be reached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot reach {target}: {reason}")]
pub struct ConnectivityError {
    pub target: String,
    pub reason: String,
}

impl ConnectivityError {
    pub fn new(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Pick exit code for error by the first classifiable cause in its chain.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| {
            if cause.is::<ConnectivityError>() {
                return Some(CONNECTIVITY);
            }

            match cause.downcast_ref::<syscall::Error>() {
                Some(syscall::Error::MissingTool { .. } | syscall::Error::Failed { .. }) => Some(TOOL),
                _ => None,
            }
        })
        .unwrap_or(GENERAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::pkg::PkgError;
    use anyhow::Context;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_tool_nested_in_module_error() {
        let error = PkgError::Syscall(syscall::Error::MissingTool {
            program: "apt-get".into(),
        });
        let error = anyhow::Error::new(error).context("installing packages");
        assert_eq!(exit_code(&error), TOOL);
    }

    #[test]
    fn connectivity_through_context() {
        let result: anyhow::Result<()> =
            Err(ConnectivityError::new("pi.local", "ssh exited with 255")).context("syncing");
        assert_eq!(exit_code(&result.unwrap_err()), CONNECTIVITY);
    }

    #[test]
    fn anything_else_is_general() {
        assert_eq!(exit_code(&anyhow::anyhow!("nope")), GENERAL);
        let spawn = syscall::Error::Spawn {
            source: std::io::Error::other("denied"),
            call: "rsync".into(),
        };
        assert_eq!(exit_code(&anyhow::Error::new(spawn)), GENERAL);
    }
}
