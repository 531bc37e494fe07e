// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Raw access to GitHub's REST and GraphQL APIs.
//!
//! hostwright never stores a token of its own. Every request goes through
//! `gh api`, so whatever account `gh auth login` set up is the account that
//! gets used.

use crate::syscall::{Shell, Syscall};

use serde_json::{json, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, instrument};

/// HTTP method of a REST request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Display for Method {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// Transport for GitHub API requests.
pub trait GitHubApi {
    /// Perform REST request against endpoint relative to the API root.
    ///
    /// Empty responses decode as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// - Return [`ApiError`] if the request fails.
    fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value>;

    /// Perform GraphQL query, returning its `data` member.
    ///
    /// # Errors
    ///
    /// - Return [`ApiError::GraphQl`] if the response carries errors.
    fn graphql(&self, query: &str, variables: &Value) -> Result<Value>;
}

/// GitHub API access through the `gh` CLI.
#[derive(Debug)]
pub struct GhCli<'s, S: Shell> {
    shell: &'s S,
}

impl<'s, S: Shell> GhCli<'s, S> {
    /// Construct new `gh` backed API transport.
    pub fn new(shell: &'s S) -> Self {
        Self { shell }
    }

    /// Make sure `gh` is installed and logged in.
    ///
    /// # Errors
    ///
    /// - Return [`ApiError::Syscall`] if `gh` is missing.
    /// - Return [`ApiError::Unauthenticated`] if `gh` is not logged in.
    pub fn ensure_authenticated(&self) -> Result<()> {
        self.shell.require("gh")?;
        let output = self
            .shell
            .capture(&Syscall::new("gh").args(["auth", "status"]))?;
        if !output.success() {
            return Err(ApiError::Unauthenticated(output.message()));
        }

        Ok(())
    }

    fn call(&self, call: Syscall, endpoint: &str) -> Result<Value> {
        let output = self.shell.capture(&call)?;
        if !output.success() {
            return Err(classify_failure(endpoint, &output.message()));
        }

        if output.stdout.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&output.stdout).map_err(|err| ApiError::Decode {
            source: err,
            endpoint: endpoint.into(),
        })
    }
}

impl<S: Shell> GitHubApi for GhCli<'_, S> {
    #[instrument(skip(self, body), level = "debug")]
    fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        let method_name = method.to_string();
        let mut call = Syscall::new("gh").args([
            "api",
            "--method",
            method_name.as_str(),
            "-H",
            "Accept: application/vnd.github+json",
            endpoint,
        ]);
        if let Some(body) = body {
            call = call
                .args(["--input", "-"])
                .stdin(serde_json::to_string(body).map_err(ApiError::Encode)?);
        }

        debug!("{method} {endpoint}");
        self.call(call, endpoint)
    }

    #[instrument(skip(self, query, variables), level = "debug")]
    fn graphql(&self, query: &str, variables: &Value) -> Result<Value> {
        let body = json!({ "query": query, "variables": variables });
        let call = Syscall::new("gh")
            .args(["api", "graphql", "--input", "-"])
            .stdin(serde_json::to_string(&body).map_err(ApiError::Encode)?);

        let response = self.call(call, "graphql")?;
        graphql_data(response)
    }
}

/// Split GraphQL response into data or error.
///
/// # Errors
///
/// - Return [`ApiError::GraphQl`] if response carries a non-empty `errors`.
pub fn graphql_data(mut response: Value) -> Result<Value> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .map(|error| {
                    error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string()
                })
                .collect::<Vec<_>>();
            return Err(ApiError::GraphQl(messages.join("; ")));
        }
    }

    Ok(response.get_mut("data").map(Value::take).unwrap_or(Value::Null))
}

fn classify_failure(endpoint: &str, message: &str) -> ApiError {
    let status = http_status(message);
    let lower = message.to_lowercase();

    match status {
        Some(404) => ApiError::NotFound {
            endpoint: endpoint.into(),
        },
        Some(401) => ApiError::Unauthenticated(message.into()),
        Some(403) | Some(429)
            if lower.contains("rate limit") || lower.contains("abuse") =>
        {
            ApiError::RateLimited {
                endpoint: endpoint.into(),
                message: message.into(),
            }
        }
        _ => ApiError::Http {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        },
    }
}

/// Pull HTTP status out of `gh`'s "(HTTP 404)" error suffix.
fn http_status(message: &str) -> Option<u16> {
    let (_, rest) = message.rsplit_once("HTTP ")?;
    rest.get(..3)?.parse().ok()
}

/// GitHub API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource does not exist, or is invisible to the current account.
    #[error("{endpoint} not found")]
    NotFound { endpoint: String },

    /// Not logged in, or token expired.
    #[error("not authenticated with GitHub, run `gh auth login` first:\n{0}")]
    Unauthenticated(String),

    /// Primary or secondary rate limit hit.
    #[error("rate limited at {endpoint}: {message}")]
    RateLimited { endpoint: String, message: String },

    /// Any other failed request.
    #[error("request to {endpoint} failed (status {status:?}): {message}")]
    Http {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// GraphQL query answered with errors.
    #[error("graphql query failed: {0}")]
    GraphQl(String),

    /// Response is not what was expected.
    #[error("unexpected response from {endpoint}")]
    Decode {
        #[source]
        source: serde_json::Error,
        endpoint: String,
    },

    /// Request body cannot be encoded.
    #[error(transparent)]
    Encode(serde_json::Error),

    /// `gh` itself could not be run.
    #[error("failed to run gh")]
    Syscall(#[from] crate::syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ApiError> = std::result::Result<T, E>;
