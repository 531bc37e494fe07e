// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of hostwright's settings file. Every section is
//! optional. Missing values fall back to environment variables or built-in
//! defaults chosen by each command, and command line flags always win.
//!
//! # General Layout
//!
//! ```toml
//! [github]
//! src_org = "old-org"
//! dst_org = "new-org"
//! throttle = 1.5
//! archive_label = "archived-pr"
//! workdir = "~/.cache/hostwright/mirrors"
//!
//! [sync]
//! exclude = [".DS_Store", "node_modules/"]
//!
//! [ollama]
//! session = "ollama"
//! models = ["llama3", "qwen2.5-coder"]
//! host = "http://127.0.0.1:11434"
//!
//! [[update.source]]
//! url = "https://example.org/dotfiles/nanorc"
//! target = "~/.nanorc"
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Settings file layout.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Defaults for GitHub organization tooling.
    pub github: GithubSettings,

    /// Defaults for directory synchronization.
    pub sync: SyncSettings,

    /// Defaults for ollama screen sessions.
    pub ollama: OllamaSettings,

    /// Remote sources of managed files.
    pub update: UpdateSettings,
}

impl Settings {
    /// Load settings from target path.
    ///
    /// A missing settings file is not an error, it just means defaults.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no settings at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("load settings from {:?}", path.display());
        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        if let Some(workdir) = settings.github.workdir.take() {
            settings.github.workdir = Some(expand_path(&workdir)?);
        }
        for source in &mut settings.update.sources {
            source.target = expand_path(&source.target)?;
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// GitHub organization tooling defaults.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GithubSettings {
    /// Organization to copy from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_org: Option<String>,

    /// Organization to copy into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_org: Option<String>,

    /// Seconds to sleep after each mutating API call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<f64>,

    /// Label attached to issues that archive pull requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_label: Option<String>,

    /// Scratch directory for bare repository mirrors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

/// Directory synchronization defaults.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Patterns always excluded from synchronization.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Ollama screen session defaults.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OllamaSettings {
    /// Name of screen session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Models to open a window for.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    /// Base URL of ollama API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Managed file sources.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateSettings {
    #[serde(rename = "source", skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<UpdateSource>,
}

/// Remote file that keeps a local file up to date.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct UpdateSource {
    /// Where to fetch content from.
    pub url: String,

    /// Local file to overwrite.
    pub target: PathBuf,
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
