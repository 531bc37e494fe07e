// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ollama inside GNU screen.
//!
//! Generates a screen layout with one window for `ollama serve` and one
//! window per model, then starts a detached screen session from it.

use crate::{
    exit::ConnectivityError,
    syscall::{self, Shell, Syscall},
};

use std::{
    fs::write,
    path::{Path, PathBuf},
    thread::sleep,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument};

pub const DEFAULT_SESSION: &str = "ollama";
pub const DEFAULT_HOST: &str = "http://127.0.0.1:11434";

/// Seconds model windows wait for a freshly started server.
const SERVE_DELAY: u64 = 3;

/// Check whether the ollama API answers.
pub trait ApiProbe {
    fn is_up(&self, host: &str) -> bool;
}

/// Probe the ollama API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    /// Construct new HTTP probe.
    ///
    /// # Errors
    ///
    /// - Return [`OllamaError::Http`] if HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self { client })
    }
}

impl ApiProbe for HttpProbe {
    fn is_up(&self, host: &str) -> bool {
        let url = format!("{}/api/version", host.trim_end_matches('/'));
        let up = self
            .client
            .get(url.as_str())
            .send()
            .map(|response| response.status().is_success())
            .unwrap_or(false);
        debug!("{url} up: {up}");
        up
    }
}

/// Screen layout running ollama.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    serve: bool,
    models: Vec<String>,
}

impl Layout {
    /// Construct new layout.
    ///
    /// With `serve` set, window 0 runs `ollama serve` and model windows wait
    /// a moment for it to come up.
    pub fn new(serve: bool, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            serve,
            models: models.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.serve && self.models.is_empty()
    }

    /// Render screenrc content.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "# Generated by hostwright, changes are overwritten.".to_string(),
            "startup_message off".into(),
            "defscrollback 10000".into(),
            "hardstatus alwayslastline".into(),
            "hardstatus string '%{= kG}[ %{G}%H %{g}][%= %{= kw}%-w%{r}(%{W}%n*%t%{r})%{w}%+w%= %{g}]'".into(),
        ];

        if self.serve {
            lines.push("screen -t serve 0 ollama serve".into());
        }

        for (window, model) in (1..).zip(&self.models) {
            let run = if self.serve {
                format!("sleep {SERVE_DELAY}; exec ollama run {model}")
            } else {
                format!("exec ollama run {model}")
            };
            lines.push(format!("screen -t {model} {window} sh -c '{run}'"));
        }

        lines.push(if self.models.is_empty() { "select 0" } else { "select 1" }.into());
        lines.join("\n") + "\n"
    }
}

/// Make sure model name is safe to place in a screen layout.
///
/// Names look like `llama3`, `qwen2.5:7b`, or `library/mistral:latest`.
///
/// # Errors
///
/// - Return [`OllamaError::InvalidModel`] for anything else.
pub fn validate_model(model: &str) -> Result<()> {
    let valid = model
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphanumeric())
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '-'));
    if !valid {
        return Err(OllamaError::InvalidModel(model.into()));
    }

    Ok(())
}

/// Path of generated layout file for session.
pub fn layout_path(home: &Path, session: &str) -> PathBuf {
    if session == DEFAULT_SESSION {
        home.join(".screenrc-ollama")
    } else {
        home.join(format!(".screenrc-ollama-{session}"))
    }
}

/// Check if a screen session of given name is running.
///
/// # Errors
///
/// - Return [`OllamaError::Syscall`] if `screen` cannot be run.
pub fn session_exists(shell: &impl Shell, session: &str) -> Result<bool> {
    // INVARIANT: `screen -ls` exits non-zero when no session exists at all.
    let output = shell.capture(&Syscall::new("screen").arg("-ls"))?;
    Ok(output.stdout.lines().any(|line| {
        line.split_whitespace()
            .next()
            .and_then(|id| id.split_once('.'))
            .is_some_and(|(pid, name)| pid.chars().all(|c| c.is_ascii_digit()) && name == session)
    }))
}

/// Poll API until it answers or timeout runs out.
///
/// # Errors
///
/// - Return [`OllamaError::Connectivity`] on timeout.
pub fn wait_ready(probe: &impl ApiProbe, host: &str, timeout: Duration, interval: Duration) -> Result<()> {
    let started = Instant::now();
    loop {
        if probe.is_up(host) {
            info!("ollama is ready at {host}");
            return Ok(());
        }

        if started.elapsed() >= timeout {
            return Err(ConnectivityError::new(
                host,
                format!("ollama did not answer within {}s", timeout.as_secs()),
            )
            .into());
        }

        sleep(interval);
    }
}

/// How to launch a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub session: String,
    pub models: Vec<String>,
    pub host: String,
    pub detach: bool,
    pub wait: Option<Duration>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            session: DEFAULT_SESSION.into(),
            models: Vec::new(),
            host: DEFAULT_HOST.into(),
            detach: false,
            wait: None,
        }
    }
}

/// What launching did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started { layout: PathBuf },

    /// Session already exists, nothing was started.
    AlreadyRunning,

    /// Server already answers and no models were requested.
    NothingToRun,
}

/// Starts ollama screen sessions.
#[derive(Debug)]
pub struct Launcher<'a, S: Shell, P: ApiProbe> {
    shell: &'a S,
    probe: &'a P,
    home: PathBuf,
    poll_interval: Duration,
}

impl<'a, S: Shell, P: ApiProbe> Launcher<'a, S, P> {
    pub fn new(shell: &'a S, probe: &'a P, home: impl Into<PathBuf>) -> Self {
        Self {
            shell,
            probe,
            home: home.into(),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Launch screen session.
    ///
    /// # Errors
    ///
    /// - Return [`OllamaError::InvalidModel`] if a model name is not safe to
    ///   run from the layout.
    /// - Return [`OllamaError::Syscall`] if `screen` or `ollama` is missing,
    ///   or `screen` fails.
    /// - Return [`OllamaError::Write`] if layout cannot be written.
    /// - Return [`OllamaError::Connectivity`] if waiting for the API times
    ///   out.
    #[instrument(skip(self), level = "debug")]
    pub fn launch(&self, options: &LaunchOptions) -> Result<LaunchOutcome> {
        for model in &options.models {
            validate_model(model)?;
        }

        self.shell.require("screen")?;
        self.shell.require("ollama")?;

        let session = options.session.as_str();
        if session_exists(self.shell, session)? {
            info!("screen session {session:?} already running, attach with `screen -r {session}`");
            return Ok(LaunchOutcome::AlreadyRunning);
        }

        let serve = !self.probe.is_up(&options.host);
        if !serve {
            info!("ollama already serving at {}", options.host);
        }

        let layout = Layout::new(serve, options.models.iter().cloned());
        if layout.is_empty() {
            info!("no models requested, nothing to start");
            return Ok(LaunchOutcome::NothingToRun);
        }

        let path = layout_path(&self.home, session);
        write(&path, layout.render()).map_err(|err| OllamaError::Write {
            source: err,
            path: path.clone(),
        })?;
        debug!("wrote layout to {}", path.display());

        let start = Syscall::new("screen")
            .args(["-dmS", session, "-c"])
            .arg(path.to_string_lossy());
        self.shell.run(&start)?;
        info!("started screen session {session:?}");

        if let Some(timeout) = options.wait {
            wait_ready(self.probe, &options.host, timeout, self.poll_interval)?;
        }

        if options.detach {
            info!("attach with `screen -r {session}`");
        } else {
            self.shell
                .run_interactive(&Syscall::new("screen").args(["-r", session]))?;
        }

        Ok(LaunchOutcome::Started { layout: path })
    }
}

/// Ollama session error types.
#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("invalid model name {0:?}")]
    InvalidModel(String),

    #[error("failed to write screen layout to {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("ollama api unreachable")]
    Connectivity(#[from] ConnectivityError),

    #[error("failed to run screen")]
    Syscall(#[from] syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = OllamaError> = std::result::Result<T, E>;
