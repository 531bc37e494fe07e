// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Nearly everything hostwright does ends in a call to some pre-existing
//! system tool: `gh`, `git`, `apt-get`, `rsync`, `screen`, etc. All of those
//! calls are described as a [`Syscall`] and executed through a [`Shell`].
//! The [`SystemShell`] spawns real processes, while tests drive the same code
//! paths through a scripted shell that only records what would have run.

use std::{
    env,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, instrument};

/// Description of an external command invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Syscall {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
}

impl Syscall {
    /// Construct new call to target program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed data through standard input of the program.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn program(&self) -> &str {
        self.program.as_str()
    }

    pub fn arguments(&self) -> &[String] {
        self.args.as_slice()
    }

    pub fn input(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Place program in front of current program, e.g., "sudo".
    pub fn wrapped_by(self, program: impl Into<String>) -> Self {
        let mut args = vec![self.program];
        args.extend(self.args);
        Self {
            program: program.into(),
            args,
            stdin: self.stdin,
        }
    }
}

impl Display for Syscall {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(fmt, " {arg:?}")?;
            } else {
                write!(fmt, " {arg}")?;
            }
        }

        Ok(())
    }
}

/// Captured result of a finished call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyscallOutput {
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl SyscallOutput {
    /// Successful output with given standard output.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with given exit code and standard error.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Combine stdout and stderr into one chomped message.
    pub fn message(&self) -> String {
        let mut message = String::new();
        if !self.stdout.is_empty() {
            message.push_str(self.stdout.as_str());
        }

        if !self.stderr.is_empty() {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(self.stderr.as_str());
        }

        chomp(message)
    }
}

/// Executor of external commands.
pub trait Shell {
    /// Run call to completion and capture its output.
    ///
    /// A non-zero exit status is _not_ an error here. Only failure to spawn
    /// the process is.
    ///
    /// # Errors
    ///
    /// - Return [`Error::MissingTool`] if program cannot be found.
    /// - Return [`Error::Spawn`] if process cannot be spawned.
    fn capture(&self, call: &Syscall) -> Result<SyscallOutput>;

    /// Run call with inherited standard streams, blocking until it exits.
    ///
    /// Returns the exit code of the process.
    ///
    /// # Errors
    ///
    /// - Return [`Error::MissingTool`] if program cannot be found.
    /// - Return [`Error::Spawn`] if process cannot be spawned.
    fn interactive(&self, call: &Syscall) -> Result<Option<i32>>;

    /// Check if program is available.
    fn has_program(&self, program: &str) -> bool;

    /// Run call, and treat non-zero exit status as failure.
    ///
    /// Returns chomped standard output.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Failed`] if call exits with non-zero status.
    fn run(&self, call: &Syscall) -> Result<String> {
        let output = self.capture(call)?;
        if !output.success() {
            return Err(Error::Failed {
                call: call.to_string(),
                code: output.code,
                message: output.message(),
            });
        }

        Ok(chomp(output.stdout))
    }

    /// Run call interactively, and treat non-zero exit status as failure.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Failed`] if call exits with non-zero status.
    fn run_interactive(&self, call: &Syscall) -> Result<()> {
        let code = self.interactive(call)?;
        if code != Some(0) {
            return Err(Error::Failed {
                call: call.to_string(),
                code,
                message: String::new(),
            });
        }

        Ok(())
    }

    /// Make sure program is available.
    ///
    /// # Errors
    ///
    /// - Return [`Error::MissingTool`] if program cannot be found.
    fn require(&self, program: &str) -> Result<()> {
        if self.has_program(program) {
            Ok(())
        } else {
            Err(Error::MissingTool {
                program: program.into(),
            })
        }
    }
}

/// Shell that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, call: &Syscall) -> Command {
        let mut command = Command::new(call.program());
        command.args(call.arguments());
        command
    }
}

impl Shell for SystemShell {
    #[instrument(skip(self, call), fields(call = %call), level = "debug")]
    fn capture(&self, call: &Syscall) -> Result<SyscallOutput> {
        let mut command = self.command(call);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        if call.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command.spawn().map_err(|err| spawn_error(call, err))?;
        if let (Some(input), Some(mut pipe)) = (call.input(), child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .map_err(|err| Error::Stdin {
                    source: err,
                    call: call.to_string(),
                })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| spawn_error(call, err))?;
        let output = SyscallOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        };
        debug!("exit code {:?}", output.code);

        Ok(output)
    }

    #[instrument(skip(self, call), fields(call = %call), level = "debug")]
    fn interactive(&self, call: &Syscall) -> Result<Option<i32>> {
        let status = self
            .command(call)
            .spawn()
            .and_then(|mut child| child.wait())
            .map_err(|err| spawn_error(call, err))?;

        Ok(status.code())
    }

    fn has_program(&self, program: &str) -> bool {
        find_program(program).is_some()
    }
}

/// Locate program through `$PATH`.
///
/// Programs given as paths are checked directly.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .flat_map(|dir| executable_names(program).map(move |name| dir.join(name)))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn executable_names(program: &str) -> impl Iterator<Item = String> {
    std::iter::once(program.to_string())
}

#[cfg(windows)]
fn executable_names(program: &str) -> impl Iterator<Item = String> {
    let program = program.to_string();
    [String::new(), ".exe".into(), ".cmd".into(), ".bat".into()]
        .into_iter()
        .map(move |ext| format!("{program}{ext}"))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn spawn_error(call: &Syscall, err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::MissingTool {
            program: call.program().into(),
        }
    } else {
        Error::Spawn {
            source: err,
            call: call.to_string(),
        }
    }
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// External command error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required program is not installed.
    #[error("required tool {program:?} not found, install it first")]
    MissingTool { program: String },

    /// Program exited with non-zero status.
    #[error("command `{call}` failed ({}):\n{message}", exit_label(*code))]
    Failed {
        call: String,
        code: Option<i32>,
        message: String,
    },

    /// Program could not be spawned.
    #[error("failed to spawn `{call}`")]
    Spawn {
        #[source]
        source: std::io::Error,
        call: String,
    },

    /// Standard input could not be written.
    #[error("failed to write standard input of `{call}`")]
    Stdin {
        #[source]
        source: std::io::Error,
        call: String,
    },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".into(),
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::{cell::RefCell, collections::HashSet};

    /// Shell that records calls, and answers them from a script.
    ///
    /// Responses are matched by prefix against the rendered call. First
    /// match wins. Unmatched calls succeed with empty output.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedShell {
        calls: RefCell<Vec<Syscall>>,
        responses: RefCell<Vec<(String, SyscallOutput)>>,
        missing: HashSet<String>,
    }

    impl ScriptedShell {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn without(mut self, program: &str) -> Self {
            self.missing.insert(program.into());
            self
        }

        pub(crate) fn respond(&self, prefix: &str, output: SyscallOutput) {
            self.responses.borrow_mut().push((prefix.into(), output));
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.borrow().iter().map(ToString::to_string).collect()
        }

        pub(crate) fn recorded(&self) -> Vec<Syscall> {
            self.calls.borrow().clone()
        }

        pub(crate) fn called(&self, prefix: &str) -> bool {
            self.calls().iter().any(|call| call.starts_with(prefix))
        }

        fn answer(&self, call: &Syscall) -> Result<SyscallOutput> {
            if self.missing.contains(call.program()) {
                return Err(Error::MissingTool {
                    program: call.program().into(),
                });
            }

            self.calls.borrow_mut().push(call.clone());
            let rendered = call.to_string();
            let output = self
                .responses
                .borrow()
                .iter()
                .find(|(prefix, _)| rendered.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(|| SyscallOutput::ok(""));

            Ok(output)
        }
    }

    impl Shell for ScriptedShell {
        fn capture(&self, call: &Syscall) -> Result<SyscallOutput> {
            self.answer(call)
        }

        fn interactive(&self, call: &Syscall) -> Result<Option<i32>> {
            self.answer(call).map(|output| output.code)
        }

        fn has_program(&self, program: &str) -> bool {
            !self.missing.contains(program)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn syscall_display_quotes_whitespace() {
        let call = Syscall::new("gh")
            .args(["issue", "create", "--title"])
            .arg("hello world")
            .arg("");
        assert_eq!(call.to_string(), r#"gh issue create --title "hello world" """#);
    }

    #[test]
    fn syscall_wrapped_by_sudo() {
        let call = Syscall::new("apt-get")
            .args(["install", "-y", "nano"])
            .wrapped_by("sudo");
        assert_eq!(call.program(), "sudo");
        assert_eq!(call.to_string(), "sudo apt-get install -y nano");
    }

    #[test]
    fn output_message_chomps_and_joins() {
        let output = SyscallOutput {
            code: Some(1),
            stdout: "partial\n".into(),
            stderr: "HTTP 404: Not Found\n".into(),
        };
        assert_eq!(output.message(), "partial\nHTTP 404: Not Found");
    }

    #[test]
    fn run_turns_non_zero_exit_into_error() {
        let shell = fake::ScriptedShell::new();
        shell.respond("git push", SyscallOutput::failed(128, "denied"));

        let result = shell.run(&Syscall::new("git").arg("push"));
        assert!(matches!(result, Err(Error::Failed { code: Some(128), .. })));

        let result = shell.run(&Syscall::new("git").arg("status")).unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn require_reports_missing_tool() {
        let shell = fake::ScriptedShell::new().without("robocopy");
        let result = shell.require("robocopy");
        assert!(matches!(result, Err(Error::MissingTool { program }) if program == "robocopy"));
    }

    #[cfg(unix)]
    #[test]
    fn system_shell_captures_output() -> anyhow::Result<()> {
        let output = SystemShell::new().capture(&Syscall::new("sh").args(["-c", "echo hi; echo oops >&2; exit 3"]))?;
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.stderr, "oops\n");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn system_shell_feeds_stdin() -> anyhow::Result<()> {
        let output = SystemShell::new().run(&Syscall::new("cat").stdin("{\"a\":1}"))?;
        assert_eq!(output, "{\"a\":1}");
        Ok(())
    }

    #[test]
    fn system_shell_missing_program() {
        let result = SystemShell::new().capture(&Syscall::new("hostwright-surely-missing-tool"));
        assert!(matches!(result, Err(Error::MissingTool { .. })));
    }
}
