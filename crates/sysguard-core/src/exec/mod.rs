//! External collaborator invocation
//!
//! Every shelled-out tool (package manager, service manager, udev, module
//! loader) is described by a [`CommandSpec`] and run through a
//! [`CommandRunner`]. A nonzero exit is an [`ExternalError`] value the caller
//! aggregates, never a panic or an early return by default.

mod mock;

pub use mock::MockRunner;

use std::fmt;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use tracing::debug;

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Hard limit for the run; `None` waits for completion
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// The command as a single shell-like line, used for logs and matching.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Captured result of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Failure of an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalError {
    /// The program could not be started at all
    #[error("failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },

    /// The program ran and exited unsuccessfully
    #[error("`{command}` exited with {}: {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()), .stderr.trim())]
    NonZero {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The program exceeded its fixed timeout and was killed
    #[error("`{command}` timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },
}

/// Runs external commands.
///
/// Production code uses [`SystemRunner`]; tests use [`MockRunner`].
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> std::result::Result<CommandOutput, ExternalError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn run_with_timeout(
        &self,
        spec: &CommandSpec,
        limit: Duration,
    ) -> std::result::Result<Output, ExternalError> {
        let spawn_error = |e: std::io::Error| ExternalError::Spawn {
            command: spec.command_line(),
            message: e.to_string(),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(spawn_error)?;

        runtime.block_on(async {
            let mut cmd = tokio::process::Command::new(&spec.program);
            cmd.args(&spec.args)
                .stdin(Stdio::null())
                .kill_on_drop(true);

            match tokio::time::timeout(limit, cmd.output()).await {
                Ok(output) => output.map_err(spawn_error),
                Err(_) => Err(ExternalError::Timeout {
                    command: spec.command_line(),
                    after: limit,
                }),
            }
        })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> std::result::Result<CommandOutput, ExternalError> {
        debug!(command = %spec, timeout = ?spec.timeout, "running external command");

        let output = match spec.timeout {
            Some(limit) => self.run_with_timeout(spec, limit)?,
            None => Command::new(&spec.program)
                .args(&spec.args)
                .stdin(Stdio::null())
                .output()
                .map_err(|e| ExternalError::Spawn {
                    command: spec.command_line(),
                    message: e.to_string(),
                })?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(ExternalError::NonZero {
                command: spec.command_line(),
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_arguments() {
        let spec = CommandSpec::new("systemctl").args(["restart", "tlp.service"]);
        assert_eq!(spec.command_line(), "systemctl restart tlp.service");
        assert_eq!(CommandSpec::new("lsmod").command_line(), "lsmod");
    }

    #[test]
    fn nonzero_error_mentions_command_and_code() {
        let err = ExternalError::NonZero {
            command: "pacman -Q nvidia".into(),
            code: Some(1),
            stdout: String::new(),
            stderr: "error: package 'nvidia' was not found\n".into(),
        };
        let display = err.to_string();
        assert!(display.contains("pacman -Q nvidia"));
        assert!(display.contains("exited with 1"));
        assert!(display.contains("was not found"));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_reports_nonzero_exit() {
        let result = SystemRunner::new().run(&CommandSpec::new("false"));
        assert!(matches!(result, Err(ExternalError::NonZero { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_stdout() {
        let output = SystemRunner::new()
            .run(&CommandSpec::new("echo").arg("A=1"))
            .unwrap();
        assert_eq!(output.stdout.trim(), "A=1");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_enforces_timeout() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));
        let result = SystemRunner::new().run(&spec);
        assert!(matches!(result, Err(ExternalError::Timeout { .. })));
    }

    #[test]
    fn system_runner_reports_missing_program() {
        let result = SystemRunner::new().run(&CommandSpec::new("sysguard-no-such-program"));
        assert!(matches!(result, Err(ExternalError::Spawn { .. })));
    }
}
