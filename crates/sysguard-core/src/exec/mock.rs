//! Scripted command runner for tests and dry environments.

use std::sync::Mutex;

use super::{CommandOutput, CommandRunner, CommandSpec, ExternalError};

#[derive(Debug, Clone)]
enum Response {
    Succeed(String),
    Fail { code: i32, stderr: String },
}

/// A [`CommandRunner`] that never spawns processes.
///
/// Responses are matched by command-line prefix, first rule wins; unmatched
/// commands succeed with empty output. Every call is recorded.
#[derive(Debug, Default)]
pub struct MockRunner {
    rules: Mutex<Vec<(String, Response)>>,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` succeed and print `stdout`.
    pub fn respond(&self, prefix: &str, stdout: &str) -> &Self {
        self.push(prefix, Response::Succeed(stdout.to_string()));
        self
    }

    /// Commands starting with `prefix` exit with `code` and print `stderr`.
    pub fn fail(&self, prefix: &str, code: i32, stderr: &str) -> &Self {
        self.push(
            prefix,
            Response::Fail {
                code,
                stderr: stderr.to_string(),
            },
        );
        self
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether any recorded command line starts with `prefix`.
    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    fn push(&self, prefix: &str, response: Response) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((prefix.to_string(), response));
        }
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExternalError> {
        let line = spec.command_line();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }

        let response = self.rules.lock().ok().and_then(|rules| {
            rules
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, r)| r.clone())
        });

        match response {
            None => Ok(CommandOutput::default()),
            Some(Response::Succeed(stdout)) => Ok(CommandOutput::with_stdout(stdout)),
            Some(Response::Fail { code, stderr }) => Err(ExternalError::NonZero {
                command: line,
                code: Some(code),
                stdout: String::new(),
                stderr,
            }),
        }
    }
}
