//! Test utilities and mocks for stager unit tests.
//!
//! [`MockExecutor`] stands in for the system command runner: it records
//! every command line and answers with scripted output, so builders can be
//! driven end to end without cmake, ninja or a compiler installed.
//!
//! # Example
//!
//! ```rust,ignore
//! let exec = Arc::new(MockExecutor::new());
//! exec.expect_contains("llvm-objdump -p", "SONAME libedit.so.0\n");
//! let ctx = test_context(tmp.path(), Arc::clone(&exec));
//! // run a builder against ctx...
//! assert!(exec.calls()[0].contains("cmake -G Ninja"));
//! ```

pub mod fixtures;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::builder::context::BuildContext;
use crate::core::errors::BuildError;
use crate::util::config::{Config, Paths};
use crate::util::process::{CommandRunner, ProcessBuilder};

pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    /// Standard output.
    pub stdout: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
        }
    }

    /// Create a failure output with the given status code.
    pub fn failure(status: i32) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
        }
    }

    /// Check if the process succeeded.
    pub fn success_status(&self) -> bool {
        self.status == 0
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in MockExecutor.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    expectations: Vec<(CommandPattern, MockProcessOutput)>,
    calls: Vec<String>,
}

/// Mock command runner.
///
/// Every command is recorded by its [`ProcessBuilder::display_command`]
/// rendering. The first matching expectation supplies the result; anything
/// unmatched succeeds with empty output.
#[derive(Debug, Default)]
pub struct MockExecutor {
    inner: Mutex<Recorded>,
}

impl MockExecutor {
    /// Create a new mock executor.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pattern: CommandPattern, output: MockProcessOutput) {
        self.lock().expectations.push((pattern, output));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer an exact command line with `stdout`.
    pub fn expect(&self, cmd: &str, stdout: impl Into<String>) {
        self.push(
            CommandPattern::Exact(cmd.to_string()),
            MockProcessOutput::success(stdout),
        );
    }

    /// Answer commands starting with `prefix` with `stdout`.
    pub fn expect_prefix(&self, prefix: &str, stdout: impl Into<String>) {
        self.push(
            CommandPattern::StartsWith(prefix.to_string()),
            MockProcessOutput::success(stdout),
        );
    }

    /// Answer commands containing `substring` with `stdout`.
    pub fn expect_contains(&self, substring: &str, stdout: impl Into<String>) {
        self.push(
            CommandPattern::Contains(substring.to_string()),
            MockProcessOutput::success(stdout),
        );
    }

    /// Make commands containing `substring` exit with `status`.
    pub fn fail_on(&self, substring: &str, status: i32) {
        self.push(
            CommandPattern::Contains(substring.to_string()),
            MockProcessOutput::failure(status),
        );
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn dispatch(&self, cmd: &ProcessBuilder) -> Result<String> {
        let display = cmd.display_command();
        let mut inner = self.lock();
        inner.calls.push(display.clone());

        let output = inner
            .expectations
            .iter()
            .find(|(pattern, _)| pattern.matches(&display))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();

        if !output.success_status() {
            return Err(BuildError::ToolFailed {
                command: display,
                code: Some(output.status),
            }
            .into());
        }
        Ok(output.stdout)
    }
}

impl CommandRunner for MockExecutor {
    fn run(&self, cmd: &ProcessBuilder) -> Result<()> {
        self.dispatch(cmd).map(|_| ())
    }

    fn output(&self, cmd: &ProcessBuilder) -> Result<String> {
        self.dispatch(cmd)
    }
}

/// A build context rooted at `root` that runs commands through `exec`.
pub fn test_context(root: &Path, exec: impl Into<Arc<MockExecutor>>) -> BuildContext {
    let mut config = Config::default();
    config.build.jobs = Some(4);
    let exec: Arc<MockExecutor> = exec.into();
    let runner: Arc<dyn CommandRunner> = exec;
    BuildContext::new(Paths::from_root(root), &config).with_runner(runner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_executor_records_and_scripts() {
        let exec = MockExecutor::new();
        exec.expect_prefix("/tc/bin/llvm-nm", "0 T foo\n");
        exec.fail_on("ninja install", 1);

        let nm = ProcessBuilder::new("/tc/bin/llvm-nm").arg("lib.so");
        assert_eq!(exec.output(&nm).unwrap(), "0 T foo\n");
        assert!(exec.run(&ProcessBuilder::new("ninja")).is_ok());

        let err = exec
            .run(&ProcessBuilder::new("ninja").arg("install"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ToolFailed { code: Some(1), .. })
        ));
        assert_eq!(
            exec.calls(),
            vec!["/tc/bin/llvm-nm lib.so", "ninja", "ninja install"]
        );
    }
}
