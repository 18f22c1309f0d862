//! Subprocess execution utilities.
//!
//! Every external tool the stager drives goes through a [`CommandRunner`]
//! so builds can be replayed against a recording runner in tests.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::core::errors::BuildError;
use crate::util::fs::{set_executable, write_string};

/// Builder for subprocess execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable. Only overrides are recorded; the rest of
    /// the environment is inherited.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables.
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the environment overrides.
    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Display the command for logs and error messages, quoted so it can be
    /// pasted into a shell.
    pub fn display_command(&self) -> String {
        let mut parts = vec![shell_quote(&self.program.display().to_string())];
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

/// Runs external commands on behalf of builders.
pub trait CommandRunner: Send + Sync {
    /// Run to completion with inherited stdio. Nonzero exit is an error.
    fn run(&self, cmd: &ProcessBuilder) -> Result<()>;

    /// Run to completion and capture stdout. Nonzero exit is an error.
    fn output(&self, cmd: &ProcessBuilder) -> Result<String>;
}

/// Runs commands on the real system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ProcessBuilder) -> Result<()> {
        let display = cmd.display_command();
        let shown = &display;
        tracing::debug!("running: {}", shown);

        let status = cmd
            .build_command()
            .status()
            .with_context(|| BuildError::ToolSpawn {
                command: display.clone(),
            })?;

        if !status.success() {
            return Err(BuildError::ToolFailed {
                command: display,
                code: status.code(),
            }
            .into());
        }
        Ok(())
    }

    fn output(&self, cmd: &ProcessBuilder) -> Result<String> {
        let display = cmd.display_command();
        let shown = &display;
        tracing::debug!("running: {}", shown);

        let output = cmd
            .build_command()
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| BuildError::ToolSpawn {
                command: display.clone(),
            })?;

        if !output.status.success() {
            return Err(BuildError::ToolFailed {
                command: display,
                code: output.status.code(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Write a shell script that reproduces `cmd`, for operators to rerun a
/// failed step by hand. Extra arguments passed to the script are forwarded.
pub fn write_invocation_script(path: &Path, cmd: &ProcessBuilder) -> Result<()> {
    let mut script = String::from("#!/bin/sh\n\n");
    for (key, value) in cmd.get_env() {
        script.push_str(&format!("export {}=\"{}\"\n", key, value));
    }
    if !cmd.get_env().is_empty() {
        script.push('\n');
    }
    if let Some(cwd) = cmd.get_cwd() {
        script.push_str(&format!("cd {}\n", shell_quote(&cwd.display().to_string())));
    }
    script.push_str(&format!("{} $@\n", cmd.display_command()));

    write_string(path, &script)?;
    set_executable(path)
}

/// Bourne-shell quoting for a single word.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}
