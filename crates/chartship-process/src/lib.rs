//! Process execution for chartship.
//!
//! Every external tool (`git`, `helm`) is driven through this crate so the
//! callers see one uniform [`CommandResult`] regardless of how the process
//! exited.
//!
//! # Example
//!
//! ```ignore
//! use chartship_process::run_command;
//!
//! let result = run_command("helm", &["version", "--short"]).expect("run");
//! assert!(result.success);
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// Exit code (if available)
    pub exit_code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Duration of execution
    pub duration_ms: u64,
}

impl CommandResult {
    /// Create a result from a process output
    pub fn from_output(output: &Output, duration: Duration) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Non-empty lines of stdout, trimmed.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Human-readable elapsed time, e.g. `1s 250ms`.
    pub fn elapsed(&self) -> String {
        humantime::format_duration(Duration::from_millis(self.duration_ms)).to_string()
    }
}

/// Render a command line for logging.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command and capture its output
pub fn run_command(program: &str, args: &[&str]) -> Result<CommandResult> {
    let start = Instant::now();

    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to run command: {}", command_line(program, args)))?;

    Ok(CommandResult::from_output(&output, start.elapsed()))
}

/// Run a command in a specific directory
pub fn run_command_in_dir(program: &str, args: &[&str], dir: &Path) -> Result<CommandResult> {
    let start = Instant::now();

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| {
            format!(
                "failed to run command: {} in {}",
                command_line(program, args),
                dir.display()
            )
        })?;

    Ok(CommandResult::from_output(&output, start.elapsed()))
}

/// Get the full path to a command
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// First line of `<program> <version_arg>` output, if the tool runs.
pub fn tool_version(program: &str, version_arg: &str) -> Option<String> {
    let result = run_command(program, &[version_arg]).ok()?;
    if !result.success {
        return None;
    }
    result.stdout_lines().next().map(str::to_string)
}
