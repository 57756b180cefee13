use std::path::Path;

use anyhow::Result;
use chartship_process::{CommandResult, run_command};
use chartship_types::ChartError;

use crate::reporter::Reporter;

/// Release name used when rendering templates during validation.
pub const TEST_RELEASE: &str = "test-release";

/// The `helm` commands validation and packaging depend on.
///
/// `Err` means the tool could not be started; a non-zero exit is reported
/// through [`CommandResult::success`].
pub trait ChartTooling {
    fn lint(&self, chart: &Path) -> Result<CommandResult>;
    fn dependency_update(&self, chart: &Path) -> Result<CommandResult>;
    fn dependency_build(&self, chart: &Path) -> Result<CommandResult>;
    fn template(&self, release: &str, chart: &Path) -> Result<CommandResult>;
    fn package(&self, chart: &Path, destination: &Path) -> Result<CommandResult>;
}

/// [`ChartTooling`] backed by the `helm` executable.
#[derive(Debug, Clone)]
pub struct HelmCli {
    program: String,
}

impl HelmCli {
    pub fn new() -> Self {
        Self::with_program("helm")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[&str]) -> Result<CommandResult> {
        run_command(&self.program, args)
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartTooling for HelmCli {
    fn lint(&self, chart: &Path) -> Result<CommandResult> {
        self.run(&["lint", &chart.to_string_lossy()])
    }

    fn dependency_update(&self, chart: &Path) -> Result<CommandResult> {
        self.run(&["dependency", "update", &chart.to_string_lossy()])
    }

    fn dependency_build(&self, chart: &Path) -> Result<CommandResult> {
        self.run(&["dependency", "build", &chart.to_string_lossy()])
    }

    fn template(&self, release: &str, chart: &Path) -> Result<CommandResult> {
        self.run(&["template", release, &chart.to_string_lossy(), "--dry-run"])
    }

    fn package(&self, chart: &Path, destination: &Path) -> Result<CommandResult> {
        self.run(&[
            "package",
            &chart.to_string_lossy(),
            "-d",
            &destination.to_string_lossy(),
        ])
    }
}

/// Turn a tool invocation into a pass/fail step, logging its output.
///
/// Output of a passing step goes to debug; a failing step logs both streams
/// as errors and yields [`ChartError::ToolFailure`].
pub(crate) fn check_step(
    tool: &str,
    result: Result<CommandResult>,
    reporter: &mut dyn Reporter,
) -> Result<(), ChartError> {
    let out = match result {
        Ok(out) => out,
        Err(e) => return Err(ChartError::tool(tool, format!("{e:#}"))),
    };

    if out.success {
        let stdout = out.stdout.trim();
        if !stdout.is_empty() {
            reporter.debug(&format!("{tool} output:\n{stdout}"));
        }
        reporter.debug(&format!("{tool} took {}", out.elapsed()));
        return Ok(());
    }

    let stdout = out.stdout.trim();
    let stderr = out.stderr.trim();
    if !stdout.is_empty() {
        reporter.error(&format!("stdout:\n{stdout}"));
    }
    if !stderr.is_empty() {
        reporter.error(&format!("stderr:\n{stderr}"));
    }

    let message = if stderr.is_empty() {
        format!("exit code {:?}", out.exit_code)
    } else {
        stderr.lines().last().unwrap_or(stderr).to_string()
    };
    Err(ChartError::tool(tool, message))
}
