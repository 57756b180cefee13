use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chartship_types::{ChartError, ExitCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::reporter::Reporter;

/// Chart names from a single argument or a newline-delimited file.
///
/// Blank lines are ignored and entries trimmed. A missing input file is an
/// error; an empty one yields no names.
pub fn read_names(name: Option<&str>, input_file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = input_file {
        if !path.exists() {
            bail!("input file not found: {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read input file: {}", path.display()))?;
        return Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect());
    }

    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => Ok(vec![name.to_string()]),
        None => bail!("either a chart name or --input-file must be provided"),
    }
}

/// How a successful chart finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartStatus {
    Done,
    /// Nothing to do, e.g. the version is already published.
    Skipped,
}

/// One failed chart in a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartFailure {
    pub name: String,
    pub class: String,
    pub message: String,
    #[serde(skip)]
    pub exit_code: ExitCode,
}

/// Summary of running one stage over a list of charts.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<ChartFailure>,
}

impl BatchReport {
    fn start(stage: &str) -> Self {
        let now = Utc::now();
        Self {
            stage: stage.to_string(),
            started_at: now,
            finished_at: now,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }

    /// Wall-clock duration of the batch.
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn elapsed_human(&self) -> String {
        // Truncate to milliseconds.
        let ms = self.elapsed().as_millis() as u64;
        humantime::format_duration(Duration::from_millis(ms)).to_string()
    }

    /// `0` when nothing failed. When every failure has the same specific
    /// class its code is used, otherwise the generic failure code.
    pub fn exit_code(&self) -> ExitCode {
        let Some(first) = self.failed.first() else {
            return ExitCode::Success;
        };

        if self.failed.iter().all(|f| f.exit_code == first.exit_code) {
            first.exit_code
        } else {
            ExitCode::Failure
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize batch report")
    }
}

/// Run `step` for every name, in order, never stopping at a failure.
pub fn run_batch<F>(
    stage: &str,
    names: &[String],
    reporter: &mut dyn Reporter,
    mut step: F,
) -> BatchReport
where
    F: FnMut(&str, &mut dyn Reporter) -> Result<ChartStatus, ChartError>,
{
    let mut report = BatchReport::start(stage);

    for name in names {
        match step(name, reporter) {
            Ok(ChartStatus::Done) => report.succeeded.push(name.clone()),
            Ok(ChartStatus::Skipped) => report.skipped.push(name.clone()),
            Err(e) => {
                reporter.error(&format!("{name}: {e}"));
                report.failed.push(ChartFailure {
                    name: name.clone(),
                    class: e.class().to_string(),
                    message: e.to_string(),
                    exit_code: e.exit_code(),
                });
            }
        }
    }

    report.finished_at = Utc::now();
    summarize(&report, reporter);
    report
}

fn summarize(report: &BatchReport, reporter: &mut dyn Reporter) {
    reporter.info(&format!(
        "{}: {} succeeded, {} skipped, {} failed ({})",
        report.stage,
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len(),
        report.elapsed_human()
    ));

    if !report.failed.is_empty() {
        reporter.error(&format!(
            "{} failed for {} chart(s):",
            report.stage,
            report.failed.len()
        ));
        for failure in &report.failed {
            reporter.error(&format!("  - {}", failure.name));
        }
    }
}
