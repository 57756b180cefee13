use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chartship_types::ChartError;

use crate::reporter::Reporter;
use crate::scanner::ChartScanner;
use crate::tooling::{ChartTooling, check_step};

const GITIGNORE: &str = ".gitignore";
const HELMIGNORE: &str = ".helmignore";

/// Builds `<name>-<version>.tgz` archives into the packages directory.
pub struct ChartPackager<'a> {
    scanner: &'a ChartScanner,
    tooling: &'a dyn ChartTooling,
    packages_dir: PathBuf,
}

impl<'a> ChartPackager<'a> {
    pub fn new(
        scanner: &'a ChartScanner,
        tooling: &'a dyn ChartTooling,
        packages_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scanner,
            tooling,
            packages_dir: packages_dir.into(),
        }
    }

    /// Package one chart and return the archive path.
    pub fn package(
        &self,
        name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<PathBuf, ChartError> {
        reporter.info(&format!("packaging chart: {name}"));

        let path = self.scanner.chart_path(name)?;
        let metadata = self.scanner.read_metadata(name)?;
        reporter.info(&format!("chart version: {}", metadata.version));

        self.sync_helmignore(&path, reporter)?;

        fs::create_dir_all(&self.packages_dir).map_err(|e| {
            ChartError::Precondition(format!(
                "failed to create packages directory {}: {e}",
                self.packages_dir.display()
            ))
        })?;
        reporter.info(&format!("packages directory: {}", self.packages_dir.display()));

        if metadata.has_dependencies() {
            reporter.info("building dependencies");
            check_step(
                "helm dependency build",
                self.tooling.dependency_build(&path),
                reporter,
            )?;
        } else {
            reporter.info("no dependencies to build");
        }

        check_step(
            "helm package",
            self.tooling.package(&path, &self.packages_dir),
            reporter,
        )?;

        let archive = self.packages_dir.join(metadata.package_file_name(name));
        let size = fs::metadata(&archive).map(|m| m.len()).map_err(|_| {
            ChartError::Precondition(format!(
                "package file not found: {} (helm package did not create it)",
                archive.display()
            ))
        })?;

        reporter.info(&format!("package created: {}", archive.display()));
        reporter.info(&format!(
            "package size: {:.2} MB",
            size as f64 / (1024.0 * 1024.0)
        ));
        Ok(archive)
    }

    /// Merge `<charts root>/.gitignore` patterns into the chart's `.helmignore`.
    ///
    /// A missing `.gitignore` is a warning, not an error.
    pub fn sync_helmignore(
        &self,
        chart: &Path,
        reporter: &mut dyn Reporter,
    ) -> Result<(), ChartError> {
        let gitignore = self.scanner.root().join(GITIGNORE);
        let helmignore = chart.join(HELMIGNORE);

        if !gitignore.is_file() {
            reporter.warn(&format!(
                "{GITIGNORE} not found at {}; skipping pattern sync",
                gitignore.display()
            ));
            return Ok(());
        }

        reporter.info(&format!("syncing {GITIGNORE} patterns to {HELMIGNORE}"));
        let mut patterns = read_patterns(&helmignore)?;
        patterns.extend(read_patterns(&gitignore)?);

        let mut content = String::new();
        for pattern in &patterns {
            content.push_str(pattern);
            content.push('\n');
        }

        fs::write(&helmignore, content).map_err(|e| {
            ChartError::Precondition(format!("failed to write {}: {e}", helmignore.display()))
        })?;
        reporter.debug(&format!(
            "{} now holds {} pattern(s)",
            helmignore.display(),
            patterns.len()
        ));
        Ok(())
    }
}

/// Non-blank lines of an ignore file, trimmed; a missing file is empty.
///
/// Only a `#` in the first column starts a comment, as in gitignore.
fn read_patterns(path: &Path) -> Result<BTreeSet<String>, ChartError> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        ChartError::Precondition(format!("failed to read {}: {e}", path.display()))
    })?;

    Ok(content
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
