use chartship_types::ChartError;

use crate::reporter::Reporter;
use crate::scanner::ChartScanner;
use crate::tooling::{ChartTooling, TEST_RELEASE, check_step};

/// Lints and renders charts before they are packaged.
pub struct ChartValidator<'a> {
    scanner: &'a ChartScanner,
    tooling: &'a dyn ChartTooling,
}

impl<'a> ChartValidator<'a> {
    pub fn new(scanner: &'a ChartScanner, tooling: &'a dyn ChartTooling) -> Self {
        Self { scanner, tooling }
    }

    /// Stops at the first failing step.
    pub fn validate(&self, name: &str, reporter: &mut dyn Reporter) -> Result<(), ChartError> {
        reporter.info(&format!("validating chart: {name}"));

        let path = self.scanner.chart_path(name)?;
        let metadata = self.scanner.read_metadata(name)?;
        reporter.info(&format!("chart name: {}", metadata.name));
        reporter.info(&format!("chart version: {}", metadata.version));
        reporter.info(&format!("app version: {}", metadata.app_version));

        if metadata.name != name {
            reporter.warn(&format!(
                "chart directory name ({name}) doesn't match Chart.yaml name ({})",
                metadata.name
            ));
        }

        if check_version(&metadata.version)?.is_none() {
            reporter.warn(&format!(
                "chart version `{}` is not strict SemVer; leaving it to helm lint",
                metadata.version
            ));
        }

        reporter.info("step 1/3: running helm lint");
        check_step("helm lint", self.tooling.lint(&path), reporter)?;

        if metadata.has_dependencies() {
            reporter.info("step 2/3: updating dependencies");
            check_step(
                "helm dependency update",
                self.tooling.dependency_update(&path),
                reporter,
            )?;
        } else {
            reporter.info("step 2/3: no dependencies found; skipping dependency update");
        }

        reporter.info("step 3/3: testing template rendering");
        if let Err(e) = check_step(
            "helm template",
            self.tooling.template(TEST_RELEASE, &path),
            reporter,
        ) {
            reporter.error(&format!(
                "run 'helm template {TEST_RELEASE} {}' to see details",
                path.display()
            ));
            return Err(e);
        }

        reporter.info(&format!("chart validation passed: {name}"));
        Ok(())
    }
}

/// A chart must declare a version. Helm also accepts loose forms such as
/// `1.0` or `v1.2.3`, so those are returned as `None` instead of failing.
pub fn check_version(version: &str) -> Result<Option<semver::Version>, ChartError> {
    if version.trim().is_empty() {
        return Err(ChartError::Validation(
            "chart version is missing".to_string(),
        ));
    }
    Ok(semver::Version::parse(version).ok())
}
