use std::path::{Path, PathBuf};

use chartship_registry::{RegistryClient, RegistryPath};
use chartship_types::{ChartError, PublishDecision};

use crate::reporter::Reporter;
use crate::scanner::ChartScanner;

/// What publishing one chart would do, decided before anything is pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    pub name: String,
    pub version: String,
    pub package: PathBuf,
    /// `<registry>/<name>:<version>`
    pub reference: String,
    /// `Push` or `SkipExisting`.
    pub decision: PublishDecision,
}

/// Result of a single publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub name: String,
    pub version: Option<String>,
    pub reference: Option<String>,
    pub decision: PublishDecision,
    pub error: Option<ChartError>,
}

impl PublishOutcome {
    /// A skipped existing version counts as success.
    pub fn is_success(&self) -> bool {
        self.decision.is_success()
    }

    fn failed(
        name: &str,
        version: Option<String>,
        reference: Option<String>,
        error: ChartError,
    ) -> Self {
        Self {
            name: name.to_string(),
            version,
            reference,
            decision: PublishDecision::Fail,
            error: Some(error),
        }
    }
}

/// Publishes packaged charts without ever overwriting an existing version.
pub struct ChartPublisher<'a> {
    scanner: &'a ChartScanner,
    registry: &'a dyn RegistryClient,
    packages_dir: PathBuf,
    registry_path: RegistryPath,
}

impl<'a> ChartPublisher<'a> {
    pub fn new(
        scanner: &'a ChartScanner,
        registry: &'a dyn RegistryClient,
        packages_dir: impl Into<PathBuf>,
        registry_path: RegistryPath,
    ) -> Self {
        Self {
            scanner,
            registry,
            packages_dir: packages_dir.into(),
            registry_path,
        }
    }

    pub fn registry_path(&self) -> &RegistryPath {
        &self.registry_path
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Read metadata, require the package file, then ask the registry.
    ///
    /// The registry is only queried once the package is known to exist.
    pub fn decide(
        &self,
        name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<PublishPlan, ChartError> {
        let metadata = self.scanner.read_metadata(name)?;
        reporter.info(&format!("chart version: {}", metadata.version));

        let package = self.packages_dir.join(metadata.package_file_name(name));
        if !package.is_file() {
            return Err(ChartError::Precondition(format!(
                "package file not found: {} (run `chartship package {name}` first)",
                package.display()
            )));
        }

        let reference = format!("{}/{}:{}", self.registry_path, name, metadata.version);
        reporter.info(&format!("target registry: {}", self.registry_path.oci_url()));
        reporter.info(&format!(
            "checking if {name}:{} exists in registry",
            metadata.version
        ));

        let decision = if self
            .registry
            .exists(&self.registry_path, name, &metadata.version)
        {
            PublishDecision::SkipExisting
        } else {
            PublishDecision::Push
        };

        Ok(PublishPlan {
            name: name.to_string(),
            version: metadata.version,
            package,
            reference,
            decision,
        })
    }

    /// Publish one chart. Never retries a failed push.
    pub fn publish(&self, name: &str, reporter: &mut dyn Reporter) -> PublishOutcome {
        reporter.info(&format!("publishing chart: {name}"));

        let plan = match self.decide(name, reporter) {
            Ok(plan) => plan,
            Err(e) => {
                reporter.error(&e.to_string());
                return PublishOutcome::failed(name, None, None, e);
            }
        };

        if plan.decision == PublishDecision::SkipExisting {
            self.report_existing(&plan, reporter);
            return PublishOutcome {
                name: plan.name,
                version: Some(plan.version),
                reference: Some(plan.reference),
                decision: PublishDecision::SkipExisting,
                error: None,
            };
        }

        reporter.info("version does not exist; pushing chart to registry");
        match self.registry.push(&plan.package, &self.registry_path) {
            Ok(()) => {
                self.report_pushed(&plan, reporter);
                PublishOutcome {
                    name: plan.name,
                    version: Some(plan.version),
                    reference: Some(plan.reference),
                    decision: PublishDecision::Push,
                    error: None,
                }
            }
            Err(e) => {
                self.report_push_failure(&plan, &e, reporter);
                PublishOutcome::failed(name, Some(plan.version), Some(plan.reference), e)
            }
        }
    }

    fn report_existing(&self, plan: &PublishPlan, reporter: &mut dyn Reporter) {
        reporter.warn(&format!(
            "{}:{}: already exists in registry (skipping push)",
            plan.name, plan.version
        ));
        reporter.warn("to publish a new version:");
        reporter.warn(&format!(
            "  1. bump version in {}",
            self.scanner.root().join(&plan.name).join("Chart.yaml").display()
        ));
        reporter.warn("  2. re-run the package and publish steps");
    }

    fn report_pushed(&self, plan: &PublishPlan, reporter: &mut dyn Reporter) {
        let chart_ref = self.registry_path.chart_ref(&plan.name);
        reporter.info(&format!("published {}:{}", plan.name, plan.version));
        reporter.info(&format!(
            "pull with: helm pull {chart_ref} --version {}",
            plan.version
        ));
        reporter.info(&format!(
            "install with: helm install my-release {chart_ref} --version {}",
            plan.version
        ));
    }

    fn report_push_failure(
        &self,
        plan: &PublishPlan,
        err: &ChartError,
        reporter: &mut dyn Reporter,
    ) {
        let path = &self.registry_path;
        reporter.error(&format!("failed to push {}:{}", plan.name, plan.version));
        reporter.error("common causes:");
        reporter.error("  1. not logged in to registry");
        reporter.error(&format!(
            "     run: echo $PASSWORD | helm registry login {} -u $USER --password-stdin",
            path.host()
        ));
        reporter.error("  2. insufficient permissions");
        reporter.error("     verify your registry access rights");
        reporter.error("  3. registry path does not exist");
        reporter.error(&format!("     verify: {}", path.oci_url()));
        reporter.error("  4. network connectivity issues");
        reporter.error(&format!("     test: curl https://{}/v2/", path.host()));
        reporter.error(&format!("error details: {err}"));
    }
}
