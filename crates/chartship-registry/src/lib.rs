//! OCI registry client for chartship.
//!
//! This crate resolves where charts are published and talks to the registry
//! through `helm`: `helm show chart` answers "does this version exist" and
//! `helm push` uploads a packaged chart.
//!
//! # Example
//!
//! ```no_run
//! use chartship_registry::{HelmRegistry, RegistryClient, RegistryPath};
//!
//! let path = RegistryPath::resolve(None, "registry.example.com", "homelab", "helm-charts").0;
//! let helm = HelmRegistry::new();
//! if helm.exists(&path, "web", "1.2.0") {
//!     println!("web:1.2.0 is already published");
//! }
//! ```

use std::fmt;
use std::path::Path;

use chartship_process::run_command;
use chartship_types::ChartError;
use serde::{Deserialize, Serialize};

/// URL scheme helm expects for OCI registries.
pub const OCI_SCHEME: &str = "oci://";

/// Fallback registry host when nothing is configured.
pub const DEFAULT_HOST: &str = "registry.example.com";

/// Fallback registry owner when nothing is configured.
pub const DEFAULT_OWNER: &str = "homelab";

/// Fallback registry project when nothing is configured.
pub const DEFAULT_PROJECT: &str = "helm-charts";

/// Registry location without the `oci://` scheme, e.g. `ghcr.io/acme/charts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPath(String);

/// Where a resolved [`RegistryPath`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrySource {
    /// Explicit registry image provided by CI or the command line.
    Image,
    /// Composed from host, owner and project.
    Composed,
}

impl RegistryPath {
    pub fn new(path: &str) -> Self {
        let path = path.trim();
        let path = path.strip_prefix(OCI_SCHEME).unwrap_or(path);
        Self(path.trim_end_matches('/').to_string())
    }

    pub fn compose(host: &str, owner: &str, project: &str) -> Self {
        Self::new(&format!(
            "{}/{}/{}",
            host.trim_end_matches('/'),
            owner.trim_matches('/'),
            project.trim_matches('/')
        ))
    }

    /// An explicit registry image wins over the composed fallback.
    pub fn resolve(
        image: Option<&str>,
        host: &str,
        owner: &str,
        project: &str,
    ) -> (Self, RegistrySource) {
        match image.map(str::trim).filter(|s| !s.is_empty()) {
            Some(image) => (Self::new(image), RegistrySource::Image),
            None => (Self::compose(host, owner, project), RegistrySource::Composed),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part, used in login and connectivity hints.
    pub fn host(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// `oci://<path>`, the push target.
    pub fn oci_url(&self) -> String {
        format!("{OCI_SCHEME}{}", self.0)
    }

    /// `oci://<path>/<chart>`, the reference for show/pull/install.
    pub fn chart_ref(&self, chart: &str) -> String {
        format!("{OCI_SCHEME}{}/{}", self.0, chart)
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry operations the publisher depends on.
pub trait RegistryClient {
    /// Whether `name:version` is already present under `path`.
    ///
    /// Any failure to answer counts as "does not exist".
    fn exists(&self, path: &RegistryPath, name: &str, version: &str) -> bool;

    /// Upload a packaged chart to `path`.
    fn push(&self, package: &Path, path: &RegistryPath) -> Result<(), ChartError>;
}

/// [`RegistryClient`] that drives the `helm` executable.
#[derive(Debug, Clone)]
pub struct HelmRegistry {
    program: String,
}

impl HelmRegistry {
    pub fn new() -> Self {
        Self::with_program("helm")
    }

    /// Use a specific helm binary (tests point this at a fake script).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for HelmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient for HelmRegistry {
    fn exists(&self, path: &RegistryPath, name: &str, version: &str) -> bool {
        let reference = path.chart_ref(name);
        run_command(
            &self.program,
            &["show", "chart", &reference, "--version", version],
        )
        .map(|out| out.success)
        .unwrap_or(false)
    }

    fn push(&self, package: &Path, path: &RegistryPath) -> Result<(), ChartError> {
        let package = package.to_string_lossy();
        let target = path.oci_url();
        let out = run_command(&self.program, &["push", &package, &target])
            .map_err(|e| ChartError::tool("helm push", format!("{e:#}")))?;

        if !out.success {
            let detail = out.stderr.trim();
            let detail = if detail.is_empty() {
                format!("exit code {:?}", out.exit_code)
            } else {
                detail.to_string()
            };
            return Err(ChartError::tool("helm push", detail));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_path_strips_scheme_and_trailing_slash() {
        let path = RegistryPath::new("oci://ghcr.io/acme/charts/");
        assert_eq!(path.as_str(), "ghcr.io/acme/charts");
        assert_eq!(path.oci_url(), "oci://ghcr.io/acme/charts");
        assert_eq!(path.chart_ref("web"), "oci://ghcr.io/acme/charts/web");
        assert_eq!(path.host(), "ghcr.io");
    }

    #[test]
    fn image_takes_precedence_over_composed_path() {
        let (path, source) = RegistryPath::resolve(
            Some("gitlab.example.com:5050/group/project"),
            "registry.example.com",
            "homelab",
            "helm-charts",
        );
        assert_eq!(path.as_str(), "gitlab.example.com:5050/group/project");
        assert_eq!(source, RegistrySource::Image);
    }

    #[test]
    fn composed_path_used_without_image() {
        let (path, source) =
            RegistryPath::resolve(None, DEFAULT_HOST, DEFAULT_OWNER, DEFAULT_PROJECT);
        assert_eq!(path.as_str(), "registry.example.com/homelab/helm-charts");
        assert_eq!(source, RegistrySource::Composed);
    }

    #[test]
    fn blank_image_falls_back_to_composed_path() {
        let (path, source) = RegistryPath::resolve(Some("  "), "r.io", "o", "p");
        assert_eq!(path.as_str(), "r.io/o/p");
        assert_eq!(source, RegistrySource::Composed);
    }

    #[test]
    fn missing_helm_means_version_absent() {
        let helm = HelmRegistry::with_program("this-helm-does-not-exist-xyz");
        let path = RegistryPath::new("r.io/o/p");
        assert!(!helm.exists(&path, "web", "1.0.0"));
    }

    #[test]
    fn missing_helm_push_is_tool_failure() {
        let helm = HelmRegistry::with_program("this-helm-does-not-exist-xyz");
        let path = RegistryPath::new("r.io/o/p");
        let err = helm
            .push(Path::new("web-1.0.0.tgz"), &path)
            .expect_err("must fail");
        assert!(matches!(err, ChartError::ToolFailure { .. }));
    }

    #[test]
    fn registry_source_serializes_snake_case() {
        let json = serde_json::to_string(&RegistrySource::Composed).expect("serialize");
        assert_eq!(json, "\"composed\"");
    }

    #[cfg(unix)]
    mod fake_helm {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn write_fake_helm(dir: &Path, exit_code: i32) -> (PathBuf, PathBuf) {
            let log = dir.join("helm-args.log");
            let path = dir.join("helm");
            fs::write(
                &path,
                format!(
                    "#!/usr/bin/env sh\necho \"$*\" >>\"{}\"\necho 'Error: unauthorized' >&2\nexit {}\n",
                    log.display(),
                    exit_code
                ),
            )
            .expect("write fake helm");
            let mut perms = fs::metadata(&path).expect("meta").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).expect("chmod");
            (path, log)
        }

        #[test]
        fn exists_passes_chart_ref_and_version() {
            let td = tempfile::tempdir().expect("tempdir");
            let (bin, log) = write_fake_helm(td.path(), 0);
            let helm = HelmRegistry::with_program(bin.to_string_lossy());

            assert!(helm.exists(&RegistryPath::new("r.io/o/p"), "web", "1.2.3"));
            let args = fs::read_to_string(log).expect("log");
            assert_eq!(args.trim(), "show chart oci://r.io/o/p/web --version 1.2.3");
        }

        #[test]
        fn exists_is_false_on_non_zero_exit() {
            let td = tempfile::tempdir().expect("tempdir");
            let (bin, _log) = write_fake_helm(td.path(), 1);
            let helm = HelmRegistry::with_program(bin.to_string_lossy());
            assert!(!helm.exists(&RegistryPath::new("r.io/o/p"), "web", "1.2.3"));
        }

        #[test]
        fn push_targets_oci_url() {
            let td = tempfile::tempdir().expect("tempdir");
            let (bin, log) = write_fake_helm(td.path(), 0);
            let helm = HelmRegistry::with_program(bin.to_string_lossy());

            helm.push(Path::new("pkgs/web-1.2.3.tgz"), &RegistryPath::new("r.io/o/p"))
                .expect("push");
            let args = fs::read_to_string(log).expect("log");
            assert_eq!(args.trim(), "push pkgs/web-1.2.3.tgz oci://r.io/o/p");
        }

        #[test]
        fn push_failure_carries_stderr() {
            let td = tempfile::tempdir().expect("tempdir");
            let (bin, _log) = write_fake_helm(td.path(), 1);
            let helm = HelmRegistry::with_program(bin.to_string_lossy());

            let err = helm
                .push(Path::new("web-1.2.3.tgz"), &RegistryPath::new("r.io/o/p"))
                .expect_err("must fail");
            assert_eq!(err.to_string(), "helm push failed: Error: unauthorized");
        }
    }
}
