//! # Chartship
//!
//! Change detection and idempotent publishing for a directory of Helm charts.
//!
//! A CI pipeline that owns a `charts/` tree should only rebuild the charts a
//! commit touched, and it must never overwrite a version that is already in
//! the registry. Chartship provides each step as a library stage; the
//! command-line front end lives in `chartship-cli`.
//!
//! ## Pipeline
//!
//! The core flow is **resolve → detect → validate → package → publish**:
//!
//! 1. [`resolver::RevisionResolver`] turns CI signals into a revision range,
//!    or decides every chart is in scope.
//! 2. [`detect::ChangeDetector`] diffs that range and maps changed paths to
//!    chart directories accepted by [`scanner::ChartScanner`].
//! 3. [`validate::ChartValidator`] lints and renders each chart.
//! 4. [`package::ChartPackager`] builds `<name>-<version>.tgz` archives.
//! 5. [`publish::ChartPublisher`] checks the registry and pushes only
//!    versions that are absent.
//!
//! [`batch`] drives stages 3-5 over a list of names, one chart at a time.
//!
//! ## Example
//!
//! ```ignore
//! use chartship::detect::ChangeDetector;
//! use chartship::resolver::RevisionResolver;
//! use chartship::scanner::ChartScanner;
//!
//! let scanner = ChartScanner::new("charts");
//! let resolver = RevisionResolver::new(&signals, &git);
//! let detector = ChangeDetector::new(&scanner, &git);
//! let changed = detector.detect(&resolver, &mut reporter);
//! ```

/// Batch execution over a list of chart names.
pub mod batch;

/// Injectable read-through caches.
pub mod cache;

/// Change set extraction from revision diffs.
pub mod detect;

/// Chart packaging (`helm package`).
pub mod package;

/// Idempotent publishing to an OCI registry.
pub mod publish;

/// Progress and diagnostic reporting.
pub mod reporter;

/// Revision range resolution from CI signals.
pub mod resolver;

/// Chart directory discovery and manifest reading.
pub mod scanner;

/// Seam over the `helm` commands used by validate and package.
pub mod tooling;

/// Chart validation (`helm lint`, `helm template`).
pub mod validate;

pub use chartship_types as types;
pub use reporter::Reporter;
