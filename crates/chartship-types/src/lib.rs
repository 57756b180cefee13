//! Core domain types for chartship.
//!
//! This crate provides the fundamental types shared across the chartship
//! workspace: chart manifests, revision ranges, change sets, publish
//! decisions, the error taxonomy, and process exit codes.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

/// Manifest file every chart directory must contain.
pub const MANIFEST_FILE: &str = "Chart.yaml";

/// Default `apiVersion` for manifests that omit it.
pub const DEFAULT_API_VERSION: &str = "v2";

/// Standard exit codes for chartship commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    #[default]
    Success,
    Failure,
    ValidationError,
    NotFound,
}

impl ExitCode {
    /// Numeric process exit status.
    pub fn code(self) -> u8 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
            ExitCode::ValidationError => 2,
            ExitCode::NotFound => 3,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::Failure => write!(f, "failure"),
            ExitCode::ValidationError => write!(f, "validation error"),
            ExitCode::NotFound => write!(f, "not found"),
        }
    }
}

/// Errors raised while discovering, validating, packaging or publishing a chart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    /// Chart directory or manifest is missing.
    #[error("{0}")]
    NotFound(String),
    /// Manifest is malformed or violates a chart rule.
    #[error("{0}")]
    Validation(String),
    /// An external tool returned a non-zero exit status.
    #[error("{tool} failed: {message}")]
    ToolFailure { tool: String, message: String },
    /// A required artifact from an earlier stage is absent.
    #[error("{0}")]
    Precondition(String),
}

impl ChartError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ChartError::ToolFailure {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Exit code a command should use when this is the only kind of failure.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ChartError::NotFound(_) => ExitCode::NotFound,
            ChartError::Validation(_) => ExitCode::ValidationError,
            ChartError::ToolFailure { .. } | ChartError::Precondition(_) => ExitCode::Failure,
        }
    }

    /// Short, stable class label used in reports.
    pub fn class(&self) -> &'static str {
        match self {
            ChartError::NotFound(_) => "not_found",
            ChartError::Validation(_) => "validation",
            ChartError::ToolFailure { .. } => "tool_failure",
            ChartError::Precondition(_) => "precondition",
        }
    }
}

/// One entry of a chart's `dependencies` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartDependency {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ChartDependency {
    fn from_yaml(value: &Value) -> Result<Self, ChartError> {
        if !value.is_mapping() {
            return Err(ChartError::Validation(
                "dependency entries must be mappings".to_string(),
            ));
        }

        Ok(Self {
            name: scalar(value.get("name")).unwrap_or_default(),
            version: non_empty(scalar(value.get("version"))),
            repository: non_empty(scalar(value.get("repository"))),
            condition: non_empty(scalar(value.get("condition"))),
            alias: non_empty(scalar(value.get("alias"))),
        })
    }
}

/// Parsed `Chart.yaml` metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    pub app_version: String,
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

impl ChartMetadata {
    /// Parse manifest text. The document must be a YAML mapping.
    ///
    /// Scalar fields written as numbers or booleans are read as strings, so
    /// `version: 1.0` yields `"1.0"`.
    pub fn from_yaml_str(content: &str) -> Result<Self, ChartError> {
        let doc: Value = serde_yaml::from_str(content)
            .map_err(|e| ChartError::Validation(format!("failed to parse {MANIFEST_FILE}: {e}")))?;

        if !doc.is_mapping() {
            return Err(ChartError::Validation(format!(
                "invalid {MANIFEST_FILE} format: expected a mapping"
            )));
        }

        let dependencies = match doc.get("dependencies") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(ChartDependency::from_yaml)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ChartError::Validation(
                    "dependencies must be a list".to_string(),
                ));
            }
        };

        Ok(Self {
            name: scalar(doc.get("name")).unwrap_or_default(),
            version: scalar(doc.get("version")).unwrap_or_default(),
            app_version: scalar(doc.get("appVersion")).unwrap_or_default(),
            api_version: non_empty(scalar(doc.get("apiVersion")))
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            kube_version: non_empty(scalar(doc.get("kubeVersion"))),
            description: non_empty(scalar(doc.get("description"))),
            dependencies,
        })
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// File name `helm package` produces for this chart.
    pub fn package_file_name(&self, chart_name: &str) -> String {
        format!("{}-{}.tgz", chart_name, self.version)
    }
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// How the two endpoints of a revision range are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    /// `A..B`: commits reachable from B but not from A.
    Direct,
    /// `A...B`: changes on B since the merge base with A.
    MergeBase,
}

impl RangeKind {
    fn separator(self) -> &'static str {
        match self {
            RangeKind::Direct => "..",
            RangeKind::MergeBase => "...",
        }
    }
}

/// What to diff to find changed charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevisionRange {
    /// No diff; every valid chart is considered changed.
    All,
    Range {
        from: String,
        to: String,
        kind: RangeKind,
    },
}

impl RevisionRange {
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        RevisionRange::Range {
            from: from.into(),
            to: to.into(),
            kind: RangeKind::Direct,
        }
    }

    pub fn merge_base(from: impl Into<String>, to: impl Into<String>) -> Self {
        RevisionRange::Range {
            from: from.into(),
            to: to.into(),
            kind: RangeKind::MergeBase,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, RevisionRange::All)
    }
}

impl fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionRange::All => write!(f, "all"),
            RevisionRange::Range { from, to, kind } => {
                write!(f, "{}{}{}", from, kind.separator(), to)
            }
        }
    }
}

/// Error returned when a string is not a `A..B` / `A...B` range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid revision range `{0}`: expected A..B or A...B")]
pub struct RangeParseError(pub String);

impl FromStr for RevisionRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (from, to, kind) = if let Some((from, to)) = s.split_once("...") {
            (from, to, RangeKind::MergeBase)
        } else if let Some((from, to)) = s.split_once("..") {
            (from, to, RangeKind::Direct)
        } else {
            return Err(RangeParseError(s.to_string()));
        };

        if from.is_empty() || to.is_empty() || to.starts_with('.') {
            return Err(RangeParseError(s.to_string()));
        }

        Ok(RevisionRange::Range {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        })
    }
}

/// Set of changed chart names. Iteration and serialization are always sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    charts: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the name was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.charts.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.charts.contains(name)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.charts.iter().map(String::as_str)
    }

    pub fn into_sorted_vec(self) -> Vec<String> {
        self.charts.into_iter().collect()
    }
}

impl FromIterator<String> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            charts: iter.into_iter().collect(),
        }
    }
}

/// Outcome class of a single publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishDecision {
    /// Version was absent and has been pushed.
    Push,
    /// Version already exists in the registry; nothing was pushed.
    SkipExisting,
    Fail,
}

impl PublishDecision {
    /// `SkipExisting` counts as success.
    pub fn is_success(self) -> bool {
        !matches!(self, PublishDecision::Fail)
    }
}

impl fmt::Display for PublishDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishDecision::Push => write!(f, "published"),
            PublishDecision::SkipExisting => write!(f, "skipped (already exists)"),
            PublishDecision::Fail => write!(f, "failed"),
        }
    }
}
