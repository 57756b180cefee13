//! Configuration handling for chartship.
//!
//! Settings are layered: built-in defaults, then `.chartship.toml`, then
//! environment variables, then command-line flags. The CI signals that drive
//! revision-range resolution are captured once into [`PipelineSignals`] so the
//! resolver never reads process state itself.
//!
//! # Example
//!
//! ```
//! use chartship_config::{CliOverrides, EnvOverrides, Settings, load_config};
//! use std::path::Path;
//!
//! let config = load_config(Path::new(".")).expect("load config");
//! let settings = Settings::resolve(&config, &EnvOverrides::from_env(), &CliOverrides::default());
//! println!("charts dir: {}", settings.charts_dir.display());
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chartship_registry::{
    DEFAULT_HOST, DEFAULT_OWNER, DEFAULT_PROJECT, RegistryPath, RegistrySource,
};
use serde::{Deserialize, Serialize};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".chartship.toml";

pub const DEFAULT_CHARTS_DIR: &str = "charts";
pub const DEFAULT_PACKAGES_DIR: &str = ".packages";
pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_TRUNK_BRANCHES: &[&str] = &["main", "master"];
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_FETCH_DEPTH: u32 = 50;

/// Get the config file path for a directory
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Contents of `.chartship.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub charts: ChartsConfig,
    #[serde(default)]
    pub detect: DetectConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Chart and package locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChartsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages_dir: Option<PathBuf>,
}

/// Change detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectConfig {
    /// Branch feature branches are compared against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    /// Branch names treated as mainline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trunk_branches: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_depth: Option<u32>,
}

/// OCI registry location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Full registry image path; wins over host/owner/project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// External tool binaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm: Option<String>,
}

/// Load configuration from a directory; a missing file yields defaults.
pub fn load_config(dir: &Path) -> Result<Config> {
    let path = config_path(dir);
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config_from_file(&path)
}

/// Load configuration from an explicit path, which must exist.
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        bail!("config file not found: {}", path.display());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Find configuration file by walking up the directory tree
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        let config_file = current.join(CONFIG_FILE);
        if config_file.exists() {
            return Some(config_file);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// Load the file found by [`find_config`] from `start_dir`, or defaults.
pub fn discover_config(start_dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    match find_config(start_dir) {
        Some(path) => Ok((load_config_from_file(&path)?, Some(path))),
        None => Ok((Config::default(), None)),
    }
}

/// Non-empty value of an environment-like lookup.
fn lookup_non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Settings read from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub charts_dir: Option<PathBuf>,
    pub packages_dir: Option<PathBuf>,
    pub base_branch: Option<String>,
    pub registry_image: Option<String>,
    pub registry_host: Option<String>,
    pub registry_owner: Option<String>,
    pub registry_project: Option<String>,
    pub git_program: Option<String>,
    pub helm_program: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            charts_dir: lookup_non_empty(&lookup, "CHARTS_DIR").map(PathBuf::from),
            packages_dir: lookup_non_empty(&lookup, "PACKAGES_DIR").map(PathBuf::from),
            base_branch: lookup_non_empty(&lookup, "CI_MERGE_REQUEST_TARGET_BRANCH_NAME"),
            registry_image: lookup_non_empty(&lookup, "CI_REGISTRY_IMAGE"),
            registry_host: lookup_non_empty(&lookup, "REGISTRY_HOST"),
            registry_owner: lookup_non_empty(&lookup, "REGISTRY_OWNER"),
            registry_project: lookup_non_empty(&lookup, "REGISTRY_PROJECT"),
            git_program: lookup_non_empty(&lookup, "CHARTSHIP_GIT_BIN"),
            helm_program: lookup_non_empty(&lookup, "CHARTSHIP_HELM_BIN"),
        }
    }
}

/// Settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub charts_dir: Option<PathBuf>,
    pub packages_dir: Option<PathBuf>,
    pub base_branch: Option<String>,
    pub registry_image: Option<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub charts_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub base_branch: String,
    pub trunk_branches: Vec<String>,
    pub remote: String,
    pub fetch_depth: u32,
    pub registry_image: Option<String>,
    pub registry_host: String,
    pub registry_owner: String,
    pub registry_project: String,
    pub git_program: String,
    pub helm_program: String,
}

impl Settings {
    /// Merge layers: CLI > environment > file > defaults.
    pub fn resolve(config: &Config, env: &EnvOverrides, cli: &CliOverrides) -> Self {
        Self {
            charts_dir: cli
                .charts_dir
                .clone()
                .or_else(|| env.charts_dir.clone())
                .or_else(|| config.charts.dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHARTS_DIR)),
            packages_dir: cli
                .packages_dir
                .clone()
                .or_else(|| env.packages_dir.clone())
                .or_else(|| config.charts.packages_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PACKAGES_DIR)),
            base_branch: cli
                .base_branch
                .clone()
                .or_else(|| env.base_branch.clone())
                .or_else(|| config.detect.base_branch.clone())
                .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string()),
            trunk_branches: config
                .detect
                .trunk_branches
                .clone()
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| {
                    DEFAULT_TRUNK_BRANCHES
                        .iter()
                        .map(|b| b.to_string())
                        .collect()
                }),
            remote: config
                .detect
                .remote
                .clone()
                .unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            fetch_depth: config.detect.fetch_depth.unwrap_or(DEFAULT_FETCH_DEPTH),
            registry_image: cli
                .registry_image
                .clone()
                .or_else(|| env.registry_image.clone())
                .or_else(|| config.registry.image.clone()),
            registry_host: env
                .registry_host
                .clone()
                .or_else(|| config.registry.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            registry_owner: env
                .registry_owner
                .clone()
                .or_else(|| config.registry.owner.clone())
                .unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            registry_project: env
                .registry_project
                .clone()
                .or_else(|| config.registry.project.clone())
                .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            git_program: env
                .git_program
                .clone()
                .or_else(|| config.tools.git.clone())
                .unwrap_or_else(|| "git".to_string()),
            helm_program: env
                .helm_program
                .clone()
                .or_else(|| config.tools.helm.clone())
                .unwrap_or_else(|| "helm".to_string()),
        }
    }

    /// Registry target: explicit image first, composed path otherwise.
    pub fn registry_path(&self) -> (RegistryPath, RegistrySource) {
        RegistryPath::resolve(
            self.registry_image.as_deref(),
            &self.registry_host,
            &self.registry_owner,
            &self.registry_project,
        )
    }
}

/// All-zero SHA CI systems report when there is no previous commit.
pub const NULL_REVISION: &str = "0000000000000000000000000000000000000000";

/// CI signals that decide which revision range to diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSignals {
    /// Tag being built (`CI_COMMIT_TAG`); forces every chart.
    pub tag: Option<String>,
    /// Explicit override (`RELEASE_ALL`); forces every chart.
    pub release_all: bool,
    /// Branch being built (`CI_COMMIT_BRANCH`).
    pub branch: Option<String>,
    /// Previous tip of the branch (`CI_COMMIT_BEFORE_SHA`).
    pub before_sha: Option<String>,
    /// Branch feature branches are compared against.
    pub base_branch: String,
    pub trunk_branches: Vec<String>,
    pub remote: String,
    pub fetch_depth: u32,
    /// Running under CI (`CI`); the base branch is only fetched in CI.
    pub in_ci: bool,
}

impl PipelineSignals {
    pub fn from_env(settings: &Settings) -> Self {
        Self::from_lookup(env_lookup, settings)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, settings: &Settings) -> Self {
        Self {
            tag: lookup_non_empty(&lookup, "CI_COMMIT_TAG"),
            release_all: lookup_non_empty(&lookup, "RELEASE_ALL").is_some(),
            branch: lookup_non_empty(&lookup, "CI_COMMIT_BRANCH"),
            before_sha: lookup_non_empty(&lookup, "CI_COMMIT_BEFORE_SHA"),
            base_branch: settings.base_branch.clone(),
            trunk_branches: settings.trunk_branches.clone(),
            remote: settings.remote.clone(),
            fetch_depth: settings.fetch_depth,
            in_ci: lookup_non_empty(&lookup, "CI").is_some(),
        }
    }

    /// Signals for a local run with no CI context.
    pub fn local(settings: &Settings) -> Self {
        Self::from_lookup(|_| None, settings)
    }

    pub fn is_trunk(&self) -> bool {
        self.branch
            .as_deref()
            .is_some_and(|b| self.trunk_branches.iter().any(|t| t == b))
    }

    /// Before revision, unless absent or the null SHA.
    pub fn usable_before_sha(&self) -> Option<&str> {
        self.before_sha
            .as_deref()
            .filter(|sha| *sha != NULL_REVISION)
    }
}
