//! Git operations for chartship.
//!
//! Change detection only needs three things from version control: the list
//! of files touched by a revision range, a best-effort fetch of the base
//! branch, and a probe for whether a ref resolves. [`DiffProvider`] is that
//! seam; [`SystemGit`] implements it by shelling out to `git`.
//!
//! # Example
//!
//! ```no_run
//! use chartship_git::{DiffProvider, SystemGit};
//! use std::path::Path;
//!
//! let git = SystemGit::new(Path::new("."));
//! let files = git.changed_files("HEAD~1..HEAD").unwrap_or_default();
//! for file in files {
//!     println!("{file}");
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chartship_process::{CommandResult, run_command_in_dir};
use serde::{Deserialize, Serialize};

/// Revision control operations used by change detection.
pub trait DiffProvider {
    /// Paths changed in `range`, relative to the repository root.
    ///
    /// Errors when git cannot be run or exits non-zero.
    fn changed_files(&self, range: &str) -> Result<Vec<String>>;

    /// Fetch `refname` from `remote`, shallow to `depth` commits.
    fn fetch(&self, remote: &str, refname: &str, depth: u32) -> Result<()>;

    /// Whether `rev` resolves to an object.
    fn rev_exists(&self, rev: &str) -> bool;
}

/// Git context information for diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitContext {
    /// Current commit hash
    pub commit: Option<String>,
    /// Current branch name
    pub branch: Option<String>,
}

impl GitContext {
    /// Get a short commit hash (first 7 characters)
    pub fn short_commit(&self) -> Option<&str> {
        self.commit
            .as_deref()
            .map(|c| if c.len() > 7 { &c[..7] } else { c })
    }
}

/// [`DiffProvider`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: String,
    repo_root: PathBuf,
}

impl SystemGit {
    pub fn new(repo_root: &Path) -> Self {
        Self::with_program("git", repo_root)
    }

    /// Use a specific git binary (tests point this at a fake script).
    pub fn with_program(program: impl Into<String>, repo_root: &Path) -> Self {
        Self {
            program: program.into(),
            repo_root: repo_root.to_path_buf(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn git(&self, args: &[&str]) -> Result<CommandResult> {
        run_command_in_dir(&self.program, args, &self.repo_root)
    }

    /// Check if we're inside a git repository
    pub fn is_git_repo(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"])
            .map(|r| r.success)
            .unwrap_or(false)
    }

    /// Get the current git commit hash
    pub fn head_commit(&self) -> Option<String> {
        let out = self.git(&["rev-parse", "HEAD"]).ok()?;
        if !out.success {
            return None;
        }
        Some(out.stdout.trim().to_string())
    }

    /// Get the current branch name; `None` on a detached HEAD.
    pub fn current_branch(&self) -> Option<String> {
        let out = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).ok()?;
        if !out.success {
            return None;
        }
        let branch = out.stdout.trim().to_string();
        if branch == "HEAD" { None } else { Some(branch) }
    }

    pub fn context(&self) -> GitContext {
        GitContext {
            commit: self.head_commit(),
            branch: self.current_branch(),
        }
    }
}

impl DiffProvider for SystemGit {
    fn changed_files(&self, range: &str) -> Result<Vec<String>> {
        let out = self.git(&["diff", "--name-only", range])?;
        if !out.success {
            bail!("git diff {range} failed: {}", out.stderr.trim());
        }
        Ok(out.stdout_lines().map(str::to_string).collect())
    }

    fn fetch(&self, remote: &str, refname: &str, depth: u32) -> Result<()> {
        let depth = format!("--depth={depth}");
        let out = self.git(&["fetch", remote, refname, &depth])?;
        if !out.success {
            bail!("git fetch {remote} {refname} failed: {}", out.stderr.trim());
        }
        Ok(())
    }

    fn rev_exists(&self, rev: &str) -> bool {
        self.git(&["rev-parse", "--verify", "--quiet", rev])
            .map(|r| r.success)
            .unwrap_or(false)
    }
}
