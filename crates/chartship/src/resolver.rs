use chartship_config::PipelineSignals;
use chartship_git::DiffProvider;
use chartship_types::RevisionRange;

use crate::reporter::Reporter;

const HEAD: &str = "HEAD";
const PREVIOUS_COMMIT: &str = "HEAD~1";

/// Decides which revision range a pipeline run should diff.
pub struct RevisionResolver<'a> {
    signals: &'a PipelineSignals,
    git: &'a dyn DiffProvider,
}

impl<'a> RevisionResolver<'a> {
    pub fn new(signals: &'a PipelineSignals, git: &'a dyn DiffProvider) -> Self {
        Self { signals, git }
    }

    /// First match wins: tag, release-all, trunk branch, then base branch.
    ///
    /// Never fails; when the base branch cannot be found the previous commit
    /// is used instead.
    pub fn resolve(&self, reporter: &mut dyn Reporter) -> RevisionRange {
        if let Some(tag) = &self.signals.tag {
            reporter.info(&format!("tag detected: {tag}; processing all charts"));
            return RevisionRange::All;
        }

        if self.signals.release_all {
            reporter.info("RELEASE_ALL is set; processing all charts");
            return RevisionRange::All;
        }

        if self.signals.is_trunk() {
            return match self.signals.usable_before_sha() {
                Some(before) => {
                    reporter.info(&format!("trunk branch: comparing {before}..{HEAD}"));
                    RevisionRange::direct(before, HEAD)
                }
                None => {
                    reporter.info("trunk branch (single commit): comparing HEAD~1..HEAD");
                    RevisionRange::direct(PREVIOUS_COMMIT, HEAD)
                }
            };
        }

        self.fetch_base(reporter);

        let base_ref = format!("{}/{}", self.signals.remote, self.signals.base_branch);
        if self.git.rev_exists(&base_ref) {
            reporter.info(&format!("comparing against base ref: {base_ref}"));
            RevisionRange::merge_base(base_ref, HEAD)
        } else {
            reporter.warn(&format!(
                "could not find {base_ref}; comparing with HEAD~1"
            ));
            RevisionRange::direct(PREVIOUS_COMMIT, HEAD)
        }
    }

    fn fetch_base(&self, reporter: &mut dyn Reporter) {
        if !self.signals.in_ci {
            reporter.debug("not running in CI; skipping fetch of base branch");
            return;
        }

        let base = &self.signals.base_branch;
        reporter.info(&format!("fetching base ref: {base}"));
        if let Err(e) = self
            .git
            .fetch(&self.signals.remote, base, self.signals.fetch_depth)
        {
            reporter.warn(&format!("failed to fetch {base}: {e:#}"));
        }
    }
}
