use std::collections::BTreeSet;
use std::path::{Component, Path};

use chartship_git::DiffProvider;
use chartship_types::{ChangeSet, RevisionRange};

use crate::cache::{Cache, MemoryCache};
use crate::reporter::Reporter;
use crate::resolver::RevisionResolver;
use crate::scanner::ChartScanner;

/// Maps a revision diff to the set of charts it touched.
///
/// Diff results are memoised per range and chart validity per name, through
/// the injected caches.
pub struct ChangeDetector<
    'a,
    D = MemoryCache<String, BTreeSet<String>>,
    V = MemoryCache<String, bool>,
> where
    D: Cache<String, BTreeSet<String>>,
    V: Cache<String, bool>,
{
    scanner: &'a ChartScanner,
    git: &'a dyn DiffProvider,
    diff_cache: D,
    validity_cache: V,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(scanner: &'a ChartScanner, git: &'a dyn DiffProvider) -> Self {
        Self::with_caches(scanner, git, MemoryCache::new(), MemoryCache::new())
    }
}

impl<'a, D, V> ChangeDetector<'a, D, V>
where
    D: Cache<String, BTreeSet<String>>,
    V: Cache<String, bool>,
{
    pub fn with_caches(
        scanner: &'a ChartScanner,
        git: &'a dyn DiffProvider,
        diff_cache: D,
        validity_cache: V,
    ) -> Self {
        Self {
            scanner,
            git,
            diff_cache,
            validity_cache,
        }
    }

    pub fn diff_cache(&self) -> &D {
        &self.diff_cache
    }

    pub fn validity_cache(&self) -> &V {
        &self.validity_cache
    }

    /// Files changed in `range`. Failures yield an empty set and a warning;
    /// only successful diffs are cached.
    pub fn changed_files(&self, range: &str, reporter: &mut dyn Reporter) -> BTreeSet<String> {
        let key = range.to_string();
        if let Some(files) = self.diff_cache.get(&key) {
            reporter.debug(&format!("using cached diff for {range}"));
            return files;
        }

        match self.git.changed_files(range) {
            Ok(lines) => {
                let files: BTreeSet<String> = lines
                    .into_iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                self.diff_cache.put(key, files.clone());
                files
            }
            Err(e) => {
                reporter.warn(&format!("failed to get changed files for {range}"));
                reporter.debug(&format!("git error: {e:#}"));
                BTreeSet::new()
            }
        }
    }

    /// Chart names owning any of `files`.
    pub fn extract<'f>(
        &self,
        files: impl IntoIterator<Item = &'f String>,
        reporter: &mut dyn Reporter,
    ) -> ChangeSet {
        let absolute_root = self.scanner.root().is_absolute();
        let root = normalized_components(self.scanner.root());
        let mut charts = ChangeSet::new();
        let mut warned_relative = false;

        for file in files {
            let Some(candidate) = first_segment_under(&root, file) else {
                // git prints repo-relative paths; they never sit under an absolute root.
                if absolute_root && !warned_relative && Path::new(file).is_relative() {
                    reporter.debug(&format!(
                        "charts root {} is absolute but changed path {file} is relative; \
                         no changes can match",
                        self.scanner.root().display()
                    ));
                    warned_relative = true;
                }
                continue;
            };

            if charts.contains(&candidate) {
                continue;
            }

            let valid = self
                .validity_cache
                .get_or_insert_with(candidate.clone(), &mut || {
                    self.scanner.is_valid(&candidate)
                });

            if valid {
                charts.insert(candidate);
            } else {
                reporter.debug(&format!("ignoring non-chart change: {file}"));
            }
        }

        charts
    }

    /// Resolve the range from pipeline signals, then detect.
    pub fn detect(
        &self,
        resolver: &RevisionResolver<'_>,
        reporter: &mut dyn Reporter,
    ) -> Vec<String> {
        let range = resolver.resolve(reporter);
        self.detect_range(&range, reporter)
    }

    /// Sorted names of charts changed in `range`; `All` lists every chart.
    pub fn detect_range(
        &self,
        range: &RevisionRange,
        reporter: &mut dyn Reporter,
    ) -> Vec<String> {
        if range.is_all() {
            if !self.scanner.root_exists() {
                reporter.warn(&format!(
                    "charts directory not found: {}",
                    self.scanner.root().display()
                ));
            }
            return self.scanner.list_valid();
        }

        let files = self.changed_files(&range.to_string(), reporter);
        if files.is_empty() {
            reporter.warn("no files changed in this commit");
            return Vec::new();
        }

        let charts = self.extract(&files, reporter);
        if charts.is_empty() {
            reporter.warn("no charts changed in this commit");
            return Vec::new();
        }

        reporter.info("found changed charts:");
        for chart in charts.iter() {
            reporter.info(&format!("  - {chart}"));
        }

        charts.into_sorted_vec()
    }
}

/// Path components with `.` segments removed, so `./charts` equals `charts`.
fn normalized_components(path: &Path) -> Vec<String> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect()
}

/// First path segment below `root`, if `file` lives under it.
fn first_segment_under(root: &[String], file: &str) -> Option<String> {
    let parts = normalized_components(Path::new(file));
    if parts.len() <= root.len() || parts[..root.len()] != *root {
        return None;
    }
    Some(parts[root.len()].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, NoCache};
    use crate::reporter::CollectingReporter;
    use crate::resolver::test_support::FakeGit;
    use crate::scanner::test_support::write_chart;
    use chartship_config::{CliOverrides, Config, EnvOverrides, PipelineSignals, Settings};
    use std::fs;
    use tempfile::TempDir;

    /// `alpha` and `web` are charts; `beta` has no manifest.
    fn charts_root() -> (TempDir, ChartScanner) {
        let td = tempfile::tempdir().expect("tempdir");
        let root = td.path().join("charts");
        write_chart(&root, "alpha", "1.0.0");
        write_chart(&root, "web", "2.0.0");
        fs::create_dir_all(root.join("beta")).expect("mkdir beta");
        let scanner = ChartScanner::new(&root);
        (td, scanner)
    }

    /// Path of `rel` below the scanner root, as git would report it.
    fn under(scanner: &ChartScanner, rel: &str) -> String {
        scanner.root().join(rel).to_string_lossy().into_owned()
    }

    fn files(paths: &[String]) -> BTreeSet<String> {
        paths.iter().cloned().collect()
    }

    #[test]
    fn relative_paths_under_absolute_root_are_flagged_once() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let set = detector.extract(
            &files(&[
                "charts/alpha/values.yaml".to_string(),
                "charts/web/values.yaml".to_string(),
            ]),
            &mut reporter,
        );
        assert!(set.is_empty());
        let flagged: Vec<_> = reporter
            .debugs
            .iter()
            .filter(|m| m.contains("is absolute but changed path"))
            .collect();
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn readme_only_change_yields_nothing() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default().with_diff("HEAD~1..HEAD", &["README.md"]);
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let changed =
            detector.detect_range(&RevisionRange::direct("HEAD~1", "HEAD"), &mut reporter);
        assert!(changed.is_empty());
        assert!(reporter.warns.iter().any(|m| m.contains("no charts changed")));
    }

    #[test]
    fn change_under_valid_chart_is_detected() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let set = detector.extract(
            &files(&[under(&scanner, "alpha/templates/x.yaml")]),
            &mut reporter,
        );
        assert_eq!(set.into_sorted_vec(), vec!["alpha"]);
    }

    #[test]
    fn change_under_directory_without_manifest_is_dropped() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let set = detector.extract(
            &files(&[under(&scanner, "beta/templates/x.yaml")]),
            &mut reporter,
        );
        assert!(set.is_empty());
        assert!(
            reporter
                .debugs
                .iter()
                .any(|m| m.contains("ignoring non-chart change"))
        );
    }

    #[test]
    fn paths_outside_root_and_lookalike_prefixes_are_ignored() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();
        let root = scanner.root().to_string_lossy().into_owned();

        let set = detector.extract(
            &files(&[
                "README.md".to_string(),
                format!("{root}-old/alpha/Chart.yaml"),
                "docs/charts/alpha/values.yaml".to_string(),
                under(&scanner, "web/values.yaml"),
                under(&scanner, "web/templates/deploy.yaml"),
                under(&scanner, ".gitignore"),
            ]),
            &mut reporter,
        );
        assert_eq!(set.into_sorted_vec(), vec!["web"]);
    }

    #[test]
    fn validity_is_checked_once_per_candidate() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        detector.extract(
            &files(&[
                under(&scanner, "beta/a.yaml"),
                under(&scanner, "beta/b.yaml"),
                under(&scanner, "beta/c.yaml"),
            ]),
            &mut reporter,
        );
        assert_eq!(detector.validity_cache().len(), 1);
        assert_eq!(
            detector.validity_cache().stats(),
            CacheStats { hits: 2, misses: 1 }
        );
    }

    #[test]
    fn repeated_diff_is_served_from_cache() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default().with_diff("a..b", &["README.md"]);
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let first = detector.changed_files("a..b", &mut reporter);
        let second = detector.changed_files("a..b", &mut reporter);

        assert_eq!(first, second);
        assert_eq!(git.diff_calls.borrow().len(), 1);
        assert_eq!(
            detector.diff_cache().stats(),
            CacheStats { hits: 1, misses: 1 }
        );
    }

    #[test]
    fn no_cache_reruns_the_diff() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default().with_diff("a..b", &["README.md"]);
        let detector = ChangeDetector::with_caches(&scanner, &git, NoCache, NoCache);
        let mut reporter = CollectingReporter::new();

        detector.changed_files("a..b", &mut reporter);
        detector.changed_files("a..b", &mut reporter);
        assert_eq!(git.diff_calls.borrow().len(), 2);
    }

    #[test]
    fn failed_diff_is_empty_and_not_cached() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        assert!(detector.changed_files("bad..HEAD", &mut reporter).is_empty());
        assert!(detector.changed_files("bad..HEAD", &mut reporter).is_empty());
        assert_eq!(git.diff_calls.borrow().len(), 2);
        assert!(
            reporter
                .warns
                .iter()
                .any(|m| m.contains("failed to get changed files"))
        );
        assert!(reporter.debugs.iter().any(|m| m.contains("bad revision")));
    }

    #[test]
    fn empty_diff_warns_no_files_changed() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default().with_diff("HEAD~1..HEAD", &[]);
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let changed =
            detector.detect_range(&RevisionRange::direct("HEAD~1", "HEAD"), &mut reporter);
        assert!(changed.is_empty());
        assert!(reporter.warns.iter().any(|m| m.contains("no files changed")));
    }

    #[test]
    fn all_lists_every_valid_chart_without_diffing() {
        let (_td, scanner) = charts_root();
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let changed = detector.detect_range(&RevisionRange::All, &mut reporter);
        assert_eq!(changed, vec!["alpha", "web"]);
        assert!(git.diff_calls.borrow().is_empty());
    }

    #[test]
    fn all_with_missing_root_warns_and_is_empty() {
        let td = tempfile::tempdir().expect("tempdir");
        let scanner = ChartScanner::new(td.path().join("missing"));
        let git = FakeGit::default();
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        assert!(
            detector
                .detect_range(&RevisionRange::All, &mut reporter)
                .is_empty()
        );
        assert!(
            reporter
                .warns
                .iter()
                .any(|m| m.contains("charts directory not found"))
        );
    }

    #[test]
    fn detect_resolves_then_extracts() {
        let (_td, scanner) = charts_root();
        let settings = Settings::resolve(
            &Config::default(),
            &EnvOverrides::default(),
            &CliOverrides::default(),
        );
        let signals = PipelineSignals::from_lookup(
            |key| match key {
                "CI_COMMIT_BRANCH" => Some("main".to_string()),
                "CI_COMMIT_BEFORE_SHA" => Some("abc".to_string()),
                _ => None,
            },
            &settings,
        );

        let changed_file = under(&scanner, "web/templates/svc.yaml");
        let git = FakeGit::default().with_diff("abc..HEAD", &[changed_file.as_str(), "README.md"]);
        let resolver = RevisionResolver::new(&signals, &git);
        let detector = ChangeDetector::new(&scanner, &git);
        let mut reporter = CollectingReporter::new();

        let changed = detector.detect(&resolver, &mut reporter);
        assert_eq!(changed, vec!["web"]);
        assert!(reporter.infos.iter().any(|m| m == "  - web"));
    }

    #[test]
    fn root_matching_is_component_wise() {
        let root = normalized_components(Path::new("./charts"));
        assert_eq!(root, vec!["charts"]);
        assert_eq!(
            first_segment_under(&root, "charts/foo/templates/x.yaml"),
            Some("foo".to_string())
        );
        assert_eq!(
            first_segment_under(&root, "./charts/foo/Chart.yaml"),
            Some("foo".to_string())
        );
        assert_eq!(first_segment_under(&root, "charts"), None);
        assert_eq!(first_segment_under(&root, "chartsx/foo/a"), None);
        assert_eq!(first_segment_under(&root, "other/foo/x"), None);
    }
}
