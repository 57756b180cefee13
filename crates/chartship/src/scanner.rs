use std::fs;
use std::path::{Path, PathBuf};

use chartship_types::{ChartError, ChartMetadata, MANIFEST_FILE};

/// Enumerates chart directories under a charts root.
///
/// A chart is a non-hidden directory that contains `Chart.yaml`. Nothing is
/// cached here; every call looks at the filesystem again.
#[derive(Debug, Clone)]
pub struct ChartScanner {
    root: PathBuf,
}

impl ChartScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Never errors; anything unexpected is simply not a chart.
    pub fn is_valid(&self, name: &str) -> bool {
        if name.is_empty() || name.starts_with('.') {
            return false;
        }

        let path = self.root.join(name);
        path.is_dir() && path.join(MANIFEST_FILE).is_file()
    }

    /// Sorted names of every valid chart. A missing root yields an empty list.
    pub fn list_valid(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut charts: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| self.is_valid(name))
            .collect();
        charts.sort();
        charts
    }

    pub fn root_exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn chart_path(&self, name: &str) -> Result<PathBuf, ChartError> {
        let path = self.root.join(name);

        if !path.is_dir() {
            return Err(ChartError::NotFound(format!(
                "chart directory not found: {}",
                path.display()
            )));
        }

        if !path.join(MANIFEST_FILE).is_file() {
            return Err(ChartError::NotFound(format!(
                "{MANIFEST_FILE} not found in {}",
                path.display()
            )));
        }

        Ok(path)
    }

    pub fn read_metadata(&self, name: &str) -> Result<ChartMetadata, ChartError> {
        let path = self.chart_path(name)?;
        let manifest = path.join(MANIFEST_FILE);

        let content = fs::read_to_string(&manifest).map_err(|e| {
            ChartError::NotFound(format!("failed to read {}: {e}", manifest.display()))
        })?;

        ChartMetadata::from_yaml_str(&content).map_err(|e| match e {
            ChartError::Validation(msg) => {
                ChartError::Validation(format!("{msg} ({})", path.display()))
            }
            other => other,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn list_valid_skips_directories_without_manifest() {
        let td = tempdir().expect("tempdir");
        write_chart(td.path(), "alpha", "1.0.0");
        fs::create_dir_all(td.path().join("beta")).expect("mkdir");

        let scanner = ChartScanner::new(td.path());
        assert_eq!(scanner.list_valid(), vec!["alpha"]);
        assert!(!scanner.is_valid("beta"));
    }

    #[test]
    fn list_valid_is_sorted_and_ignores_files_and_hidden_dirs() {
        let td = tempdir().expect("tempdir");
        write_chart(td.path(), "zeta", "1.0.0");
        write_chart(td.path(), "alpha", "1.0.0");
        write_chart(td.path(), ".hidden", "1.0.0");
        fs::write(td.path().join("README.md"), "docs").expect("write");

        let scanner = ChartScanner::new(td.path());
        assert_eq!(scanner.list_valid(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let td = tempdir().expect("tempdir");
        let scanner = ChartScanner::new(td.path().join("nope"));
        assert!(scanner.list_valid().is_empty());
        assert!(!scanner.root_exists());
    }

    #[test]
    fn empty_name_is_invalid() {
        let td = tempdir().expect("tempdir");
        assert!(!ChartScanner::new(td.path()).is_valid(""));
    }

    #[test]
    fn chart_path_reports_missing_pieces() {
        let td = tempdir().expect("tempdir");
        fs::create_dir_all(td.path().join("beta")).expect("mkdir");
        let scanner = ChartScanner::new(td.path());

        let err = scanner.chart_path("gamma").expect_err("missing dir");
        assert!(err.to_string().contains("chart directory not found"));

        let err = scanner.chart_path("beta").expect_err("missing manifest");
        assert!(err.to_string().contains("Chart.yaml not found"));
        assert!(matches!(err, ChartError::NotFound(_)));
    }

    #[test]
    fn read_metadata_parses_manifest() {
        let td = tempdir().expect("tempdir");
        write_chart(td.path(), "alpha", "1.0.0");

        let meta = ChartScanner::new(td.path())
            .read_metadata("alpha")
            .expect("metadata");
        assert_eq!(meta.name, "alpha");
        assert_eq!(meta.version, "1.0.0");
    }

    #[test]
    fn read_metadata_rejects_non_mapping_manifest() {
        let td = tempdir().expect("tempdir");
        write_manifest(td.path(), "list", "- one\n- two\n");

        let err = ChartScanner::new(td.path())
            .read_metadata("list")
            .expect_err("must fail");
        assert!(matches!(err, ChartError::Validation(_)));
    }

    #[test]
    fn read_metadata_is_not_cached() {
        let td = tempdir().expect("tempdir");
        write_chart(td.path(), "alpha", "1.0.0");
        let scanner = ChartScanner::new(td.path());
        assert_eq!(scanner.read_metadata("alpha").expect("v1").version, "1.0.0");

        write_chart(td.path(), "alpha", "1.1.0");
        assert_eq!(scanner.read_metadata("alpha").expect("v2").version, "1.1.0");
    }

    proptest! {
        #[test]
        fn hidden_names_are_never_valid(suffix in "[a-z0-9-]{0,12}", with_manifest in any::<bool>()) {
            let td = tempdir().expect("tempdir");
            let name = format!(".{suffix}");
            if with_manifest {
                write_chart(td.path(), &name, "1.0.0");
            }
            prop_assert!(!ChartScanner::new(td.path()).is_valid(&name));
        }

        #[test]
        fn directories_without_manifest_are_never_valid(name in "[a-z][a-z0-9-]{0,12}") {
            let td = tempdir().expect("tempdir");
            fs::create_dir_all(td.path().join(&name)).expect("mkdir");
            prop_assert!(!ChartScanner::new(td.path()).is_valid(&name));
        }
    }
}
