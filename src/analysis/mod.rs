//! Analysis engine: discovery, parsing, categorization and suite metrics.
//!
//! Categorization runs in priority order so every test lands in exactly one
//! bucket: obsolete, then fragile, then duplicate, then valuable.

pub mod coverage;
pub mod duplicates;
pub mod fragility;
pub mod history;
pub mod obsolescence;
pub mod syntax;

use crate::config::JanitorConfig;
use crate::discovery::Discovery;
use crate::error::{JanitorError, Result};
use crate::model::{AnalysisOutcome, AnalysisReport, ObsoleteScope, SkippedItem, TestMetrics};
use crate::output::Reporter;
use crate::util::relative_display;
use crate::util::time::file_modified;
use coverage::CoverageSnapshot;
use duplicates::{Candidate, DuplicateDetector};
use history::{HistoryAnalyzer, HistoryData};
use obsolescence::{ImportResolver, ObsolescenceDetector};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use syntax::{ParsedTestFile, TestFunction, parse_file};

/// Everything the analysis phase learned, kept in memory for later phases.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: AnalysisReport,
    pub files: Vec<ParsedTestFile>,
    pub history: HistoryData,
    pub coverage: Option<CoverageSnapshot>,
}

impl Analysis {
    #[must_use]
    pub fn file(&self, rel_path: &str) -> Option<&ParsedTestFile> {
        self.files.iter().find(|file| file.rel_path == rel_path)
    }

    /// Locate a test by qualified name.
    #[must_use]
    pub fn test(&self, qualified_name: &str) -> Option<(&ParsedTestFile, &TestFunction)> {
        self.files.iter().find_map(|file| {
            file.tests
                .iter()
                .find(|test| test.qualified_name == qualified_name)
                .map(|test| (file, test))
        })
    }

    pub fn tests(&self) -> impl Iterator<Item = (&ParsedTestFile, &TestFunction)> {
        self.files
            .iter()
            .flat_map(|file| file.tests.iter().map(move |test| (file, test)))
    }
}

/// Discovery configured to skip this tool's own directories.
#[must_use]
pub fn discovery_for(config: &JanitorConfig) -> Discovery {
    Discovery::new().excluding([
        config.output_dir.clone(),
        config.backup_dir.clone(),
        config.analysis.history_dir.clone(),
    ])
}

/// Parse every discovered file on the rayon pool.
fn parse_all(
    config: &JanitorConfig,
    reporter: &dyn Reporter,
) -> (Vec<ParsedTestFile>, BTreeMap<crate::model::Ecosystem, usize>, Vec<SkippedItem>) {
    let root = config.target.as_path();
    let discovered = discovery_for(config).discover(root);
    let counts = discovered.counts();
    let work: Vec<_> = discovered.iter().collect();

    let progress = reporter.progress(work.len() as u64, "Parsing test files");
    let outcomes: Vec<(&Path, AnalysisOutcome<ParsedTestFile>)> = work
        .par_iter()
        .map(|(ecosystem, path)| {
            let outcome = parse_file(root, path, *ecosystem);
            progress.inc(1);
            (*path, outcome)
        })
        .collect();
    progress.finish_and_clear();

    let mut files = Vec::with_capacity(outcomes.len());
    let mut skipped = Vec::new();
    for (path, outcome) in outcomes {
        match outcome {
            AnalysisOutcome::Ok(file) => files.push(file),
            AnalysisOutcome::Skipped(reason) => {
                let rel = relative_display(root, path);
                tracing::warn!(file = %rel, %reason, "Skipping unparseable test file");
                reporter.warning(&format!("skipped {rel}: {reason}"));
                skipped.push(SkippedItem { path: rel, reason });
            }
        }
    }
    (files, counts, skipped)
}

/// Metrics for one test: history tallies plus static facts about its source.
fn metrics_for(file: &ParsedTestFile, test: &TestFunction, history: &HistoryData) -> TestMetrics {
    let mut metrics = history.get(&test.qualified_name).cloned().unwrap_or_else(|| {
        TestMetrics::from_tallies(&test.qualified_name, &file.rel_path, 0, 0, 0.0)
    });
    metrics.test_name.clone_from(&test.qualified_name);
    metrics.file_path.clone_from(&file.rel_path);
    metrics.lines_of_code = test.lines_of_code;
    metrics.last_modified = file_modified(&file.path);
    metrics
}

/// Run the full analysis phase.
///
/// # Errors
///
/// Returns `TargetNotFound` when the target is not a directory, or
/// `AnalysisFailed` if categorization breaks its partition invariant.
pub fn analyze(config: &JanitorConfig, reporter: &dyn Reporter) -> Result<Analysis> {
    let root = config.target.as_path();
    if !root.is_dir() {
        return Err(JanitorError::TargetNotFound {
            path: root.to_path_buf(),
        });
    }
    reporter.phase_started("analysis");

    let (files, files_by_ecosystem, mut skipped) = parse_all(config, reporter);

    let history = HistoryAnalyzer::new(root, &config.analysis.history_dir).load();
    skipped.extend(history.skipped.iter().cloned());

    let (mut coverage, coverage_skipped) =
        coverage::load_coverage(root, &[root, config.analysis.history_dir.as_path()]);
    skipped.extend(coverage_skipped);
    if let Some(snapshot) = coverage.as_mut() {
        snapshot.exclude_test_files();
    }

    let resolver = ImportResolver::new(root, &config.analysis.module_search_paths);
    let obsolescence = ObsolescenceDetector::new(resolver, &config.analysis.deprecation_markers);

    let mut report = AnalysisReport::empty(root.display().to_string());
    report.files_by_ecosystem = files_by_ecosystem;
    report.skipped = skipped;

    // Obsolete
    let mut obsolete: BTreeSet<&str> = BTreeSet::new();
    let mut obsolete_files: BTreeSet<&str> = BTreeSet::new();
    for file in &files {
        let findings = obsolescence.scan(file);
        for finding in &findings {
            match (finding.scope, finding.test_name.as_deref()) {
                (ObsoleteScope::Test, Some(name)) => {
                    if let Some(test) = file.tests.iter().find(|t| t.qualified_name == name) {
                        obsolete.insert(test.qualified_name.as_str());
                    }
                }
                _ => {
                    obsolete_files.insert(file.rel_path.as_str());
                    obsolete.extend(file.tests.iter().map(|t| t.qualified_name.as_str()));
                }
            }
        }
        report.obsolete_findings.extend(findings);
    }

    // Fragile
    let mut fragile: BTreeSet<&str> = BTreeSet::new();
    let mut all_metrics = Vec::new();
    for file in &files {
        for test in &file.tests {
            let metrics = metrics_for(file, test, &history);
            report.total_execution_time += metrics.execution_time;
            if !obsolete.contains(test.qualified_name.as_str())
                && fragility::is_fragile(&metrics, config.analysis.fragile_threshold)
            {
                fragile.insert(test.qualified_name.as_str());
                report.fragile_tests.push(metrics.clone());
            }
            all_metrics.push(metrics);
        }
    }

    // Duplicate
    let candidates: Vec<Candidate<'_>> = files
        .iter()
        .flat_map(|file| {
            file.tests.iter().map(move |test| Candidate {
                ecosystem: file.ecosystem,
                test,
            })
        })
        .filter(|c| {
            let name = c.test.qualified_name.as_str();
            !obsolete.contains(name) && !fragile.contains(name)
        })
        .collect();
    let detector = DuplicateDetector::new(
        config.analysis.name_threshold,
        config.analysis.assertion_threshold,
    );
    report.duplicate_groups = detector.detect(&candidates);
    let duplicated: BTreeSet<String> =
        report.duplicate_members().map(str::to_string).collect();

    // Valuable, plus ordered obsolete list
    for file in &files {
        for test in &file.tests {
            let name = test.qualified_name.as_str();
            if obsolete.contains(name) {
                report.obsolete_tests.push(name.to_string());
            } else if !fragile.contains(name) && !duplicated.contains(name) {
                report.valuable_tests.push(name.to_string());
            }
        }
    }
    report.total_tests = files.iter().map(|file| file.tests.len()).sum();

    report.rewrite_candidates = files
        .iter()
        .filter(|file| !obsolete_files.contains(file.rel_path.as_str()))
        .filter_map(|file| {
            fragility::rewrite_candidate(&file.rel_path, file.ecosystem, &file.source, &file.tests)
        })
        .collect();

    if let Some(snapshot) = &coverage {
        report.coverage_percentage = snapshot.percentage();
        report.coverage_overlaps =
            coverage::find_overlaps(&snapshot.per_test, config.analysis.overlap_threshold);
    }

    report
        .check_categorization()
        .map_err(|reason| JanitorError::AnalysisFailed { reason })?;

    let summary = format!(
        "{} tests: {} obsolete, {} fragile, {} in {} duplicate groups, {} valuable",
        report.total_tests,
        report.obsolete_tests.len(),
        report.fragile_tests.len(),
        duplicated.len(),
        report.duplicate_groups.len(),
        report.valuable_tests.len()
    );
    tracing::info!(%summary, "Analysis complete");
    reporter.phase_finished("analysis", &summary);

    Ok(Analysis {
        report,
        files,
        history,
        coverage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupKind, TestCategory};
    use crate::output::{RecordingReporter, SilentReporter};
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn suite() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(
            root,
            "tests/test_a.py",
            "def test_example():\n    assert 1 == 1\n\n\ndef test_unique_alpha():\n    value = 3\n    assert value * 2 == 6\n",
        );
        write(root, "tests/test_b.py", "def test_example():\n    assert 1 == 1\n");
        write(
            root,
            "tests/test_old.py",
            "# DEPRECATED: covered by test_a\n\ndef test_legacy_path():\n    assert True\n",
        );
        write(
            root,
            "tests/test_net.py",
            "import time\n\n\ndef test_network_poll():\n    time.sleep(0.1)\n    assert 2 > 1\n",
        );
        write(root, "tests/test_broken.py", "def test_oops(:\n    pass\n");
        write(
            root,
            ".test-history/run1.json",
            r#"{"tests/test_net.py::test_network_poll": {"outcome": "failed", "duration": 0.2},
                "tests/test_a.py::test_unique_alpha": {"outcome": "passed", "duration": 0.1}}"#,
        );
        temp
    }

    #[test]
    fn categorizes_every_test_exactly_once() {
        let temp = suite();
        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        let report = &analysis.report;

        assert_eq!(report.total_tests, 5);
        report.check_categorization().unwrap();
        assert_eq!(report.obsolete_tests, vec!["tests/test_old.py::test_legacy_path"]);
        assert_eq!(
            report.category_of("tests/test_net.py::test_network_poll"),
            Some(TestCategory::Fragile)
        );
        assert_eq!(report.duplicate_groups.len(), 1);
        assert_eq!(report.duplicate_groups[0].kind, GroupKind::Exact);
        assert_eq!(
            report.category_of("tests/test_a.py::test_unique_alpha"),
            Some(TestCategory::Valuable)
        );
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "tests/test_broken.py");
        assert!(report
            .rewrite_candidates
            .iter()
            .any(|c| c.file_path == "tests/test_net.py"));
        assert!((report.total_execution_time - 0.3).abs() < 1e-9);
    }

    #[test]
    fn missing_target_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config = JanitorConfig::defaults_for(&temp.path().join("nope"));
        let err = analyze(&config, &SilentReporter).unwrap_err();
        assert!(matches!(err, JanitorError::TargetNotFound { .. }));
    }

    #[test]
    fn reports_phase_events() {
        let temp = suite();
        let config = JanitorConfig::defaults_for(temp.path());
        let reporter = RecordingReporter::default();
        analyze(&config, &reporter).unwrap();
        let events = reporter.events();
        assert_eq!(events.first().map(String::as_str), Some("start:analysis"));
        assert!(events.last().unwrap().starts_with("done:analysis:5 tests"));
        assert!(events.iter().any(|e| e.starts_with("warn:skipped tests/test_broken.py")));
    }

    #[test]
    fn empty_directory_gives_empty_report() {
        let temp = TempDir::new().unwrap();
        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        assert_eq!(analysis.report.total_tests, 0);
        assert!(analysis.report.coverage_percentage.abs() < f64::EPSILON);
    }
}
