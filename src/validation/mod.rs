//! Validation engine: re-run the suite and compare against a baseline.
//!
//! A run passes when every test passes, coverage did not drop and no probed
//! test is flaky. Subprocess problems never raise; they land in
//! `runner_errors` and fail the judgement.

pub mod flakiness;

use crate::analysis::coverage::CoverageSnapshot;
use crate::analysis::discovery_for;
use crate::config::JanitorConfig;
use crate::error::Result;
use crate::model::{
    AnalysisReport, CoverageComparison, PerformanceComparison, ValidationReport,
};
use crate::output::Reporter;
use crate::runner::{SuiteRun, TestExecutor, run_all};
use chrono::Utc;
use flakiness::{FlakinessProbe, FlakinessResult};
use std::collections::BTreeSet;

/// Lost lines listed inline in a recommendation before truncating.
const LOST_LINES_SHOWN: usize = 10;

/// Pre-cleanup measurements that validation compares against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineSnapshot {
    pub coverage_percentage: f64,
    /// Summed test time in seconds.
    pub execution_time: f64,
    /// Covered `file:line` locations; empty when unknown.
    pub covered_lines: BTreeSet<String>,
    pub total_tests: usize,
}

fn source_coverage(snapshot: Option<CoverageSnapshot>) -> Option<CoverageSnapshot> {
    snapshot.map(|mut snapshot| {
        snapshot.exclude_test_files();
        snapshot
    })
}

impl BaselineSnapshot {
    /// Baseline from a fresh execution of the untouched suite.
    #[must_use]
    pub fn from_run(run: &SuiteRun) -> Self {
        let coverage = source_coverage(run.coverage());
        Self {
            coverage_percentage: coverage.as_ref().map_or(0.0, CoverageSnapshot::percentage),
            execution_time: run.execution_time(),
            covered_lines: coverage
                .map(|snapshot| snapshot.data.covered_lines())
                .unwrap_or_default(),
            total_tests: run.total_tests(),
        }
    }

    /// Baseline from a persisted analysis report. Line-level coverage is not
    /// persisted, so lost lines cannot be listed.
    #[must_use]
    pub fn from_report(report: &AnalysisReport) -> Self {
        Self {
            coverage_percentage: report.coverage_percentage,
            execution_time: report.total_execution_time,
            covered_lines: BTreeSet::new(),
            total_tests: report.total_tests,
        }
    }
}

/// Re-executes the suite through a [`TestExecutor`].
pub struct Validator<'a> {
    config: &'a JanitorConfig,
    executor: &'a dyn TestExecutor,
    reporter: &'a dyn Reporter,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub fn new(
        config: &'a JanitorConfig,
        executor: &'a dyn TestExecutor,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            config,
            executor,
            reporter,
        }
    }

    /// Discover and run both ecosystems once.
    #[must_use]
    pub fn run_suite(&self) -> SuiteRun {
        let files = discovery_for(self.config).discover(&self.config.target);
        let spinner = self.reporter.progress(0, "Running test suites");
        let run = run_all(self.executor, &files);
        spinner.finish_and_clear();
        run
    }

    /// Measure the untouched suite.
    #[must_use]
    pub fn capture_baseline(&self) -> BaselineSnapshot {
        self.reporter.info("capturing pre-cleanup baseline");
        let baseline = BaselineSnapshot::from_run(&self.run_suite());
        tracing::info!(
            coverage = baseline.coverage_percentage,
            execution_time = baseline.execution_time,
            tests = baseline.total_tests,
            "Captured baseline"
        );
        baseline
    }

    fn probe_flakiness(&self, targets: &[String]) -> Result<FlakinessResult> {
        let iterations = self.config.validation.iterations;
        let progress = self
            .reporter
            .progress((targets.len() * iterations) as u64, "Probing for flaky tests");
        let probe = FlakinessProbe::new(
            self.executor,
            iterations,
            self.config.validation.stability_threshold,
            self.config.validation.workers,
        );
        let result = probe.probe(targets, &progress);
        progress.finish_and_clear();
        result
    }

    /// Re-run the suite, compare with `baseline` and probe `flaky_targets`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` only when the probe cannot start. A failing
    /// judgement is reported through `ValidationReport::passed`.
    pub fn validate(
        &self,
        baseline: &BaselineSnapshot,
        flaky_targets: &[String],
    ) -> Result<ValidationReport> {
        self.reporter.phase_started("validation");
        let run = self.run_suite();

        let mut runner_errors = run.runner_errors();
        let coverage = match source_coverage(run.coverage()) {
            Some(snapshot) => {
                let after_lines = snapshot.data.covered_lines();
                let lost = baseline
                    .covered_lines
                    .difference(&after_lines)
                    .cloned()
                    .collect();
                CoverageComparison::new(baseline.coverage_percentage, snapshot.percentage(), lost)
            }
            None => {
                if baseline.coverage_percentage > 0.0 {
                    runner_errors
                        .push("coverage unavailable after cleanup; comparison skipped".to_string());
                }
                CoverageComparison::new(
                    baseline.coverage_percentage,
                    baseline.coverage_percentage,
                    Vec::new(),
                )
            }
        };
        let performance = PerformanceComparison::new(baseline.execution_time, run.execution_time());

        let flakiness = if flaky_targets.is_empty() {
            FlakinessResult::default()
        } else {
            self.probe_flakiness(flaky_targets)?
        };
        runner_errors.extend(flakiness.errors.iter().cloned());

        let all_tests_passing = run.all_passing();
        let mut report = ValidationReport {
            generated_at: Utc::now(),
            all_tests_passing,
            passed: ValidationReport::judge(all_tests_passing, &coverage, &flakiness.flaky),
            coverage,
            performance,
            flaky_tests: flakiness.flaky,
            total_tests: run.total_tests(),
            failed_tests: run.failed_tests(),
            pass_rates: flakiness.pass_rates,
            runner_errors,
            recommendations: Vec::new(),
        };
        report.recommendations = recommendations(&report);

        let summary = format!(
            "{}: {} tests, coverage {:.1}% -> {:.1}%, {} flaky",
            if report.passed { "passed" } else { "failed" },
            report.total_tests,
            report.coverage.before,
            report.coverage.after,
            report.flaky_tests.len()
        );
        if report.passed {
            tracing::info!(%summary, "Validation complete");
        } else {
            tracing::warn!(%summary, "Validation did not pass");
        }
        self.reporter.phase_finished("validation", &summary);
        Ok(report)
    }
}

fn listing(items: &[String], shown: usize) -> String {
    let mut text = items.iter().take(shown).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > shown {
        text.push_str(&format!(" (+{} more)", items.len() - shown));
    }
    text
}

/// Follow-up actions implied by a validation report.
#[must_use]
pub fn recommendations(report: &ValidationReport) -> Vec<String> {
    let mut out = Vec::new();
    let coverage = &report.coverage;
    if coverage.regressed() {
        let mut text = format!(
            "Coverage dropped {:.1} points ({:.1}% -> {:.1}%): restore coverage before merging",
            -coverage.delta, coverage.before, coverage.after
        );
        if !coverage.lost_lines.is_empty() {
            text.push_str(&format!(
                "; lost lines: {}",
                listing(&coverage.lost_lines, LOST_LINES_SHOWN)
            ));
        }
        out.push(text);
    }
    if report.performance.improvement_percentage < 0.0 {
        out.push(format!(
            "Execution time rose {:.1}% ({:.2}s -> {:.2}s): investigate slow or newly merged tests",
            -report.performance.improvement_percentage,
            report.performance.before,
            report.performance.after
        ));
    }
    if !report.failed_tests.is_empty() {
        out.push(format!(
            "Fix {} failing test(s) before merging: {}",
            report.failed_tests.len(),
            listing(&report.failed_tests, LOST_LINES_SHOWN)
        ));
    }
    if !report.flaky_tests.is_empty() {
        out.push(format!(
            "Stabilize {} flaky test(s): {}",
            report.flaky_tests.len(),
            listing(&report.flaky_tests, LOST_LINES_SHOWN)
        ));
    }
    if !report.runner_errors.is_empty() {
        out.push(format!(
            "Resolve runner errors: {}",
            listing(&report.runner_errors, 3)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::history::{RunOutcome, TestRun};
    use crate::model::Ecosystem;
    use crate::output::{RecordingReporter, SilentReporter};
    use crate::runner::SuiteResult;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Reports every file's tests as passing with fixed coverage.
    struct Fixed {
        failing: Vec<String>,
        covered: Vec<(&'static str, usize, u64)>,
    }

    impl TestExecutor for Fixed {
        fn run_suite(&self, ecosystem: Ecosystem, files: &[PathBuf]) -> SuiteResult {
            let runs: Vec<TestRun> = files
                .iter()
                .map(|path| {
                    let id =
                        format!("tests/{}::test_x", path.file_name().unwrap().to_string_lossy());
                    let outcome = if self.failing.contains(&id) {
                        RunOutcome::Failed
                    } else {
                        RunOutcome::Passed
                    };
                    TestRun {
                        file_path: id.split("::").next().unwrap().to_string(),
                        test_id: id,
                        outcome,
                        duration: 0.5,
                        timestamp: None,
                    }
                })
                .collect();
            let mut coverage = CoverageSnapshot::default();
            for (file, line, hits) in &self.covered {
                coverage.data.record(file, *line, *hits);
            }
            SuiteResult {
                ecosystem: Some(ecosystem),
                exit_code: Some(i32::from(!self.failing.is_empty())),
                runs,
                coverage: Some(coverage),
                ..SuiteResult::default()
            }
        }

        fn run_single(&self, ecosystem: Ecosystem, _test_id: &str) -> SuiteResult {
            SuiteResult {
                ecosystem: Some(ecosystem),
                exit_code: Some(0),
                ..SuiteResult::default()
            }
        }
    }

    fn target() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("tests")).unwrap();
        fs::write(temp.path().join("tests/test_a.py"), "def test_x():\n    assert 1\n").unwrap();
        temp
    }

    #[test]
    fn passing_run_without_coverage_loss_passes() {
        let temp = target();
        let config = JanitorConfig::defaults_for(temp.path());
        let executor = Fixed {
            failing: vec![],
            covered: vec![("app.py", 1, 1), ("app.py", 2, 1), ("tests/test_a.py", 1, 1)],
        };
        let validator = Validator::new(&config, &executor, &SilentReporter);
        let baseline = validator.capture_baseline();
        assert!((baseline.coverage_percentage - 100.0).abs() < 1e-9);
        assert!(!baseline.covered_lines.contains("tests/test_a.py:1"));

        let report = validator.validate(&baseline, &[]).unwrap();
        assert!(report.passed);
        assert!(report.all_tests_passing);
        assert_eq!(report.total_tests, 1);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn coverage_drop_fails_and_lists_lost_lines() {
        let temp = target();
        let config = JanitorConfig::defaults_for(temp.path());
        let executor = Fixed {
            failing: vec![],
            covered: vec![("app.py", 1, 1), ("app.py", 2, 0)],
        };
        let baseline = BaselineSnapshot {
            coverage_percentage: 100.0,
            execution_time: 0.5,
            covered_lines: ["app.py:1".to_string(), "app.py:2".to_string()].into(),
            total_tests: 1,
        };
        let reporter = RecordingReporter::default();
        let report = Validator::new(&config, &executor, &reporter)
            .validate(&baseline, &[])
            .unwrap();
        assert!(!report.passed);
        assert!((report.coverage.delta - -50.0).abs() < 1e-9);
        assert_eq!(report.coverage.lost_lines, vec!["app.py:2".to_string()]);
        assert!(report.recommendations[0].contains("restore coverage"));
        assert!(reporter.events().last().unwrap().starts_with("done:validation:failed"));
    }

    #[test]
    fn failing_tests_fail_judgement() {
        let temp = target();
        let config = JanitorConfig::defaults_for(temp.path());
        let executor = Fixed {
            failing: vec!["tests/test_a.py::test_x".to_string()],
            covered: vec![],
        };
        let report = Validator::new(&config, &executor, &SilentReporter)
            .validate(&BaselineSnapshot::default(), &[])
            .unwrap();
        assert!(!report.all_tests_passing);
        assert_eq!(report.failed_tests, vec!["tests/test_a.py::test_x".to_string()]);
        assert!(report.recommendations.iter().any(|r| r.starts_with("Fix 1 failing test(s)")));
    }

    #[test]
    fn recommendation_for_documented_coverage_scenario() {
        let report = ValidationReport {
            generated_at: Utc::now(),
            all_tests_passing: true,
            coverage: CoverageComparison::new(85.0, 80.0, vec![]),
            performance: PerformanceComparison::new(10.0, 8.0),
            flaky_tests: vec![],
            total_tests: 10,
            failed_tests: vec![],
            pass_rates: Default::default(),
            runner_errors: vec![],
            recommendations: vec![],
            passed: false,
        };
        let recs = recommendations(&report);
        assert_eq!(recs.len(), 1);
        assert_eq!(
            recs[0],
            "Coverage dropped 5.0 points (85.0% -> 80.0%): restore coverage before merging"
        );
    }
}
