//! Execution runner: drives pytest and Vitest as subprocesses.
//!
//! Every run yields a [`SuiteResult`]. Launch failures, timeouts and
//! unreadable reports are captured in the result instead of being raised,
//! so callers can always compare and log what happened.

pub mod process;
pub mod reports;

use crate::analysis::coverage::CoverageSnapshot;
use crate::analysis::history::{RunOutcome, TestRun, normalize_test_id};
use crate::config::RunnerConfig;
use crate::discovery::DiscoveredFiles;
use crate::model::{AnalysisOutcome, Ecosystem};
use crate::util::relative_display;
use process::{ProcessOutput, run_command};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Name of the scratch directory (under the output directory) for runner reports.
pub const SCRATCH_DIR: &str = "runs";

/// Result of one runner invocation for one ecosystem.
#[derive(Debug, Clone, Default)]
pub struct SuiteResult {
    pub ecosystem: Option<Ecosystem>,
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock seconds for the whole invocation.
    pub duration: f64,
    pub timed_out: bool,
    /// Set when the run could not be started or its report could not be read.
    pub error: Option<String>,
    pub runs: Vec<TestRun>,
    pub coverage: Option<CoverageSnapshot>,
}

impl SuiteResult {
    /// A result for a run that never produced output.
    #[must_use]
    pub fn failure(
        ecosystem: Ecosystem,
        command: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            ecosystem: Some(ecosystem),
            command: command.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Ids of tests that failed in this run.
    #[must_use]
    pub fn failed_tests(&self) -> Vec<String> {
        self.runs
            .iter()
            .filter(|run| run.outcome == RunOutcome::Failed)
            .map(|run| run.test_id.clone())
            .collect()
    }

    /// Tests that actually executed (skips excluded).
    #[must_use]
    pub fn executed(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.outcome != RunOutcome::NotRun)
            .count()
    }

    /// Sum of per-test durations, falling back to wall-clock time when the
    /// report carried none.
    #[must_use]
    pub fn test_time(&self) -> f64 {
        let total: f64 = self.runs.iter().map(|run| run.duration).sum();
        if total > 0.0 { total } else { self.duration }
    }

    /// Runner-level problem, if any: launch error, timeout, or a failing exit
    /// code with no failing test to explain it.
    #[must_use]
    pub fn runner_error(&self) -> Option<String> {
        let label = self.ecosystem.map_or("runner", |eco| eco.runner_name());
        if let Some(error) = &self.error {
            return Some(format!("{label}: {error}"));
        }
        if self.timed_out {
            return Some(format!("{label}: timed out after {:.0}s", self.duration));
        }
        let exit_ok = match (self.ecosystem, self.exit_code) {
            (_, Some(0)) => true,
            // pytest exits 5 when nothing was collected.
            (Some(Ecosystem::Python), Some(5)) => self.runs.is_empty(),
            _ => false,
        };
        if !exit_ok && self.failed_tests().is_empty() {
            let code = self
                .exit_code
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            return Some(format!(
                "{label}: exited with {code}: {}",
                reports::tail(&self.stderr, 5)
            ));
        }
        None
    }

    /// Whether the run completed and every executed test passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.runner_error().is_none() && self.failed_tests().is_empty()
    }

    /// Outcome of one test in this run, if it was reported.
    #[must_use]
    pub fn outcome_of(&self, test_id: &str) -> Option<RunOutcome> {
        let wanted = normalize_test_id(runner_id(test_id));
        let mut outcomes = self
            .runs
            .iter()
            .filter(|run| run.test_id == wanted)
            .map(|run| run.outcome)
            .peekable();
        outcomes.peek()?;
        // Parametrized cases share an id; any failure fails the test.
        let mut seen_pass = false;
        for outcome in outcomes {
            match outcome {
                RunOutcome::Failed => return Some(RunOutcome::Failed),
                RunOutcome::Passed => seen_pass = true,
                RunOutcome::NotRun => {}
            }
        }
        Some(if seen_pass { RunOutcome::Passed } else { RunOutcome::NotRun })
    }
}

/// The id a runner reports for `test_id`. Same-name tests in one file carry
/// a `#n` suffix that runners never see.
#[must_use]
pub fn runner_id(test_id: &str) -> &str {
    test_id.rsplit_once('#').map_or(test_id, |(head, tail)| {
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            head
        } else {
            test_id
        }
    })
}

/// Results of running every ecosystem once.
#[derive(Debug, Clone, Default)]
pub struct SuiteRun {
    pub results: Vec<SuiteResult>,
}

impl SuiteRun {
    #[must_use]
    pub fn all_passing(&self) -> bool {
        self.results.iter().all(SuiteResult::passed)
    }

    #[must_use]
    pub fn failed_tests(&self) -> Vec<String> {
        self.results.iter().flat_map(SuiteResult::failed_tests).collect()
    }

    #[must_use]
    pub fn runner_errors(&self) -> Vec<String> {
        self.results.iter().filter_map(SuiteResult::runner_error).collect()
    }

    #[must_use]
    pub fn total_tests(&self) -> usize {
        self.results.iter().map(SuiteResult::executed).sum()
    }

    /// Summed test time across ecosystems, in seconds.
    #[must_use]
    pub fn execution_time(&self) -> f64 {
        self.results.iter().map(SuiteResult::test_time).sum()
    }

    /// Merged coverage of every ecosystem that reported any.
    #[must_use]
    pub fn coverage(&self) -> Option<CoverageSnapshot> {
        let mut merged: Option<CoverageSnapshot> = None;
        for snapshot in self.results.iter().filter_map(|result| result.coverage.clone()) {
            merged.get_or_insert_with(CoverageSnapshot::default).merge(snapshot);
        }
        merged
    }
}

/// Something that can execute tests.
///
/// Validation and flakiness probing only talk to this trait, so tests can
/// substitute a scripted executor.
pub trait TestExecutor: Send + Sync {
    /// Run every given file of one ecosystem, collecting results and coverage.
    fn run_suite(&self, ecosystem: Ecosystem, files: &[PathBuf]) -> SuiteResult;

    /// Run a single test by qualified id, without coverage.
    fn run_single(&self, ecosystem: Ecosystem, test_id: &str) -> SuiteResult;
}

/// Run both ecosystems concurrently; ecosystems without files are not run.
pub fn run_all(executor: &dyn TestExecutor, files: &DiscoveredFiles) -> SuiteRun {
    let run = |ecosystem: Ecosystem| {
        let targets = files.for_ecosystem(ecosystem);
        if targets.is_empty() {
            tracing::debug!(%ecosystem, "No files, not running");
            None
        } else {
            Some(executor.run_suite(ecosystem, targets))
        }
    };
    let (python, javascript) =
        rayon::join(|| run(Ecosystem::Python), || run(Ecosystem::JavaScript));
    SuiteRun {
        results: python.into_iter().chain(javascript).collect(),
    }
}

/// Ecosystem a qualified test id belongs to, judged by its file part.
#[must_use]
pub fn ecosystem_of(test_id: &str) -> Option<Ecosystem> {
    let file = test_id.split("::").next().unwrap_or(test_id);
    crate::discovery::classify(Path::new(file))
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Default executor: spawns the configured runner commands in the target.
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    root: PathBuf,
    config: RunnerConfig,
    scratch_root: PathBuf,
}

impl SubprocessExecutor {
    /// `output_dir` hosts per-run scratch directories for reports.
    #[must_use]
    pub fn new(root: &Path, config: &RunnerConfig, output_dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            config: config.clone(),
            scratch_root: output_dir.join(SCRATCH_DIR),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn scratch_dir(&self) -> std::io::Result<PathBuf> {
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .scratch_root
            .join(format!("{}-{n}", std::process::id()));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Command line for one invocation.
    #[must_use]
    pub fn command(
        &self,
        ecosystem: Ecosystem,
        scratch: &Path,
        targets: &[String],
        name_filter: Option<&str>,
        with_coverage: bool,
    ) -> Vec<String> {
        let report = scratch.join("report.json");
        let mut argv = match ecosystem {
            Ecosystem::Python => {
                let mut argv = self.config.python_command.clone();
                argv.extend([
                    "-q".to_string(),
                    "-p".to_string(),
                    "no:cacheprovider".to_string(),
                    "--json-report".to_string(),
                    format!("--json-report-file={}", report.display()),
                ]);
                if with_coverage {
                    argv.extend([
                        format!("--cov={}", self.root.display()),
                        "--cov-context=test".to_string(),
                        format!("--cov-report=xml:{}", scratch.join("coverage.xml").display()),
                        format!("--cov-report=json:{}", scratch.join("coverage.json").display()),
                    ]);
                }
                argv
            }
            Ecosystem::JavaScript => {
                let mut argv = self.config.node_command.clone();
                argv.extend([
                    "--reporter=json".to_string(),
                    format!("--outputFile={}", report.display()),
                ]);
                if with_coverage {
                    argv.extend([
                        "--coverage.enabled".to_string(),
                        "--coverage.reporter=json".to_string(),
                        format!(
                            "--coverage.reportsDirectory={}",
                            scratch.join("coverage").display()
                        ),
                    ]);
                }
                if let Some(filter) = name_filter {
                    argv.extend(["-t".to_string(), filter.to_string()]);
                }
                argv
            }
        };
        argv.extend(targets.iter().cloned());
        argv
    }

    fn execute(
        &self,
        ecosystem: Ecosystem,
        argv: &[String],
        scratch: &Path,
        with_coverage: bool,
    ) -> SuiteResult {
        let command = argv.join(" ");
        let output = match run_command(argv, &self.root, self.timeout()) {
            Ok(output) => output,
            Err(err) => return SuiteResult::failure(ecosystem, command, err.to_string()),
        };
        let ProcessOutput {
            exit_code,
            stdout,
            stderr,
            duration,
            timed_out,
        } = output;

        let mut result = SuiteResult {
            ecosystem: Some(ecosystem),
            command,
            exit_code,
            stdout,
            stderr,
            duration,
            timed_out,
            ..SuiteResult::default()
        };
        if !timed_out {
            match reports::read_result_report(&scratch.join("report.json"), &self.root) {
                AnalysisOutcome::Ok(runs) => result.runs = runs,
                AnalysisOutcome::Skipped(reason) => {
                    let hint = match (ecosystem, reports::pytest_summary_counts(&result.stdout)) {
                        (Ecosystem::Python, Some((passed, failed))) => {
                            format!(" ({passed} passed, {failed} failed per terminal summary)")
                        }
                        _ => String::new(),
                    };
                    result.error = Some(format!("{reason}{hint}"));
                }
            }
            if with_coverage {
                result.coverage = reports::read_coverage(scratch, &self.root);
            }
        }
        if let Err(err) = fs::remove_dir_all(scratch) {
            tracing::debug!(
                dir = %scratch.display(),
                error = %err,
                "Could not remove runner scratch dir"
            );
        }
        result
    }
}

impl TestExecutor for SubprocessExecutor {
    fn run_suite(&self, ecosystem: Ecosystem, files: &[PathBuf]) -> SuiteResult {
        let scratch = match self.scratch_dir() {
            Ok(dir) => dir,
            Err(err) => {
                return SuiteResult::failure(
                    ecosystem,
                    ecosystem.runner_name(),
                    format!("scratch dir: {err}"),
                );
            }
        };
        let targets: Vec<String> = files
            .iter()
            .map(|path| relative_display(&self.root, path))
            .collect();
        let argv = self.command(ecosystem, &scratch, &targets, None, true);
        self.execute(ecosystem, &argv, &scratch, true)
    }

    fn run_single(&self, ecosystem: Ecosystem, test_id: &str) -> SuiteResult {
        let scratch = match self.scratch_dir() {
            Ok(dir) => dir,
            Err(err) => {
                return SuiteResult::failure(
                    ecosystem,
                    ecosystem.runner_name(),
                    format!("scratch dir: {err}"),
                );
            }
        };
        let (targets, filter) = single_target(ecosystem, test_id);
        let argv = self.command(ecosystem, &scratch, &targets, filter.as_deref(), false);
        self.execute(ecosystem, &argv, &scratch, false)
    }
}

/// Runner arguments selecting one test.
///
/// Python ids are pytest node ids already. JavaScript ids become the file
/// plus an anchored name pattern.
fn single_target(ecosystem: Ecosystem, test_id: &str) -> (Vec<String>, Option<String>) {
    let id = runner_id(test_id);
    match ecosystem {
        Ecosystem::Python => (vec![id.to_string()], None),
        Ecosystem::JavaScript => match id.split_once("::") {
            Some((file, name)) => (
                vec![file.to_string()],
                Some(format!("^{}$", regex::escape(name))),
            ),
            None => (vec![id.to_string()], None),
        },
    }
}
