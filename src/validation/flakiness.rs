//! Repeated-execution flakiness probe.
//!
//! Each (test, iteration) pair is an independent `run_single` call on a
//! bounded rayon pool. Results are collected first and tallied afterwards,
//! so no tally is shared between workers.

use crate::analysis::history::RunOutcome;
use crate::error::{JanitorError, Result};
use crate::runner::{TestExecutor, ecosystem_of};
use crate::util::progress::ProgressTracker;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Pass/fail tally for one probed test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    /// Iterations where the runner did not report the test at all.
    pub missing: usize,
}

impl Tally {
    #[must_use]
    pub const fn observed(&self) -> usize {
        self.passed + self.failed
    }

    /// Pass rate over observed iterations; `None` if none were observed.
    #[must_use]
    pub fn pass_rate(&self) -> Option<f64> {
        let observed = self.observed();
        (observed > 0).then(|| self.passed as f64 / observed as f64)
    }
}

/// Flaky means sometimes passing, but not often enough.
///
/// Tests that always fail are failing, not flaky.
#[must_use]
pub fn is_flaky(pass_rate: f64, stability_threshold: f64) -> bool {
    pass_rate > 0.0 && pass_rate < stability_threshold
}

/// Outcome of a probe over a set of tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlakinessResult {
    pub tallies: BTreeMap<String, Tally>,
    pub pass_rates: BTreeMap<String, f64>,
    pub flaky: Vec<String>,
    /// Tests the probe could not observe, with the reason.
    pub errors: Vec<String>,
}

/// Bounded-parallel repeated runner.
pub struct FlakinessProbe<'a> {
    executor: &'a dyn TestExecutor,
    iterations: usize,
    stability_threshold: f64,
    workers: usize,
}

impl<'a> FlakinessProbe<'a> {
    #[must_use]
    pub fn new(
        executor: &'a dyn TestExecutor,
        iterations: usize,
        stability_threshold: f64,
        workers: usize,
    ) -> Self {
        Self {
            executor,
            iterations,
            stability_threshold,
            workers: workers.max(1),
        }
    }

    /// Run every target `iterations` times and classify it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` if the worker pool cannot be built.
    pub fn probe(&self, targets: &[String], progress: &ProgressTracker) -> Result<FlakinessResult> {
        let mut result = FlakinessResult::default();
        if targets.is_empty() || self.iterations == 0 {
            return Ok(result);
        }

        let mut work = Vec::with_capacity(targets.len() * self.iterations);
        for target in targets {
            match ecosystem_of(target) {
                Some(ecosystem) => {
                    work.extend((0..self.iterations).map(|_| (target.as_str(), ecosystem)));
                }
                None => result
                    .errors
                    .push(format!("{target}: not a recognized test file")),
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|err| JanitorError::ValidationFailed {
                reason: format!("cannot build flakiness worker pool: {err}"),
            })?;
        tracing::info!(
            tests = targets.len(),
            iterations = self.iterations,
            workers = self.workers,
            "Probing for flaky tests"
        );

        let observations: Vec<(&str, Option<RunOutcome>)> = pool.install(|| {
            work.par_iter()
                .map(|(target, ecosystem)| {
                    let run = self.executor.run_single(*ecosystem, target);
                    progress.inc(1);
                    (*target, run.outcome_of(target))
                })
                .collect()
        });

        for (target, outcome) in observations {
            let tally = result.tallies.entry(target.to_string()).or_default();
            match outcome {
                Some(RunOutcome::Passed) => tally.passed += 1,
                Some(RunOutcome::Failed) => tally.failed += 1,
                Some(RunOutcome::NotRun) | None => tally.missing += 1,
            }
        }

        for (target, tally) in &result.tallies {
            let Some(rate) = tally.pass_rate() else {
                result
                    .errors
                    .push(format!("{target}: never reported in {} runs", tally.missing));
                continue;
            };
            result.pass_rates.insert(target.clone(), rate);
            if is_flaky(rate, self.stability_threshold) {
                tracing::warn!(test = %target, pass_rate = rate, "Flaky test");
                result.flaky.push(target.clone());
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::history::TestRun;
    use crate::model::Ecosystem;
    use crate::runner::{SuiteResult, runner_id};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Replays a fixed outcome sequence per test.
    struct Scripted {
        scripts: Mutex<HashMap<String, Vec<RunOutcome>>>,
    }

    impl Scripted {
        fn new(scripts: &[(&str, &[RunOutcome])]) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .iter()
                        .map(|(id, seq)| ((*id).to_string(), seq.to_vec()))
                        .collect(),
                ),
            }
        }
    }

    impl TestExecutor for Scripted {
        fn run_suite(&self, _ecosystem: Ecosystem, _files: &[PathBuf]) -> SuiteResult {
            SuiteResult::default()
        }

        fn run_single(&self, ecosystem: Ecosystem, test_id: &str) -> SuiteResult {
            // Real runners report the id without the duplicate suffix.
            let test_id = runner_id(test_id);
            let outcome = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(test_id)
                .and_then(|seq| seq.pop());
            SuiteResult {
                ecosystem: Some(ecosystem),
                exit_code: Some(0),
                runs: outcome
                    .map(|outcome| TestRun {
                        test_id: test_id.to_string(),
                        file_path: String::new(),
                        outcome,
                        duration: 0.01,
                        timestamp: None,
                    })
                    .into_iter()
                    .collect(),
                ..SuiteResult::default()
            }
        }
    }

    use RunOutcome::{Failed, Passed};

    #[test]
    fn flaky_bounds() {
        assert!(is_flaky(0.5, 0.95));
        assert!(!is_flaky(0.0, 0.95));
        assert!(!is_flaky(0.95, 0.95));
        assert!(!is_flaky(1.0, 0.95));
    }

    #[test]
    fn probe_classifies_tests() {
        let executor = Scripted::new(&[
            ("t/test_a.py::test_steady", &[Passed, Passed, Passed, Passed]),
            ("t/test_a.py::test_wobbly", &[Passed, Failed, Passed, Passed]),
            ("t/test_a.py::test_broken", &[Failed, Failed, Failed, Failed]),
        ]);
        let probe = FlakinessProbe::new(&executor, 4, 0.95, 3);
        let targets: Vec<String> = [
            "t/test_a.py::test_steady",
            "t/test_a.py::test_wobbly",
            "t/test_a.py::test_broken",
            "notes.txt::x",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        let result = probe.probe(&targets, &ProgressTracker::hidden()).unwrap();
        assert_eq!(result.flaky, vec!["t/test_a.py::test_wobbly".to_string()]);
        assert!((result.pass_rates["t/test_a.py::test_wobbly"] - 0.75).abs() < 1e-12);
        assert!(result.pass_rates["t/test_a.py::test_broken"].abs() < f64::EPSILON);
        assert_eq!(result.tallies["t/test_a.py::test_steady"].passed, 4);
        assert_eq!(result.errors, vec!["notes.txt::x: not a recognized test file".to_string()]);
    }

    #[test]
    fn unreported_test_is_an_error_not_flaky() {
        let executor = Scripted::new(&[]);
        let probe = FlakinessProbe::new(&executor, 2, 0.95, 1);
        let result = probe
            .probe(&["t/test_b.py::test_gone".to_string()], &ProgressTracker::hidden())
            .unwrap();
        assert!(result.flaky.is_empty());
        assert_eq!(
            result.errors,
            vec!["t/test_b.py::test_gone: never reported in 2 runs".to_string()]
        );
    }

    #[test]
    fn duplicate_suffixed_targets_are_observed() {
        let executor = Scripted::new(&[("t/test_c.py::test_dup", &[Passed, Failed, Passed])]);
        let probe = FlakinessProbe::new(&executor, 3, 0.95, 1);
        let result = probe
            .probe(&["t/test_c.py::test_dup#2".to_string()], &ProgressTracker::hidden())
            .unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.tallies["t/test_c.py::test_dup#2"].missing, 0);
        assert_eq!(result.flaky, vec!["t/test_c.py::test_dup#2".to_string()]);
    }
}
