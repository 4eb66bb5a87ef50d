//! Historical execution reports and failure-rate metrics.
//!
//! Accepted report shapes:
//! - pytest-json-report: `{ "created", "tests": [{ "nodeid", "outcome", "call" }] }`,
//!   where `call` carries the `duration`
//! - Vitest/Jest JSON: `{ "startTime", "testResults": [{ "name", "assertionResults": [...] }] }`
//! - Plain map: `{ "<id>": { "outcome", "duration", "timestamp" } }`

use crate::model::{AnalysisOutcome, SkippedItem, TestMetrics};
use crate::util::relative_display;
use crate::util::time::parse_report_timestamp;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of one observed test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Passed,
    Failed,
    /// Skipped, pending or todo: not a run.
    NotRun,
}

impl RunOutcome {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "passed" | "pass" | "xpassed" => Some(Self::Passed),
            "failed" | "fail" | "error" | "errored" => Some(Self::Failed),
            "skipped" | "skip" | "pending" | "todo" | "xfailed" | "disabled" => Some(Self::NotRun),
            _ => None,
        }
    }
}

/// One test execution parsed from a report.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    pub test_id: String,
    pub file_path: String,
    pub outcome: RunOutcome,
    /// Seconds.
    pub duration: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Strip a pytest parametrization suffix: `test_x[a-1]` -> `test_x`.
#[must_use]
pub fn normalize_test_id(id: &str) -> String {
    let id = id.trim();
    if id.ends_with(']') {
        if let Some(open) = id.rfind('[') {
            return id[..open].to_string();
        }
    }
    id.to_string()
}

fn file_of(id: &str) -> String {
    id.split("::").next().unwrap_or(id).to_string()
}

/// Parse any supported report shape into runs.
///
/// `root` relativizes absolute file paths found in Vitest reports.
#[must_use]
pub fn parse_report(value: &Value, root: &Path) -> AnalysisOutcome<Vec<TestRun>> {
    if let Some(tests) = value.get("tests").and_then(Value::as_array) {
        return AnalysisOutcome::Ok(parse_pytest(value, tests));
    }
    if let Some(results) = value.get("testResults").and_then(Value::as_array) {
        return AnalysisOutcome::Ok(parse_vitest(value, results, root));
    }
    if let Some(map) = value.as_object() {
        let looks_plain = !map.is_empty()
            && map
                .values()
                .all(|entry| entry.get("outcome").and_then(Value::as_str).is_some());
        if looks_plain {
            return AnalysisOutcome::Ok(parse_plain(map));
        }
    }
    AnalysisOutcome::Skipped("unrecognized report format".to_string())
}

fn parse_pytest(report: &Value, tests: &[Value]) -> Vec<TestRun> {
    let timestamp = report.get("created").and_then(parse_report_timestamp);
    tests
        .iter()
        .filter_map(|test| {
            let id = normalize_test_id(test.get("nodeid")?.as_str()?);
            let outcome = RunOutcome::parse(test.get("outcome")?.as_str()?)?;
            let duration = test
                .get("duration")
                .and_then(Value::as_f64)
                .or_else(|| {
                    let stages = ["setup", "call", "teardown"]
                        .iter()
                        .filter_map(|stage| test.get(stage)?.get("duration")?.as_f64())
                        .collect::<Vec<_>>();
                    (!stages.is_empty()).then(|| stages.iter().sum())
                })
                .unwrap_or(0.0);
            Some(TestRun {
                file_path: file_of(&id),
                test_id: id,
                outcome,
                duration,
                timestamp,
            })
        })
        .collect()
}

fn parse_vitest(report: &Value, results: &[Value], root: &Path) -> Vec<TestRun> {
    let timestamp = report.get("startTime").and_then(parse_report_timestamp);
    let mut runs = Vec::new();
    for file in results {
        let Some(name) = file.get("name").and_then(Value::as_str) else {
            continue;
        };
        let file_path = relative_display(root, Path::new(name));
        let Some(assertions) = file.get("assertionResults").and_then(Value::as_array) else {
            continue;
        };
        for assertion in assertions {
            let Some(outcome) = assertion
                .get("status")
                .and_then(Value::as_str)
                .and_then(RunOutcome::parse)
            else {
                continue;
            };
            let full_name = assertion
                .get("fullName")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| {
                    let mut parts: Vec<String> = assertion
                        .get("ancestorTitles")
                        .and_then(Value::as_array)
                        .map(|titles| {
                            titles
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    parts.push(assertion.get("title")?.as_str()?.to_string());
                    Some(parts.join(" "))
                });
            let Some(full_name) = full_name else {
                continue;
            };
            let duration_ms = assertion
                .get("duration")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            runs.push(TestRun {
                test_id: format!("{file_path}::{}", full_name.trim()),
                file_path: file_path.clone(),
                outcome,
                duration: duration_ms / 1000.0,
                timestamp,
            });
        }
    }
    runs
}

fn parse_plain(map: &serde_json::Map<String, Value>) -> Vec<TestRun> {
    map.iter()
        .filter_map(|(id, entry)| {
            let outcome = RunOutcome::parse(entry.get("outcome")?.as_str()?)?;
            let id = normalize_test_id(id);
            Some(TestRun {
                file_path: file_of(&id),
                test_id: id,
                outcome,
                duration: entry.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
                timestamp: entry.get("timestamp").and_then(parse_report_timestamp),
            })
        })
        .collect()
}

/// Fold runs into per-test metrics keyed by test id.
#[must_use]
pub fn aggregate<I: IntoIterator<Item = TestRun>>(runs: I) -> BTreeMap<String, TestMetrics> {
    #[derive(Default)]
    struct Tally {
        file: String,
        runs: usize,
        failures: usize,
        duration: f64,
        last_run: Option<DateTime<Utc>>,
    }

    let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
    for run in runs {
        let tally = tallies.entry(run.test_id).or_default();
        if tally.file.is_empty() {
            tally.file = run.file_path;
        }
        match run.outcome {
            RunOutcome::NotRun => continue,
            RunOutcome::Passed => tally.runs += 1,
            RunOutcome::Failed => {
                tally.runs += 1;
                tally.failures += 1;
            }
        }
        tally.duration += run.duration;
        tally.last_run = tally.last_run.max(run.timestamp);
    }

    tallies
        .into_iter()
        .map(|(id, tally)| {
            let mut metrics = TestMetrics::from_tallies(
                &id,
                tally.file,
                tally.runs,
                tally.failures,
                tally.duration,
            );
            metrics.last_run = tally.last_run;
            (id, metrics)
        })
        .collect()
}

/// Aggregated history for one target.
#[derive(Debug, Clone, Default)]
pub struct HistoryData {
    pub metrics: BTreeMap<String, TestMetrics>,
    pub reports: usize,
    pub skipped: Vec<SkippedItem>,
}

impl HistoryData {
    #[must_use]
    pub fn get(&self, test_id: &str) -> Option<&TestMetrics> {
        self.metrics.get(test_id)
    }
}

/// Loads every JSON report under a history directory.
#[derive(Debug, Clone)]
pub struct HistoryAnalyzer {
    root: PathBuf,
    dir: PathBuf,
}

impl HistoryAnalyzer {
    #[must_use]
    pub fn new(root: &Path, dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: dir.to_path_buf(),
        }
    }

    /// Parse all reports. A missing directory is empty history.
    #[must_use]
    pub fn load(&self) -> HistoryData {
        let mut data = HistoryData::default();
        if !self.dir.is_dir() {
            tracing::debug!(dir = %self.dir.display(), "No history directory");
            return data;
        }

        let mut runs = Vec::new();
        let reports = WalkDir::new(&self.dir)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"));

        for entry in reports {
            let path = entry.path();
            let shown = relative_display(&self.root, path);
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
            let value = match parsed {
                Ok(value) => value,
                Err(reason) => {
                    tracing::warn!(report = %shown, %reason, "Skipping malformed history report");
                    data.skipped.push(SkippedItem { path: shown, reason });
                    continue;
                }
            };
            match parse_report(&value, &self.root) {
                AnalysisOutcome::Ok(mut report_runs) => {
                    data.reports += 1;
                    runs.append(&mut report_runs);
                }
                AnalysisOutcome::Skipped(reason) => {
                    tracing::debug!(report = %shown, %reason, "Ignoring JSON file in history");
                    data.skipped.push(SkippedItem { path: shown, reason });
                }
            }
        }

        data.metrics = aggregate(runs);
        tracing::info!(
            reports = data.reports,
            tests = data.metrics.len(),
            "Loaded execution history"
        );
        data
    }
}
