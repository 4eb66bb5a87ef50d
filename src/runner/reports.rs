//! Reading the machine-readable reports a runner leaves behind.

use crate::analysis::coverage::{CoverageSnapshot, load_coverage};
use crate::analysis::history::{TestRun, parse_report};
use crate::model::AnalysisOutcome;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;

static PYTEST_SUMMARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+) (passed|failed|errors?)\b").expect("static pattern is valid")
});

/// Parse the result report a runner wrote to `path`.
#[must_use]
pub fn read_result_report(path: &Path, root: &Path) -> AnalysisOutcome<Vec<TestRun>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return AnalysisOutcome::Skipped("runner produced no result report".to_string()),
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => parse_report(&value, root),
        Err(err) => AnalysisOutcome::Skipped(format!("result report is not valid JSON: {err}")),
    }
}

/// Coverage reports found in a run's scratch directory.
#[must_use]
pub fn read_coverage(scratch: &Path, root: &Path) -> Option<CoverageSnapshot> {
    let (snapshot, skipped) = load_coverage(root, &[scratch]);
    for item in skipped {
        tracing::warn!(
            report = %item.path,
            reason = %item.reason,
            "Unreadable coverage report from runner"
        );
    }
    snapshot
}

/// Pass/fail counts from pytest's terminal summary (`3 passed, 1 failed in 0.2s`).
///
/// Used only to explain a run whose JSON report is missing.
#[must_use]
pub fn pytest_summary_counts(stdout: &str) -> Option<(usize, usize)> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| line.contains(" in ") && PYTEST_SUMMARY_RE.is_match(line))?;
    let mut passed = 0;
    let mut failed = 0;
    for caps in PYTEST_SUMMARY_RE.captures_iter(line) {
        let count: usize = caps[1].parse().ok()?;
        if &caps[2] == "passed" {
            passed += count;
        } else {
            failed += count;
        }
    }
    Some((passed, failed))
}

/// Last non-empty lines of a stream, for error messages.
#[must_use]
pub fn tail(stream: &str, lines: usize) -> String {
    let kept: Vec<&str> = stream.lines().filter(|line| !line.trim().is_empty()).collect();
    kept[kept.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::history::RunOutcome;
    use tempfile::TempDir;

    #[test]
    fn reads_pytest_report() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("report.json");
        fs::write(
            &path,
            r#"{"created": 1700000000.0, "tests": [
                {"nodeid": "tests/test_a.py::test_one", "outcome": "passed", "call": {"duration": 0.1}},
                {"nodeid": "tests/test_a.py::test_two[x]", "outcome": "failed", "call": {"duration": 0.2}}
            ]}"#,
        )
        .unwrap();
        let runs = read_result_report(&path, temp.path()).ok().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].test_id, "tests/test_a.py::test_two");
        assert_eq!(runs[1].outcome, RunOutcome::Failed);
    }

    #[test]
    fn missing_or_broken_report_is_skipped() {
        let temp = TempDir::new().unwrap();
        assert!(read_result_report(&temp.path().join("none.json"), temp.path()).is_skipped());
        let broken = temp.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(read_result_report(&broken, temp.path()).is_skipped());
    }

    #[test]
    fn summary_line_counts() {
        let stdout = "....F\n=== 4 passed, 1 failed, 2 errors in 0.31s ===\n";
        assert_eq!(pytest_summary_counts(stdout), Some((4, 3)));
        assert_eq!(pytest_summary_counts("no summary here"), None);
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("", 3), "");
    }
}
