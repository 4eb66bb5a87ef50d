//! `CLEANUP_REPORT.md`: before/after metrics and the full action record.

use super::{DocInputs, MarkdownTable, bullet_list};
use crate::model::{ActionType, CleanupAction, CleanupLog, DRY_RUN_TAG, ValidationReport};
use crate::util::time::format_duration;

fn percent(value: f64) -> String {
    format!("{value:.1}%")
}

fn metrics_table(inputs: &DocInputs<'_>) -> String {
    let analysis = inputs.analysis;
    let validation = inputs.validation;
    let after = |f: &dyn Fn(&ValidationReport) -> String| {
        validation.map_or_else(|| "n/a".to_string(), f)
    };

    let mut table = MarkdownTable::new(["Metric", "Before", "After"]);
    table
        .row([
            "Tests".to_string(),
            analysis.total_tests.to_string(),
            after(&|v| v.total_tests.to_string()),
        ])
        .row([
            "Coverage".to_string(),
            validation.map_or_else(
                || percent(analysis.coverage_percentage),
                |v| percent(v.coverage.before),
            ),
            after(&|v| percent(v.coverage.after)),
        ])
        .row([
            "Execution time".to_string(),
            validation.map_or_else(
                || format_duration(analysis.total_execution_time),
                |v| format_duration(v.performance.before),
            ),
            after(&|v| format_duration(v.performance.after)),
        ])
        .row([
            "Fragile tests".to_string(),
            analysis.fragile_tests.len().to_string(),
            after(&|v| format!("{} flaky", v.flaky_tests.len())),
        ])
        .row([
            "Duplicate groups".to_string(),
            analysis.duplicate_groups.len().to_string(),
            inputs
                .cleanup
                .map_or_else(|| "n/a".to_string(), |log| format!("{} merged", log.total_merged)),
        ]);

    let mut out = String::from("## Before and after\n\n");
    out.push_str(&table.render());
    if let Some(v) = validation {
        out.push_str(&format!(
            "\nCoverage delta: {:+.1} points. Execution time improvement: {:.1}%.\n",
            v.coverage.delta, v.performance.improvement_percentage
        ));
    }
    out
}

fn breakdown(log: &CleanupLog) -> String {
    let mut table = MarkdownTable::new(["Action", "Succeeded", "Failed"]);
    for action_type in [
        ActionType::Remove,
        ActionType::Rewrite,
        ActionType::Merge,
        ActionType::Keep,
    ] {
        let (ok, failed) = log
            .actions_of(action_type)
            .fold((0, 0), |(ok, failed), action| {
                if action.succeeded { (ok + 1, failed) } else { (ok, failed + 1) }
            });
        table.row([action_type.as_str().to_string(), ok.to_string(), failed.to_string()]);
    }
    let mut out = String::from("## Actions\n\n");
    out.push_str(&table.render());
    if let Some(secs) = log.duration_secs() {
        out.push_str(&format!("\nCleanup took {}.\n", format_duration(secs)));
    }
    out
}

fn action_line(action: &CleanupAction) -> String {
    let reason = action.reason.strip_prefix(DRY_RUN_TAG).unwrap_or(&action.reason);
    let mut line = format!("`{}`: {reason}", action.test_name);
    if let Some(error) = &action.error {
        line.push_str(&format!(" (FAILED: {error})"));
    }
    line
}

fn listing(log: &CleanupLog, action_type: ActionType, title: &str, empty: &str) -> String {
    let mut out = format!("### {title}\n\n");
    out.push_str(&bullet_list(log.actions_of(action_type).map(action_line), empty));
    out.push('\n');
    out
}

fn cleanup_section(inputs: &DocInputs<'_>) -> String {
    let Some(log) = inputs.cleanup else {
        return "## Actions\n\n_Cleanup did not run._\n".to_string();
    };
    let mut out = String::new();
    if log.dry_run {
        out.push_str("> Dry run: the actions below were planned but no file was changed.\n\n");
    }
    out.push_str(&breakdown(log));
    out.push('\n');
    out.push_str(&listing(log, ActionType::Remove, "Removed", "Nothing removed."));
    out.push_str(&listing(log, ActionType::Rewrite, "Rewritten", "Nothing rewritten."));
    out.push_str(&listing(log, ActionType::Merge, "Merged", "Nothing merged."));
    out.push_str(&listing(log, ActionType::Keep, "Kept", "Nothing kept for follow-up."));
    out
}

fn validation_section(inputs: &DocInputs<'_>) -> String {
    let Some(v) = inputs.validation else {
        return "## Validation\n\n_Validation did not run._\n".to_string();
    };
    let verdict = if v.passed { "PASSED" } else { "FAILED" };
    let mut out = format!("## Validation\n\n**{verdict}**: {} tests executed", v.total_tests);
    out.push_str(if v.all_tests_passing {
        ", all passing.\n\n"
    } else {
        ", with failures.\n\n"
    });
    if !v.failed_tests.is_empty() {
        out.push_str("Failing tests:\n\n");
        out.push_str(&bullet_list(v.failed_tests.iter().map(|t| format!("`{t}`")), ""));
        out.push('\n');
    }
    if !v.pass_rates.is_empty() {
        let mut table = MarkdownTable::new(["Probed test", "Pass rate", "Flaky"]);
        for (test, rate) in &v.pass_rates {
            let flaky = if v.flaky_tests.contains(test) { "yes" } else { "no" };
            table.row([test.clone(), percent(rate * 100.0), flaky.to_string()]);
        }
        out.push_str(&table.render());
        out.push('\n');
    }
    if !v.coverage.lost_lines.is_empty() {
        out.push_str(&format!("{} line(s) lost coverage.\n\n", v.coverage.lost_lines.len()));
    }
    out
}

/// Recommendations from validation plus advisory findings from analysis.
#[must_use]
pub fn recommendations(inputs: &DocInputs<'_>) -> Vec<String> {
    let mut out: Vec<String> = inputs
        .validation
        .map(|v| v.recommendations.clone())
        .unwrap_or_default();
    let analysis = inputs.analysis;
    let redundant: Vec<_> = analysis.coverage_overlaps.iter().filter(|o| o.redundant).collect();
    if !redundant.is_empty() {
        out.push(format!(
            "Review {} test(s) whose coverage is contained in another test's, e.g. `{}` within `{}`",
            redundant.len(),
            redundant[0].test_a,
            redundant[0].test_b
        ));
    }
    if !analysis.skipped.is_empty() {
        out.push(format!(
            "{} file(s) or report(s) could not be analyzed; see `skipped` in analysis_report.json",
            analysis.skipped.len()
        ));
    }
    if let Some(log) = inputs.cleanup {
        let failed = log.failed_actions().count();
        if failed > 0 {
            out.push(format!("Retry or apply by hand {failed} failed cleanup action(s)"));
        }
    }
    out
}

/// Render the cleanup report.
#[must_use]
pub fn render(inputs: &DocInputs<'_>) -> String {
    let mut out = String::from("# Cleanup Report\n\n");
    out.push_str(&format!(
        "Target: `{}`. Analyzed {}.\n\n",
        inputs.analysis.target,
        inputs.analysis.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    for section in [
        metrics_table(inputs),
        cleanup_section(inputs),
        validation_section(inputs),
    ] {
        out.push_str(&section);
        out.push('\n');
    }
    out.push_str("## Recommendations\n\n");
    out.push_str(&bullet_list(recommendations(inputs), "No action needed."));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JanitorConfig;
    use crate::model::{AnalysisReport, CoverageComparison, PerformanceComparison};
    use crate::validation::recommendations as validation_recommendations;
    use chrono::Utc;
    use std::path::Path;

    fn validation(before: f64, after: f64) -> ValidationReport {
        let mut report = ValidationReport {
            generated_at: Utc::now(),
            all_tests_passing: true,
            coverage: CoverageComparison::new(before, after, vec!["app.py:7".into()]),
            performance: PerformanceComparison::new(2.0, 1.5),
            flaky_tests: vec![],
            total_tests: 8,
            failed_tests: vec![],
            pass_rates: Default::default(),
            runner_errors: vec![],
            recommendations: vec![],
            passed: false,
        };
        report.recommendations = validation_recommendations(&report);
        report
    }

    #[test]
    fn coverage_drop_recommends_restoring_coverage() {
        let config = JanitorConfig::defaults_for(Path::new("/repo"));
        let mut analysis = AnalysisReport::empty("/repo");
        analysis.total_tests = 10;
        let validation = validation(85.0, 80.0);
        let mut log = CleanupLog::new(false);
        log.record(CleanupAction::new(
            ActionType::Remove,
            "t.py::test_old",
            "obsolete: deprecation marker 'legacy' at line 3",
        ));
        log.record(
            CleanupAction::new(ActionType::Merge, "a.py::test_x", "merged 2 tests")
                .failed("permission denied"),
        );
        log.finish();

        let inputs = DocInputs {
            config: &config,
            analysis: &analysis,
            cleanup: Some(&log),
            validation: Some(&validation),
        };
        let doc = render(&inputs);
        let table = doc.split("## Before and after\n\n").nth(1).unwrap();
        let table = table.split("\nCoverage delta").next().unwrap();
        insta::assert_snapshot!(table, @r"
        | Metric           | Before | After    |
        | ---------------- | ------ | -------- |
        | Tests            | 10     | 8        |
        | Coverage         | 85.0%  | 80.0%    |
        | Execution time   | 2.00s  | 1.50s    |
        | Fragile tests    | 0      | 0 flaky  |
        | Duplicate groups | 0      | 0 merged |
        ");
        assert!(doc.contains("Coverage delta: -5.0 points."));
        assert!(doc.contains("**FAILED**: 8 tests executed, all passing."));
        assert!(
            doc.contains("- `t.py::test_old`: obsolete: deprecation marker 'legacy' at line 3\n")
        );
        assert!(doc.contains("(FAILED: permission denied)"));
        let recs = doc.split("## Recommendations\n\n").nth(1).unwrap();
        assert!(recs.contains("restore coverage"));
        assert!(recs.contains("app.py:7"));
        assert!(recs.contains("Retry or apply by hand 1 failed cleanup action(s)"));
    }

    #[test]
    fn dry_run_report_strips_tag_and_says_so() {
        let config = JanitorConfig::defaults_for(Path::new("/repo"));
        let analysis = AnalysisReport::empty("/repo");
        let mut log = CleanupLog::new(true);
        log.record(CleanupAction::new(
            ActionType::Keep,
            "f.py::test_flaky",
            format!("{DRY_RUN_TAG}fragile: failure rate 8.0%"),
        ));
        let inputs = DocInputs {
            config: &config,
            analysis: &analysis,
            cleanup: Some(&log),
            validation: None,
        };
        let doc = render(&inputs);
        assert!(doc.contains("> Dry run:"));
        assert!(doc.contains("- `f.py::test_flaky`: fragile: failure rate 8.0%\n"));
        assert!(doc.contains("_Validation did not run._"));
        assert!(doc.ends_with("## Recommendations\n\n_No action needed._\n"));
    }
}
