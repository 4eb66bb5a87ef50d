//! Command implementations and the summary views they share.

pub mod analyze;
pub mod cleanup;
pub mod completions;
pub mod config;
pub mod document;
pub mod rollback;
pub mod run;
pub mod schema;
pub mod validate;

use crate::config::{CliOverrides, JanitorConfig, load_config};
use crate::error::{JanitorError, Result};
use crate::model::{AnalysisReport, CleanupLog, Ecosystem, ValidationReport};
use crate::output::{OutputContext, SummaryTable};
use crate::util::time::format_duration;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Resolve config for a target that must exist.
pub(crate) fn config_for(target: &Path, overrides: &CliOverrides) -> Result<JanitorConfig> {
    if !target.is_dir() {
        return Err(JanitorError::TargetNotFound {
            path: target.to_path_buf(),
        });
    }
    load_config(target, overrides)
}

/// Read an optional artifact; a missing file is `None`.
pub(crate) fn read_optional<T: DeserializeOwned>(
    path: &Path,
    phase: &'static str,
) -> Result<Option<T>> {
    match crate::util::read_json(path, phase) {
        Ok(value) => Ok(Some(value)),
        Err(JanitorError::ArtifactNotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

pub(crate) fn print_analysis(ctx: &OutputContext, report: &AnalysisReport) {
    let mut table = SummaryTable::new("Analysis");
    let files = |eco: Ecosystem| report.files_by_ecosystem.get(&eco).copied().unwrap_or(0);
    table
        .row("Tests", report.total_tests)
        .row(
            "Files",
            format!(
                "{} pytest, {} vitest",
                files(Ecosystem::Python),
                files(Ecosystem::JavaScript)
            ),
        )
        .row("Obsolete", report.obsolete_tests.len())
        .row("Fragile", report.fragile_tests.len())
        .row("Duplicate groups", report.duplicate_groups.len())
        .row("Valuable", report.valuable_tests.len())
        .row("Rewrite candidates", report.rewrite_candidates.len())
        .row("Coverage", format!("{:.1}%", report.coverage_percentage))
        .row("Historical test time", format_duration(report.total_execution_time));
    if !report.skipped.is_empty() {
        table.row("Skipped inputs", report.skipped.len());
    }
    ctx.table(&table);
}

pub(crate) fn print_cleanup(ctx: &OutputContext, log: &CleanupLog) {
    let title = if log.dry_run { "Cleanup (dry run)" } else { "Cleanup" };
    let mut table = SummaryTable::new(title);
    table
        .row("Removed", log.total_removed)
        .row("Rewritten", log.total_rewritten)
        .row("Merged", log.total_merged)
        .row("Actions", log.actions.len())
        .row("Failed", log.failed_actions().count());
    ctx.table(&table);
    for action in log.failed_actions() {
        ctx.warn(&format!(
            "{}: {}",
            action.test_name,
            action.error.as_deref().unwrap_or("failed")
        ));
    }
}

pub(crate) fn print_validation(ctx: &OutputContext, report: &ValidationReport) {
    let mut table = SummaryTable::new("Validation");
    table
        .row("Result", if report.passed { "passed" } else { "failed" })
        .row("Tests", report.total_tests)
        .row("Failing", report.failed_tests.len())
        .row(
            "Coverage",
            format!(
                "{:.1}% -> {:.1}% ({:+.1})",
                report.coverage.before, report.coverage.after, report.coverage.delta
            ),
        )
        .row(
            "Test time",
            format!(
                "{} -> {} ({:.1}% faster)",
                format_duration(report.performance.before),
                format_duration(report.performance.after),
                report.performance.improvement_percentage
            ),
        )
        .row("Flaky", report.flaky_tests.len());
    ctx.table(&table);
    for recommendation in &report.recommendations {
        ctx.note(recommendation);
    }
}
