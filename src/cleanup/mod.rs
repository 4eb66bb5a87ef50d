//! Cleanup engine.
//!
//! Cleanup is split into planning and applying. Each step (removal, fragile
//! bookkeeping, consolidation, rewrite annotation, fixture extraction) adds
//! actions and file edits to one [`CleanupPlan`]. Applying writes each file
//! once, then records every action in the orchestrator-owned [`CleanupLog`]
//! with its success or failure. A dry run records the same actions, tagged,
//! and touches nothing.

pub mod consolidation;
pub mod edits;
pub mod fixtures;
pub mod removal;
pub mod rewrite;

use crate::analysis::Analysis;
use crate::config::JanitorConfig;
use crate::error::{JanitorError, Result};
use crate::model::{ActionType, CleanupAction, CleanupLog, DRY_RUN_TAG};
use crate::output::Reporter;
use edits::EditSet;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Inputs shared by every cleanup step.
pub struct CleanupContext<'a> {
    pub config: &'a JanitorConfig,
    pub dry_run: bool,
    pub reporter: &'a dyn Reporter,
}

/// An action plus the files whose edits it depends on.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub action: CleanupAction,
    pub files: Vec<PathBuf>,
}

/// Accumulated actions and edits.
#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    pub actions: Vec<PlannedAction>,
    pub edits: EditSet,
    /// Tests whose source span goes away (removed or merged).
    pub removed_tests: BTreeSet<String>,
}

impl CleanupPlan {
    pub fn push(&mut self, action: CleanupAction, files: Vec<PathBuf>) {
        self.actions.push(PlannedAction { action, files });
    }

    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|planned| planned.action.action_type == action_type)
            .count()
    }
}

/// Seam for the cleanup phase.
///
/// Implementations append to the log they are given so the caller keeps
/// every recorded action even when cleanup fails part way.
pub trait Cleaner: Send + Sync {
    /// # Errors
    ///
    /// Returns `CleanupFailed` when the phase must be rolled back.
    fn clean(
        &self,
        analysis: &Analysis,
        ctx: &CleanupContext<'_>,
        log: &mut CleanupLog,
    ) -> Result<()>;
}

/// The built-in cleaner running every step.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCleaner;

impl Cleaner for StandardCleaner {
    fn clean(
        &self,
        analysis: &Analysis,
        ctx: &CleanupContext<'_>,
        log: &mut CleanupLog,
    ) -> Result<()> {
        let plan = build_plan(analysis, ctx);
        apply_plan(plan, ctx, log)
    }
}

/// Plan every step in log order.
#[must_use]
pub fn build_plan(analysis: &Analysis, ctx: &CleanupContext<'_>) -> CleanupPlan {
    let mut plan = CleanupPlan::default();
    removal::plan(analysis, &mut plan);
    plan_fragile(analysis, &mut plan);
    consolidation::plan(analysis, &mut plan);
    rewrite::plan(analysis, &mut plan);
    fixtures::plan(analysis, ctx.config.cleanup.min_fixture_frequency, &mut plan);
    tracing::debug!(
        actions = plan.actions.len(),
        files = plan.edits.paths().count(),
        "Cleanup plan built"
    );
    plan
}

/// One `keep` per fragile test carrying its measured rate.
fn plan_fragile(analysis: &Analysis, plan: &mut CleanupPlan) {
    for metrics in &analysis.report.fragile_tests {
        let reason = format!(
            "fragile: failure rate {:.1}% over {} runs; flagged for rewrite",
            metrics.failure_rate * 100.0,
            metrics.total_runs
        );
        plan.push(
            CleanupAction::new(ActionType::Keep, &metrics.test_name, reason)
                .with_before(Some(metrics.clone())),
            Vec::new(),
        );
    }
}

/// Apply a plan and record its actions.
///
/// # Errors
///
/// With `cleanup.abort-on-error`, the first failed file aborts the phase
/// with `CleanupFailed`. Otherwise failures are only logged.
pub fn apply_plan(plan: CleanupPlan, ctx: &CleanupContext<'_>, log: &mut CleanupLog) -> Result<()> {
    ctx.reporter.phase_started("cleanup");

    if ctx.dry_run {
        for planned in plan.actions {
            let mut action = planned.action;
            action.reason = format!("{DRY_RUN_TAG}{}", action.reason);
            log.record(action);
        }
        let summary = summarize(log);
        ctx.reporter.phase_finished("cleanup", &format!("{DRY_RUN_TAG}{summary}"));
        return Ok(());
    }

    let paths: Vec<PathBuf> = plan.edits.paths().map(PathBuf::from).collect();
    let progress = ctx.reporter.progress(paths.len() as u64, "Applying cleanup");
    let mut failures: BTreeMap<PathBuf, String> = BTreeMap::new();
    let mut applied: BTreeSet<PathBuf> = BTreeSet::new();
    let mut aborted: Option<String> = None;

    for path in &paths {
        progress.set_message(path.display().to_string());
        match plan.edits.apply(path) {
            Ok(()) => {
                applied.insert(path.clone());
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "Cleanup edit failed");
                ctx.reporter.warning(&format!("{}: {err}", path.display()));
                failures.insert(path.clone(), err.to_string());
                if ctx.config.cleanup.abort_on_error {
                    aborted = Some(format!("{}: {err}", path.display()));
                    break;
                }
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    for planned in plan.actions {
        let error = planned.files.iter().find_map(|file| {
            failures.get(file).cloned().or_else(|| {
                (!applied.contains(file)).then(|| "not applied: cleanup aborted".to_string())
            })
        });
        let action = match error {
            Some(error) => planned.action.failed(error),
            None => planned.action,
        };
        log.record(action);
    }

    let summary = summarize(log);
    if let Some(reason) = aborted {
        return Err(JanitorError::CleanupFailed { reason });
    }
    ctx.reporter.phase_finished("cleanup", &summary);
    Ok(())
}

fn summarize(log: &CleanupLog) -> String {
    format!(
        "{} removed, {} rewritten, {} merged, {} failed",
        log.total_removed,
        log.total_rewritten,
        log.total_merged,
        log.failed_actions().count()
    )
}
