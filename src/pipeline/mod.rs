//! End-to-end orchestration: analysis, backup, cleanup, validation, docs.
//!
//! ```text
//! Idle -> Analyzing -> [BackupCreated] -> Cleaning -> Validating -> Documenting -> Done
//!                                             \            /
//!                                              ErrorRollback
//! ```
//!
//! Phases run strictly in sequence. Analysis failure stops before anything is
//! touched. Cleanup or validation failure restores the backup and reports
//! the original error. Documentation failure is reported but never rolls
//! back. Every artifact produced so far is persisted to the output
//! directory, including after a rollback.

use crate::analysis::{Analysis, analyze};
use crate::backup::BackupManager;
use crate::cleanup::{Cleaner, CleanupContext};
use crate::config::JanitorConfig;
use crate::docs::{self, DocInputs};
use crate::error::{JanitorError, Result};
use crate::model::{ActionType, AnalysisReport, CleanupLog, ValidationReport};
use crate::output::Reporter;
use crate::runner::TestExecutor;
use crate::util::write_json;
use crate::validation::Validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ANALYSIS_FILE: &str = "analysis_report.json";
pub const CLEANUP_LOG_FILE: &str = "cleanup_log.json";
pub const VALIDATION_FILE: &str = "validation_report.json";
pub const SUMMARY_FILE: &str = "pipeline_summary.json";

/// Where the pipeline is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Analyzing,
    BackupCreated,
    Cleaning,
    Validating,
    Documenting,
    Done,
    ErrorRollback,
}

impl PipelineState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::BackupCreated => "backup_created",
            Self::Cleaning => "cleaning",
            Self::Validating => "validating",
            Self::Documenting => "documenting",
            Self::Done => "done",
            Self::ErrorRollback => "error_rollback",
        }
    }

    /// Legal forward transitions. Skipped phases jump ahead.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use PipelineState::{
            Analyzing, BackupCreated, Cleaning, Documenting, Done, ErrorRollback, Idle, Validating,
        };
        matches!(
            (self, next),
            (Idle, Analyzing)
                | (Analyzing, BackupCreated | Cleaning | Validating | Documenting | Done)
                | (BackupCreated, Cleaning)
                | (Cleaning, Validating | Documenting | Done | ErrorRollback)
                | (Validating, Documenting | Done | ErrorRollback)
                | (Documenting, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which phases to run and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub dry_run: bool,
    pub skip_cleanup: bool,
    pub skip_validation: bool,
    pub skip_docs: bool,
    /// Re-run surviving fragile tests to detect flakiness.
    pub flaky_check: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_cleanup: false,
            skip_validation: false,
            skip_docs: false,
            flaky_check: true,
        }
    }
}

/// Everything a run produced, persisted as `pipeline_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub dry_run: bool,
    pub analysis: Option<AnalysisReport>,
    pub cleanup: Option<CleanupLog>,
    pub validation: Option<ValidationReport>,
    pub backup_created: bool,
    pub backup_path: Option<PathBuf>,
    pub cleanup_applied: bool,
    pub rolled_back: bool,
    /// Generated Markdown documents.
    pub docs: Vec<PathBuf>,
    /// Persisted JSON artifacts.
    pub artifacts: Vec<PathBuf>,
    pub error: Option<String>,
}

impl PipelineOutcome {
    fn new(dry_run: bool) -> Self {
        Self {
            state: PipelineState::Idle,
            dry_run,
            analysis: None,
            cleanup: None,
            validation: None,
            backup_created: false,
            backup_path: None,
            cleanup_applied: false,
            rolled_back: false,
            docs: Vec::new(),
            artifacts: Vec::new(),
            error: None,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        tracing::debug!(from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome plus the error that stopped the run, if any.
#[derive(Debug)]
pub struct PipelineRun {
    pub outcome: PipelineOutcome,
    pub error: Option<JanitorError>,
}

impl PipelineRun {
    /// # Errors
    ///
    /// Returns the error that stopped the run.
    pub fn into_result(self) -> Result<PipelineOutcome> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.outcome),
        }
    }
}

/// Sequences the phases for one target.
pub struct Pipeline<'a> {
    config: &'a JanitorConfig,
    options: PipelineOptions,
    reporter: &'a dyn Reporter,
    cleaner: &'a dyn Cleaner,
    executor: &'a dyn TestExecutor,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        config: &'a JanitorConfig,
        options: PipelineOptions,
        reporter: &'a dyn Reporter,
        cleaner: &'a dyn Cleaner,
        executor: &'a dyn TestExecutor,
    ) -> Self {
        Self {
            config,
            options,
            reporter,
            cleaner,
            executor,
        }
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }

    fn persist<T: Serialize>(&self, outcome: &mut PipelineOutcome, name: &str, value: &T) {
        let path = self.artifact(name);
        match write_json(&path, value) {
            Ok(()) => outcome.artifacts.push(path),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Could not persist artifact");
                self.reporter
                    .warning(&format!("could not write {}: {err}", path.display()));
            }
        }
    }

    /// Run every enabled phase. Never panics on phase failure; the error is
    /// returned alongside whatever was produced.
    #[must_use]
    pub fn run(&self) -> PipelineRun {
        let mut outcome = PipelineOutcome::new(self.options.dry_run);
        let error = self.execute(&mut outcome).err();
        if let Some(err) = &error {
            outcome.error = Some(err.to_string());
            tracing::error!(state = %outcome.state, error = %err, "Pipeline stopped");
        }
        let summary = self.artifact(SUMMARY_FILE);
        outcome.artifacts.push(summary.clone());
        if let Err(err) = write_json(&summary, &outcome) {
            outcome.artifacts.pop();
            tracing::warn!(
                path = %summary.display(),
                error = %err,
                "Could not persist pipeline summary"
            );
        }
        PipelineRun { outcome, error }
    }

    fn execute(&self, outcome: &mut PipelineOutcome) -> Result<()> {
        let dry_run = self.options.dry_run;
        let cleaning = !self.options.skip_cleanup;
        // A dry run still validates, against the untouched tree.
        let validating = !self.options.skip_validation;

        outcome.advance(PipelineState::Analyzing);
        let analysis = analyze(self.config, self.reporter)?;
        self.persist(outcome, ANALYSIS_FILE, &analysis.report);
        outcome.analysis = Some(analysis.report.clone());

        let validator = Validator::new(self.config, self.executor, self.reporter);
        let baseline = validating.then(|| validator.capture_baseline());

        let mut removed = BTreeSet::new();
        if cleaning {
            if !dry_run {
                let backup = BackupManager::for_config(self.config).create()?;
                self.reporter
                    .info(&format!("backup created at {}", backup.path.display()));
                outcome.backup_created = true;
                outcome.backup_path = Some(backup.path);
                outcome.advance(PipelineState::BackupCreated);
            }
            outcome.advance(PipelineState::Cleaning);
            let result = self.clean(&analysis, outcome);
            if let Err(err) = result {
                self.rollback(outcome);
                return Err(err);
            }
            if let Some(log) = outcome.cleanup.as_ref().filter(|_| !dry_run) {
                removed = log
                    .actions_of(ActionType::Remove)
                    .filter(|action| action.succeeded)
                    .map(|action| action.test_name.clone())
                    .collect();
            }
        }

        if let Some(baseline) = baseline {
            outcome.advance(PipelineState::Validating);
            let targets = self.flaky_targets(&analysis, &removed);
            let report = match validator.validate(&baseline, &targets) {
                Ok(report) => report,
                Err(err) => {
                    self.rollback(outcome);
                    return Err(err);
                }
            };
            self.persist(outcome, VALIDATION_FILE, &report);
            let passed = report.passed;
            let reason = failure_reason(&report);
            outcome.validation = Some(report);
            if !passed {
                if outcome.cleanup_applied {
                    self.rollback(outcome);
                }
                return Err(JanitorError::ValidationFailed { reason });
            }
        }

        if !self.options.skip_docs {
            outcome.advance(PipelineState::Documenting);
            let inputs = DocInputs {
                config: self.config,
                analysis: &analysis.report,
                cleanup: outcome.cleanup.as_ref(),
                validation: outcome.validation.as_ref(),
            };
            outcome.docs = docs::generate(&inputs, &self.config.output_dir, self.reporter)?;
        }

        outcome.advance(PipelineState::Done);
        Ok(())
    }

    fn clean(&self, analysis: &Analysis, outcome: &mut PipelineOutcome) -> Result<()> {
        let ctx = CleanupContext {
            config: self.config,
            dry_run: self.options.dry_run,
            reporter: self.reporter,
        };
        let mut log = CleanupLog::new(self.options.dry_run);
        let result = self.cleaner.clean(analysis, &ctx, &mut log);
        log.finish();
        self.persist(outcome, CLEANUP_LOG_FILE, &log);
        outcome.cleanup = Some(log);
        outcome.cleanup_applied = result.is_ok() && !self.options.dry_run;
        result
    }

    /// Fragile tests still present after cleanup.
    fn flaky_targets(&self, analysis: &Analysis, removed: &BTreeSet<String>) -> Vec<String> {
        if !self.options.flaky_check {
            return Vec::new();
        }
        analysis
            .report
            .fragile_tests
            .iter()
            .map(|metrics| metrics.test_name.clone())
            .filter(|name| !removed.contains(name))
            .collect()
    }

    /// Restore the backup taken before cleanup. Failures to restore are
    /// reported; the original error still wins.
    fn rollback(&self, outcome: &mut PipelineOutcome) {
        outcome.advance(PipelineState::ErrorRollback);
        let Some(path) = outcome.backup_path.clone() else {
            tracing::info!("No backup to restore");
            outcome.cleanup_applied = false;
            return;
        };
        self.reporter.warning("rolling back cleanup from backup");
        match BackupManager::for_config(self.config).restore(&path) {
            Ok(files) => {
                tracing::info!(backup = %path.display(), files, "Rolled back");
                outcome.rolled_back = true;
                outcome.cleanup_applied = false;
            }
            Err(err) => {
                tracing::error!(backup = %path.display(), error = %err, "Rollback failed");
                self.reporter.warning(&format!(
                    "rollback from {} failed: {err}; restore by hand with `tj rollback --backup {}`",
                    path.display(),
                    path.display()
                ));
            }
        }
    }
}

fn failure_reason(report: &ValidationReport) -> String {
    let mut reasons = Vec::new();
    if !report.all_tests_passing {
        reasons.push(format!("{} failing test(s)", report.failed_tests.len().max(1)));
    }
    if report.coverage.regressed() {
        reasons.push(format!("coverage dropped {:.1} points", -report.coverage.delta));
    }
    if !report.flaky_tests.is_empty() {
        reasons.push(format!("{} flaky test(s)", report.flaky_tests.len()));
    }
    if reasons.is_empty() {
        reasons.push("judgement failed".to_string());
    }
    reasons.join(", ")
}

/// Standalone-phase helper: the persisted analysis report for a target.
///
/// # Errors
///
/// Returns `ArtifactNotFound` when `analyze` has not been run.
pub fn load_analysis_report(output_dir: &Path) -> Result<AnalysisReport> {
    crate::util::read_json(&output_dir.join(ANALYSIS_FILE), "analyze")
}
