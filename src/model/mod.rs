//! Core data types for `test_janitor`.
//!
//! This module defines the artifacts that flow between pipeline phases:
//! - `Ecosystem` - The two supported test ecosystems
//! - `TestMetrics` - Historical reliability of one test
//! - `TestGroup` - Tests judged duplicate or near-duplicate
//! - `AnalysisReport` - Categorized snapshot of the whole suite
//! - `CleanupAction` / `CleanupLog` - Append-only record of mutations
//! - `CoverageComparison` / `PerformanceComparison` / `ValidationReport`
//!
//! Every persisted artifact round-trips through JSON without losing scalar
//! fields (`serde_json` is built with `float_roundtrip`).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_true(b: &bool) -> bool {
    *b
}

const fn default_true() -> bool {
    true
}

/// Test ecosystem a file belongs to.
///
/// `Python` is the script-based runner (pytest); `JavaScript` is the
/// component/bundler-based runner (Vitest). Each variant is bound to its own
/// naming convention, syntax grammar, report parser and subprocess command.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Python,
    JavaScript,
}

impl Ecosystem {
    pub const ALL: [Self; 2] = [Self::Python, Self::JavaScript];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
        }
    }

    /// Name of the external runner driving this ecosystem.
    #[must_use]
    pub const fn runner_name(&self) -> &'static str {
        match self {
            Self::Python => "pytest",
            Self::JavaScript => "vitest",
        }
    }

    /// Line comment prefix used when annotating source files.
    #[must_use]
    pub const fn comment_prefix(&self) -> &'static str {
        match self {
            Self::Python => "#",
            Self::JavaScript => "//",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = crate::error::JanitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" | "pytest" | "a" => Ok(Self::Python),
            "javascript" | "js" | "ts" | "typescript" | "vitest" | "jest" | "b" => {
                Ok(Self::JavaScript)
            }
            other => Err(crate::error::JanitorError::invalid_value(
                "ecosystem",
                format!("unknown ecosystem '{other}' (use python or javascript)"),
            )),
        }
    }
}

/// Tagged result of analyzing a single file or report.
///
/// Distinguishes "analyzed, nothing found" (`Ok` with an empty payload) from
/// "could not be analyzed" (`Skipped`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome<T> {
    Ok(T),
    Skipped(String),
}

impl<T> AnalysisOutcome<T> {
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Convert into an `Option`, dropping the skip reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Skipped(_) => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> AnalysisOutcome<U> {
        match self {
            Self::Ok(value) => AnalysisOutcome::Ok(f(value)),
            Self::Skipped(reason) => AnalysisOutcome::Skipped(reason),
        }
    }
}

/// A file or report that contributed nothing because it could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SkippedItem {
    pub path: String,
    pub reason: String,
}

/// Historical reliability snapshot for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestMetrics {
    /// Qualified test identifier (`path::Class::name`).
    pub test_name: String,
    pub file_path: String,
    /// Failures over observed runs, in `[0, 1]`.
    pub failure_rate: f64,
    /// Mean execution time in seconds.
    pub execution_time: f64,
    pub lines_of_code: usize,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// Timestamp of the most recent observed run.
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_runs: usize,
    #[serde(default)]
    pub failures: usize,
}

impl TestMetrics {
    /// Build metrics from raw run tallies; zero runs yields a zero rate.
    #[must_use]
    pub fn from_tallies(
        test_name: impl Into<String>,
        file_path: impl Into<String>,
        total_runs: usize,
        failures: usize,
        total_duration: f64,
    ) -> Self {
        let failure_rate = if total_runs == 0 {
            0.0
        } else {
            (failures as f64 / total_runs as f64).clamp(0.0, 1.0)
        };
        let execution_time = if total_runs == 0 {
            0.0
        } else {
            total_duration / total_runs as f64
        };
        Self {
            test_name: test_name.into(),
            file_path: file_path.into(),
            failure_rate,
            execution_time,
            lines_of_code: 0,
            last_modified: None,
            last_run: None,
            total_runs,
            failures,
        }
    }
}

/// How a duplicate group was formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Identical bare test names.
    Exact,
    /// Name or assertion similarity above threshold.
    #[default]
    Similar,
}

/// Tests judged similar enough to consolidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestGroup {
    pub tests: Vec<String>,
    /// Similarity in `[0, 1]`; exact groups are always `1.0`.
    pub similarity_score: f64,
    #[serde(default)]
    pub shared_assertions: Vec<String>,
    #[serde(default)]
    pub kind: GroupKind,
}

impl TestGroup {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Category of non-deterministic pattern found in test source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Timing,
    Randomness,
    ExternalCall,
    GlobalState,
}

impl PatternCategory {
    pub const ALL: [Self; 4] = [
        Self::Timing,
        Self::Randomness,
        Self::ExternalCall,
        Self::GlobalState,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timing => "timing",
            Self::Randomness => "randomness",
            Self::ExternalCall => "external_call",
            Self::GlobalState => "global_state",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One occurrence of a non-deterministic pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PatternFinding {
    /// 1-based line number.
    pub line: usize,
    pub snippet: String,
    pub category: PatternCategory,
    pub suggestion: String,
}

/// A file that needs rewriting, with the findings that justify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RewriteCandidate {
    pub file_path: String,
    pub ecosystem: Ecosystem,
    pub findings: Vec<PatternFinding>,
    /// Tests whose bodies contain at least one finding.
    #[serde(default)]
    pub tests: Vec<String>,
}

/// Why something was judged obsolete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObsoleteReason {
    DeprecationMarker { marker: String, line: usize },
    UnresolvedImport { module: String, line: usize },
}

impl fmt::Display for ObsoleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeprecationMarker { marker, line } => {
                write!(f, "deprecation marker '{marker}' at line {line}")
            }
            Self::UnresolvedImport { module, line } => {
                write!(f, "unresolved import '{module}' at line {line}")
            }
        }
    }
}

/// Whether obsolescence applies to a whole file or to a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObsoleteScope {
    File,
    Test,
}

/// Advisory obsolescence finding, reviewable before removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObsoleteFinding {
    pub file_path: String,
    /// Set for test-scoped findings.
    #[serde(default)]
    pub test_name: Option<String>,
    pub scope: ObsoleteScope,
    pub reason: ObsoleteReason,
}

/// Two tests whose covered lines overlap heavily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageOverlap {
    pub test_a: String,
    pub test_b: String,
    /// Jaccard overlap of covered lines in `[0, 1]`.
    pub overlap: f64,
    /// `test_a`'s lines are a subset of `test_b`'s.
    pub redundant: bool,
}

/// Category a test lands in after analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Obsolete,
    Fragile,
    Duplicate,
    Valuable,
}

impl TestCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Obsolete => "obsolete",
            Self::Fragile => "fragile",
            Self::Duplicate => "duplicate",
            Self::Valuable => "valuable",
        }
    }
}

/// Suite-wide analysis snapshot.
///
/// Invariant: every test name appears in exactly one of `obsolete_tests`,
/// `fragile_tests`, a member of `duplicate_groups`, or `valuable_tests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub target: String,
    pub total_tests: usize,
    pub obsolete_tests: Vec<String>,
    pub fragile_tests: Vec<TestMetrics>,
    pub duplicate_groups: Vec<TestGroup>,
    pub valuable_tests: Vec<String>,
    /// Sum of mean execution times, in seconds.
    pub total_execution_time: f64,
    pub coverage_percentage: f64,
    #[serde(default)]
    pub files_by_ecosystem: BTreeMap<Ecosystem, usize>,
    #[serde(default)]
    pub obsolete_findings: Vec<ObsoleteFinding>,
    #[serde(default)]
    pub rewrite_candidates: Vec<RewriteCandidate>,
    #[serde(default)]
    pub coverage_overlaps: Vec<CoverageOverlap>,
    #[serde(default)]
    pub skipped: Vec<SkippedItem>,
}

impl AnalysisReport {
    /// An empty report for a target with no tests.
    #[must_use]
    pub fn empty(target: impl Into<String>) -> Self {
        Self {
            generated_at: Utc::now(),
            target: target.into(),
            total_tests: 0,
            obsolete_tests: Vec::new(),
            fragile_tests: Vec::new(),
            duplicate_groups: Vec::new(),
            valuable_tests: Vec::new(),
            total_execution_time: 0.0,
            coverage_percentage: 0.0,
            files_by_ecosystem: BTreeMap::new(),
            obsolete_findings: Vec::new(),
            rewrite_candidates: Vec::new(),
            coverage_overlaps: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// All duplicate-group members, in group order.
    pub fn duplicate_members(&self) -> impl Iterator<Item = &str> {
        self.duplicate_groups
            .iter()
            .flat_map(|group| group.tests.iter().map(String::as_str))
    }

    /// Every categorized name paired with its category.
    #[must_use]
    pub fn categorized(&self) -> Vec<(&str, TestCategory)> {
        let mut out = Vec::with_capacity(self.total_tests);
        out.extend(
            self.obsolete_tests
                .iter()
                .map(|name| (name.as_str(), TestCategory::Obsolete)),
        );
        out.extend(
            self.fragile_tests
                .iter()
                .map(|metrics| (metrics.test_name.as_str(), TestCategory::Fragile)),
        );
        out.extend(
            self.duplicate_members()
                .map(|name| (name, TestCategory::Duplicate)),
        );
        out.extend(
            self.valuable_tests
                .iter()
                .map(|name| (name.as_str(), TestCategory::Valuable)),
        );
        out
    }

    /// Category of a given test, if it was categorized.
    #[must_use]
    pub fn category_of(&self, test_name: &str) -> Option<TestCategory> {
        self.categorized()
            .into_iter()
            .find(|(name, _)| *name == test_name)
            .map(|(_, category)| category)
    }

    /// Verify the exactly-one-category invariant.
    ///
    /// Returns the names that appear more than once, or an error string when
    /// the categorized count disagrees with `total_tests`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found.
    pub fn check_categorization(&self) -> std::result::Result<(), String> {
        let categorized = self.categorized();
        let mut seen = BTreeSet::new();
        let duplicates: Vec<&str> = categorized
            .iter()
            .filter(|(name, _)| !seen.insert(*name))
            .map(|(name, _)| *name)
            .collect();
        if !duplicates.is_empty() {
            return Err(format!(
                "tests categorized more than once: {}",
                duplicates.join(", ")
            ));
        }
        if categorized.len() != self.total_tests {
            return Err(format!(
                "categorized {} tests but total_tests is {}",
                categorized.len(),
                self.total_tests
            ));
        }
        Ok(())
    }
}

/// Kind of cleanup mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Remove,
    Rewrite,
    Merge,
    Keep,
}

impl ActionType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::Rewrite => "rewrite",
            Self::Merge => "merge",
            Self::Keep => "keep",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prefix applied to every reason recorded during a dry run.
pub const DRY_RUN_TAG: &str = "[DRY RUN] ";

/// One atomic cleanup mutation. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupAction {
    pub action_type: ActionType,
    pub test_name: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_metrics: Option<TestMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_metrics: Option<TestMetrics>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupAction {
    #[must_use]
    pub fn new(
        action_type: ActionType,
        test_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            test_name: test_name.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
            before_metrics: None,
            after_metrics: None,
            succeeded: true,
            error: None,
        }
    }

    #[must_use]
    pub fn with_before(mut self, metrics: Option<TestMetrics>) -> Self {
        self.before_metrics = metrics;
        self
    }

    /// Mark the action as failed with the underlying error message.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.succeeded = false;
        self.error = Some(error.into());
        self
    }
}

/// Ordered, append-only record of a cleanup phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupLog {
    pub actions: Vec<CleanupAction>,
    pub total_removed: usize,
    pub total_rewritten: usize,
    pub total_merged: usize,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dry_run: bool,
}

impl CleanupLog {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            actions: Vec::new(),
            total_removed: 0,
            total_rewritten: 0,
            total_merged: 0,
            start_time: Utc::now(),
            end_time: None,
            dry_run,
        }
    }

    /// Append an action, updating counters for successful mutations.
    pub fn record(&mut self, action: CleanupAction) {
        if action.succeeded {
            match action.action_type {
                ActionType::Remove => self.total_removed += 1,
                ActionType::Rewrite => self.total_rewritten += 1,
                ActionType::Merge => self.total_merged += 1,
                ActionType::Keep => {}
            }
        }
        self.actions.push(action);
    }

    /// Set `end_time`. Returns `false` if it was already set.
    pub fn finish(&mut self) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(Utc::now());
        true
    }

    pub fn failed_actions(&self) -> impl Iterator<Item = &CleanupAction> {
        self.actions.iter().filter(|action| !action.succeeded)
    }

    pub fn actions_of(&self, action_type: ActionType) -> impl Iterator<Item = &CleanupAction> {
        self.actions
            .iter()
            .filter(move |action| action.action_type == action_type)
    }

    /// Wall-clock duration of the phase, once finished.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

/// Percentage improvement going from `before` to `after` (lower is better).
///
/// `before == after` gives 0, `after < before` is positive, `after > before`
/// is negative, and `before == 0` gives 0.
#[must_use]
pub fn calculate_improvement_percentage(before: f64, after: f64) -> f64 {
    if before == 0.0 || !before.is_finite() || !after.is_finite() {
        return 0.0;
    }
    ((before - after) / before) * 100.0
}

/// Coverage before and after cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageComparison {
    pub before: f64,
    pub after: f64,
    pub delta: f64,
    /// `file:line` locations covered before but not after.
    #[serde(default)]
    pub lost_lines: Vec<String>,
}

impl CoverageComparison {
    #[must_use]
    pub fn new(before: f64, after: f64, lost_lines: Vec<String>) -> Self {
        Self {
            before,
            after,
            delta: after - before,
            lost_lines,
        }
    }

    #[must_use]
    pub fn regressed(&self) -> bool {
        self.delta < 0.0
    }
}

/// Execution time before and after cleanup, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerformanceComparison {
    pub before: f64,
    pub after: f64,
    pub improvement_percentage: f64,
}

impl PerformanceComparison {
    #[must_use]
    pub fn new(before: f64, after: f64) -> Self {
        Self {
            before,
            after,
            improvement_percentage: calculate_improvement_percentage(before, after),
        }
    }
}

/// Terminal artifact of the validation phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub all_tests_passing: bool,
    pub coverage: CoverageComparison,
    pub performance: PerformanceComparison,
    pub flaky_tests: Vec<String>,
    pub total_tests: usize,
    #[serde(default)]
    pub failed_tests: Vec<String>,
    /// Per-test pass rate from the flakiness probe.
    #[serde(default)]
    pub pass_rates: BTreeMap<String, f64>,
    #[serde(default)]
    pub runner_errors: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub passed: bool,
}

impl ValidationReport {
    /// Overall judgement: all passing, no coverage loss, no flaky tests.
    #[must_use]
    pub fn judge(all_tests_passing: bool, coverage: &CoverageComparison, flaky: &[String]) -> bool {
        all_tests_passing && coverage.delta >= 0.0 && flaky.is_empty()
    }
}
