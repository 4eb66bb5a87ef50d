//! Error types and handling for `test_janitor`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration for ad-hoc context
//! - Provides recovery hints for user-facing errors
//! - Every failure maps to exit code 1 (phase failure)
//! - Provides structured JSON output for `--json` callers

mod context;
mod structured;

pub use context::ResultExt;
pub use structured::{ErrorCode, StructuredError};

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `test_janitor` operations.
#[derive(Error, Debug)]
pub enum JanitorError {
    // === Target / Discovery Errors ===
    /// Target directory does not exist (only fatal for mutating phases).
    #[error("Target directory not found: '{path}'")]
    TargetNotFound { path: PathBuf },

    /// A persisted artifact that a standalone phase needs is missing.
    #[error("Artifact not found: '{path}' (run '{phase}' first)")]
    ArtifactNotFound { path: PathBuf, phase: &'static str },

    // === Parse Errors ===
    /// A source file or report could not be parsed.
    #[error("Parse error in '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    // === Phase Errors ===
    /// Analysis could not produce a report. Nothing was mutated.
    #[error("Analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    /// Cleanup aborted; the orchestrator rolls back.
    #[error("Cleanup failed: {reason}")]
    CleanupFailed { reason: String },

    /// Validation could not run or did not pass.
    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// Documentation rendering failed. Never triggers rollback.
    #[error("Documentation failed: {reason}")]
    DocumentationFailed { reason: String },

    // === Backup Errors ===
    /// No backup available to restore.
    #[error("No backup found in '{path}'")]
    BackupNotFound { path: PathBuf },

    /// Restored content does not match the backup manifest.
    #[error("Backup integrity check failed for '{path}': {reason}")]
    BackupIntegrity { path: PathBuf, reason: String },

    // === Runner Errors ===
    /// The external test command could not be started.
    #[error("Failed to launch '{command}': {reason}")]
    RunnerLaunch { command: String, reason: String },

    // === Configuration Errors ===
    /// Configuration value error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Field validation failed.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Directory walk error.
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    // === Wrapped errors ===
    /// Error with additional context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JanitorError {
    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::TargetNotFound { .. } => Some("Check the target path"),
            Self::ArtifactNotFound { .. } => Some("Run: tj analyze <target>"),
            Self::BackupNotFound { .. } => {
                Some("Pass --backup-dir pointing at a previous run's backups")
            }
            Self::InvalidValue { .. } => Some("Thresholds must lie between 0.0 and 1.0"),
            Self::RunnerLaunch { .. } => {
                Some("Install the test runner or set runner.python-command / runner.node-command")
            }
            Self::CleanupFailed { .. } | Self::ValidationFailed { .. } => {
                Some("Inspect cleanup_log.json; `tj rollback` restores the last backup")
            }
            _ => None,
        }
    }

    /// Get the exit code for this error. Every failure is a phase failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error for a file or report.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `JanitorError`.
pub type Result<T> = std::result::Result<T, JanitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JanitorError::TargetNotFound {
            path: PathBuf::from("/nope"),
        };
        assert_eq!(err.to_string(), "Target directory not found: '/nope'");
    }

    #[test]
    fn test_invalid_value() {
        let err = JanitorError::invalid_value("fragile-threshold", "must be <= 1.0");
        assert_eq!(
            err.to_string(),
            "Invalid value for fragile-threshold: must be <= 1.0"
        );
    }

    #[test]
    fn test_suggestion() {
        let err = JanitorError::ArtifactNotFound {
            path: PathBuf::from("out/analysis_report.json"),
            phase: "analyze",
        };
        assert_eq!(err.suggestion(), Some("Run: tj analyze <target>"));
    }

    #[test]
    fn test_exit_code_is_one() {
        let err = JanitorError::Config("bad".into());
        assert_eq!(err.exit_code(), 1);
    }
}
