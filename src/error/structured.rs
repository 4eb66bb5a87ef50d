//! Structured error output for scripted callers.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction
//! - Retryability flags
//! - Context for debugging

use crate::error::JanitorError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
/// Format: `SCREAMING_SNAKE_CASE` for easy parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Target ===
    /// Target directory missing
    TargetNotFound,
    /// Persisted artifact missing
    ArtifactNotFound,

    // === Parse ===
    /// Source file or report could not be parsed
    ParseError,

    // === Phases ===
    /// Analysis phase failed
    AnalysisFailed,
    /// Cleanup phase failed (rolled back)
    CleanupFailed,
    /// Validation phase failed (rolled back)
    ValidationFailed,
    /// Documentation phase failed
    DocumentationFailed,

    // === Backup ===
    /// No backup to restore
    BackupNotFound,
    /// Backup content mismatch
    BackupIntegrity,

    // === Runner ===
    /// Test runner could not be launched
    RunnerLaunch,

    // === Config ===
    /// Configuration error
    ConfigError,
    /// Value out of range
    InvalidValue,

    // === I/O ===
    /// File I/O error
    IoError,
    /// JSON serialization error
    JsonError,
    /// YAML parsing error
    YamlError,

    // === Internal ===
    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TargetNotFound => "TARGET_NOT_FOUND",
            Self::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            Self::ParseError => "PARSE_ERROR",
            Self::AnalysisFailed => "ANALYSIS_FAILED",
            Self::CleanupFailed => "CLEANUP_FAILED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::DocumentationFailed => "DOCUMENTATION_FAILED",
            Self::BackupNotFound => "BACKUP_NOT_FOUND",
            Self::BackupIntegrity => "BACKUP_INTEGRITY",
            Self::RunnerLaunch => "RUNNER_LAUNCH",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InvalidValue => "INVALID_VALUE",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Retryable means the caller might succeed after fixing input or
    /// environment (installing a runner, correcting a threshold).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RunnerLaunch | Self::InvalidValue | Self::ConfigError | Self::ArtifactNotFound
        )
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `JanitorError`.
    #[must_use]
    pub fn from_error(err: &JanitorError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);
        let hint = err.suggestion().map(str::to_string);

        Self {
            code,
            message: err.to_string(),
            hint,
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Create a structured error for an unknown config key, suggesting near matches.
    #[must_use]
    pub fn unknown_config_key(key: &str, known: &[&str]) -> Self {
        let similar = find_similar_keys(key, known, 3);
        let hint = match similar.as_slice() {
            [] => Some("Run 'tj config' to list known keys.".to_string()),
            [one] => Some(format!("Did you mean '{one}'?")),
            many => Some(format!("Did you mean one of: {}?", many.join(", "))),
        };

        Self {
            code: ErrorCode::ConfigError,
            message: format!("Unknown config key: {key}"),
            hint,
            retryable: true,
            context: Some(json!({ "key": key, "similar_keys": similar })),
        }
    }

    /// Get the process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }

        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &JanitorError) -> (ErrorCode, Option<Value>) {
        match err {
            JanitorError::TargetNotFound { path } => (
                ErrorCode::TargetNotFound,
                Some(json!({"path": path.display().to_string()})),
            ),
            JanitorError::ArtifactNotFound { path, phase } => (
                ErrorCode::ArtifactNotFound,
                Some(json!({"path": path.display().to_string(), "phase": phase})),
            ),
            JanitorError::Parse { path, reason } => (
                ErrorCode::ParseError,
                Some(json!({"path": path.display().to_string(), "reason": reason})),
            ),
            JanitorError::AnalysisFailed { .. } => (ErrorCode::AnalysisFailed, None),
            JanitorError::CleanupFailed { .. } => (
                ErrorCode::CleanupFailed,
                Some(json!({"rolled_back": true})),
            ),
            JanitorError::ValidationFailed { .. } => (
                ErrorCode::ValidationFailed,
                Some(json!({"rolled_back": true})),
            ),
            JanitorError::DocumentationFailed { .. } => (ErrorCode::DocumentationFailed, None),
            JanitorError::BackupNotFound { path } => (
                ErrorCode::BackupNotFound,
                Some(json!({"path": path.display().to_string()})),
            ),
            JanitorError::BackupIntegrity { path, reason } => (
                ErrorCode::BackupIntegrity,
                Some(json!({"path": path.display().to_string(), "reason": reason})),
            ),
            JanitorError::RunnerLaunch { command, .. } => {
                (ErrorCode::RunnerLaunch, Some(json!({"command": command})))
            }
            JanitorError::Config(_) => (ErrorCode::ConfigError, None),
            JanitorError::InvalidValue { field, reason } => (
                ErrorCode::InvalidValue,
                Some(json!({"field": field, "reason": reason})),
            ),
            JanitorError::Io(_) | JanitorError::Walk(_) => (ErrorCode::IoError, None),
            JanitorError::Json(_) => (ErrorCode::JsonError, None),
            JanitorError::Yaml(_) => (ErrorCode::YamlError, None),
            JanitorError::WithContext { source, .. } => {
                (ErrorCode::InternalError, Some(json!({"source": source.to_string()})))
            }
            JanitorError::Other(_) => (ErrorCode::InternalError, None),
        }
    }
}

/// Calculate the Levenshtein distance between two strings.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut matrix = vec![vec![0; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(a_len + 1) {
        row[0] = i;
    }
    for (j, item) in matrix[0].iter_mut().enumerate().take(b_len + 1) {
        *item = j;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    for (i, a_char) in a_chars.iter().enumerate() {
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }

    matrix[a_len][b_len]
}

/// Find keys similar to the searched key using Levenshtein distance.
///
/// Returns up to `max_suggestions` keys with distance <= 3.
#[must_use]
pub fn find_similar_keys(searched: &str, known: &[&str], max_suggestions: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = known
        .iter()
        .map(|key| (levenshtein_distance(searched, key), *key))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max_suggestions)
        .map(|(_, key)| key.to_string())
        .collect()
}
