//! Markdown documentation generators.
//!
//! Three documents are rendered from the pipeline artifacts into
//! `<output>/docs/`:
//! - `TESTING_STANDARDS.md` - conventions and thresholds the suite is held to
//! - `TESTING_EXAMPLES.md` - anti-patterns found in this suite, with fixes
//! - `CLEANUP_REPORT.md` - before/after metrics and every cleanup action
//!
//! Generators only borrow the artifacts and keep no state.

pub mod examples;
pub mod standards;
pub mod summary;

use crate::config::JanitorConfig;
use crate::error::{JanitorError, Result};
use crate::model::{AnalysisReport, CleanupLog, ValidationReport};
use crate::output::Reporter;
use crate::util::write_atomic;
use std::path::{Path, PathBuf};
use unicode_width::UnicodeWidthStr;

pub const DOCS_DIR: &str = "docs";
pub const STANDARDS_FILE: &str = "TESTING_STANDARDS.md";
pub const EXAMPLES_FILE: &str = "TESTING_EXAMPLES.md";
pub const REPORT_FILE: &str = "CLEANUP_REPORT.md";

/// Read-only view of everything a generator may render.
#[derive(Clone, Copy)]
pub struct DocInputs<'a> {
    pub config: &'a JanitorConfig,
    pub analysis: &'a AnalysisReport,
    pub cleanup: Option<&'a CleanupLog>,
    pub validation: Option<&'a ValidationReport>,
}

/// Escape a value for a Markdown table cell.
#[must_use]
pub fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Pipe table with columns padded to their display width.
#[derive(Debug, Default)]
pub struct MarkdownTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MarkdownTable {
    #[must_use]
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rows
            .push(cells.into_iter().map(|cell| escape_cell(cell.as_ref())).collect());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render with a trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let columns = self.headers.len();
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width().max(3)).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().take(columns).enumerate() {
                widths[i] = widths[i].max(cell.width());
            }
        }

        let line = |cells: &[String]| {
            let padded: Vec<String> = (0..columns)
                .map(|i| {
                    let cell = cells.get(i).map_or("", String::as_str);
                    format!("{cell}{}", " ".repeat(widths[i].saturating_sub(cell.width())))
                })
                .collect();
            format!("| {} |\n", padded.join(" | "))
        };

        let mut out = line(&self.headers);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&format!("| {} |\n", rule.join(" | ")));
        for row in &self.rows {
            out.push_str(&line(row));
        }
        out
    }
}

/// Bulleted list, or an italic placeholder when empty.
#[must_use]
pub fn bullet_list<I, S>(items: I, empty: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for item in items {
        out.push_str("- ");
        out.push_str(item.as_ref());
        out.push('\n');
    }
    if out.is_empty() {
        out = format!("_{empty}_\n");
    }
    out
}

/// Render all three documents into `<output>/docs/`.
///
/// # Errors
///
/// Returns `DocumentationFailed` if a document cannot be written.
pub fn generate(
    inputs: &DocInputs<'_>,
    output_dir: &Path,
    reporter: &dyn Reporter,
) -> Result<Vec<PathBuf>> {
    reporter.phase_started("documentation");
    let dir = output_dir.join(DOCS_DIR);
    let documents = [
        (STANDARDS_FILE, standards::render(inputs)),
        (EXAMPLES_FILE, examples::render(inputs)),
        (REPORT_FILE, summary::render(inputs)),
    ];

    let mut written = Vec::with_capacity(documents.len());
    for (name, body) in documents {
        let path = dir.join(name);
        write_atomic(&path, body.as_bytes()).map_err(|err| JanitorError::DocumentationFailed {
            reason: format!("cannot write {}: {err}", path.display()),
        })?;
        tracing::debug!(path = %path.display(), bytes = body.len(), "Wrote document");
        written.push(path);
    }
    reporter.phase_finished(
        "documentation",
        &format!("{} documents in {}", written.len(), dir.display()),
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SilentReporter;
    use tempfile::TempDir;

    #[test]
    fn table_pads_and_escapes() {
        let mut table = MarkdownTable::new(["Metric", "Before", "After"]);
        table.row(["Tests", "12", "9"]).row(["a|b", "1", "2"]);
        insta::assert_snapshot!(table.render(), @r"
        | Metric | Before | After |
        | ------ | ------ | ----- |
        | Tests  | 12     | 9     |
        | a\|b   | 1      | 2     |
        ");
    }

    #[test]
    fn empty_list_placeholder() {
        assert_eq!(bullet_list(Vec::<String>::new(), "none"), "_none_\n");
        assert_eq!(bullet_list(["x", "y"], "none"), "- x\n- y\n");
    }

    #[test]
    fn generate_writes_three_documents() {
        let temp = TempDir::new().unwrap();
        let config = JanitorConfig::defaults_for(temp.path());
        let report = AnalysisReport::empty("suite");
        let inputs = DocInputs {
            config: &config,
            analysis: &report,
            cleanup: None,
            validation: None,
        };
        let paths = generate(&inputs, &config.output_dir, &SilentReporter).unwrap();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(path.starts_with(config.output_dir.join(DOCS_DIR)));
            assert!(std::fs::read_to_string(path).unwrap().starts_with("# "));
        }
    }
}
