//! Pending file edits, applied once per file after planning.
//!
//! Planning steps only describe edits against the analyzed source, so byte
//! offsets never go stale between steps. Rendering resolves all of a file's
//! edits in one pass; applying validates the result before writing.

use crate::analysis::syntax::parse_source;
use crate::discovery::classify;
use crate::error::{JanitorError, Result};
use crate::model::{AnalysisOutcome, Ecosystem};
use crate::util::write_atomic;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Replacement {
    start: usize,
    end: usize,
    text: String,
}

/// Edits queued for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEdits {
    delete: bool,
    replacements: Vec<Replacement>,
    inserts: Vec<(usize, String)>,
    appends: Vec<String>,
    /// Written first when the file does not exist yet.
    header: Option<String>,
}

impl FileEdits {
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        self.delete
    }

    /// Apply all queued edits to `original`.
    #[must_use]
    pub fn render(&self, original: &str) -> String {
        enum Op<'a> {
            Insert(&'a str),
            Replace(usize, &'a str),
        }

        let mut ops: Vec<(usize, u8, Op<'_>)> = Vec::new();
        for (at, text) in &self.inserts {
            ops.push((*at, 0, Op::Insert(text)));
        }
        for r in &self.replacements {
            ops.push((r.start, 1, Op::Replace(r.end, &r.text)));
        }
        ops.sort_by_key(|(at, rank, _)| (*at, *rank));

        let mut out = String::with_capacity(original.len());
        let mut cursor = 0;
        for (at, _, op) in ops {
            let at = at.min(original.len());
            match op {
                Op::Insert(text) => {
                    if at < cursor {
                        continue;
                    }
                    out.push_str(&original[cursor..at]);
                    out.push_str(text);
                    cursor = at;
                }
                Op::Replace(end, text) => {
                    let end = end.min(original.len());
                    if end <= cursor {
                        continue;
                    }
                    let start = at.max(cursor);
                    out.push_str(&original[cursor..start]);
                    out.push_str(text);
                    cursor = end;
                }
            }
        }
        out.push_str(&original[cursor..]);

        for block in &self.appends {
            if !out.is_empty() {
                let trimmed = out.trim_end_matches('\n').len();
                out.truncate(trimmed);
                out.push_str("\n\n\n");
            }
            out.push_str(block.trim_end_matches('\n'));
            out.push('\n');
        }
        out
    }
}

/// Edits for every touched file, keyed by absolute path.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    files: BTreeMap<PathBuf, FileEdits>,
}

impl EditSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, path: &Path) -> &mut FileEdits {
        self.files.entry(path.to_path_buf()).or_default()
    }

    pub fn delete_file(&mut self, path: &Path) {
        self.entry(path).delete = true;
    }

    /// Replace `start..end` (already expanded to whole lines by the caller).
    pub fn replace(&mut self, path: &Path, start: usize, end: usize, text: impl Into<String>) {
        self.entry(path).replacements.push(Replacement {
            start,
            end,
            text: text.into(),
        });
    }

    pub fn insert(&mut self, path: &Path, at: usize, text: impl Into<String>) {
        self.entry(path).inserts.push((at, text.into()));
    }

    pub fn append(&mut self, path: &Path, block: impl Into<String>) {
        self.entry(path).appends.push(block.into());
    }

    /// Append to a file, creating it with `header` first if it is missing.
    pub fn create_or_append(&mut self, path: &Path, header: &str, block: impl Into<String>) {
        let edits = self.entry(path);
        edits.header.get_or_insert_with(|| header.to_string());
        edits.appends.push(block.into());
    }

    #[must_use]
    pub fn is_deleted(&self, path: &Path) -> bool {
        self.files.get(path).is_some_and(FileEdits::is_delete)
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileEdits> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write one file's edits to disk.
    ///
    /// Source files are re-parsed before writing; an edit that would leave a
    /// syntax error is refused and the file is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an I/O error, or `CleanupFailed` when validation rejects the result.
    pub fn apply(&self, path: &Path) -> Result<()> {
        let Some(edits) = self.files.get(path) else {
            return Ok(());
        };
        if edits.delete {
            fs::remove_file(path)?;
            tracing::debug!(file = %path.display(), "Deleted file");
            return Ok(());
        }

        let original = match (path.exists(), &edits.header) {
            (true, _) => fs::read_to_string(path)?,
            (false, Some(header)) => header.clone(),
            (false, None) => {
                return Err(JanitorError::CleanupFailed {
                    reason: format!("{} no longer exists", path.display()),
                });
            }
        };
        let rendered = edits.render(&original);

        if let Some(ecosystem) = source_ecosystem(path) {
            if let AnalysisOutcome::Skipped(reason) =
                parse_source(path, &path.display().to_string(), rendered.clone(), ecosystem)
            {
                return Err(JanitorError::CleanupFailed {
                    reason: format!("edit to {} refused: {reason}", path.display()),
                });
            }
        }

        write_atomic(path, rendered.as_bytes())?;
        tracing::debug!(file = %path.display(), bytes = rendered.len(), "Rewrote file");
        Ok(())
    }
}

fn source_ecosystem(path: &Path) -> Option<Ecosystem> {
    if let Some(ecosystem) = classify(path) {
        return Some(ecosystem);
    }
    match path.extension().and_then(|e| e.to_str())? {
        "py" => Some(Ecosystem::Python),
        "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => Some(Ecosystem::JavaScript),
        _ => None,
    }
}

/// Widen a byte span to whole lines: back to the line start when only
/// indentation precedes it, forward past the newline and any blank lines.
#[must_use]
pub fn line_span(source: &str, start: usize, end: usize) -> (usize, usize) {
    let bytes = source.as_bytes();
    let start = start.min(bytes.len());
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    let start = if source[line_start..start].trim().is_empty() {
        line_start
    } else {
        start
    };

    let mut end = end.min(bytes.len());
    while end < bytes.len() && bytes[end] != b'\n' && bytes[end].is_ascii_whitespace() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b';' {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\n' {
        end += 1;
    }
    loop {
        let rest = &source[end..];
        let Some(newline) = rest.find('\n') else { break };
        if !rest[..newline].trim().is_empty() {
            break;
        }
        end += newline + 1;
    }
    // At end of file, also drop the blank lines that separated the span.
    let mut start = start;
    if source[end..].trim().is_empty() {
        end = bytes.len();
        while start > 1 && source[..start].ends_with("\n\n") {
            start -= 1;
        }
    }
    (start, end)
}

/// Byte offset of the start of a 1-based line.
#[must_use]
pub fn line_offset(source: &str, line: usize) -> usize {
    if line <= 1 {
        return 0;
    }
    source
        .match_indices('\n')
        .nth(line - 2)
        .map_or(source.len(), |(i, _)| i + 1)
}

/// Leading whitespace of a line.
#[must_use]
pub fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SOURCE: &str =
        "import os\n\n\ndef test_a():\n    assert 1\n\n\ndef test_b():\n    assert 2\n";

    #[test]
    fn line_span_swallows_trailing_blank_lines() {
        let start = SOURCE.find("def test_a").unwrap();
        let end = SOURCE.find("assert 1").unwrap() + "assert 1".len();
        let (s, e) = line_span(SOURCE, start, end);
        assert_eq!(&SOURCE[..s], "import os\n\n\n");
        assert!(SOURCE[e..].starts_with("def test_b"));
    }

    #[test]
    fn line_offsets() {
        assert_eq!(line_offset(SOURCE, 1), 0);
        assert_eq!(&SOURCE[line_offset(SOURCE, 4)..][..10], "def test_a");
        assert_eq!(line_offset(SOURCE, 99), SOURCE.len());
    }

    #[test]
    fn render_combines_edits() {
        let mut edits = FileEdits::default();
        let start = SOURCE.find("def test_a").unwrap();
        let end = SOURCE.find("def test_b").unwrap();
        edits.replacements.push(Replacement { start, end, text: String::new() });
        // An insert inside the removed span is dropped.
        edits.inserts.push((start + 4, "# lost\n".to_string()));
        let b_body = SOURCE.find("    assert 2").unwrap();
        edits.inserts.push((b_body, "    # note\n".to_string()));
        edits.appends.push("def test_c():\n    assert 3\n".to_string());

        assert_eq!(
            edits.render(SOURCE),
            "import os\n\n\ndef test_b():\n    # note\n    assert 2\n\n\ndef test_c():\n    assert 3\n"
        );
    }

    #[test]
    fn apply_refuses_broken_python() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test_x.py");
        fs::write(&path, SOURCE).unwrap();

        let mut set = EditSet::new();
        set.append(&path, "def broken(:\n");
        let err = set.apply(&path).unwrap_err();
        assert!(err.to_string().contains("refused"));
        assert_eq!(fs::read_to_string(&path).unwrap(), SOURCE);
    }

    #[test]
    fn create_or_append_writes_header_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conftest.py");
        let mut set = EditSet::new();
        set.create_or_append(&path, "import pytest\n", "X = 1\n");
        set.create_or_append(&path, "ignored\n", "Y = 2\n");
        set.apply(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "import pytest\n\n\nX = 1\n\n\nY = 2\n");
    }
}
