//! Line coverage parsing and per-test overlap analysis.
//!
//! Supported inputs:
//! - Cobertura XML (`coverage.xml`, pytest-cov)
//! - coverage.py JSON (`coverage.json`), with contexts for per-test lines
//! - Istanbul JSON (`coverage-final.json`, Vitest/Jest)

use crate::discovery::classify;
use crate::model::{AnalysisOutcome, CoverageOverlap, SkippedItem};
use crate::util::relative_display;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(source|class|line)\b([^>]*)>(?:([^<]*)</source>)?")
        .expect("static pattern is valid")
});
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([\w-]+)\s*=\s*"([^"]*)""#).expect("static pattern is valid"));

/// Per-file line hit counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageData {
    files: BTreeMap<String, BTreeMap<usize, u64>>,
}

impl CoverageData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record hits for a line. Repeated records keep the highest count.
    pub fn record(&mut self, file: &str, line: usize, hits: u64) {
        let entry = self
            .files
            .entry(file.to_string())
            .or_default()
            .entry(line)
            .or_insert(0);
        *entry = (*entry).max(hits);
    }

    /// Fold another data set into this one.
    pub fn merge(&mut self, other: &Self) {
        for (file, lines) in &other.files {
            for (line, hits) in lines {
                self.record(file, *line, *hits);
            }
        }
    }

    /// Drop every file for which `keep` returns false.
    pub fn retain_files<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.files.retain(|file, _| keep(file));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn measurable_lines(&self) -> usize {
        self.files.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn covered_count(&self) -> usize {
        self.files
            .values()
            .flat_map(BTreeMap::values)
            .filter(|hits| **hits > 0)
            .count()
    }

    /// Covered over measurable lines, as a percentage. Zero when nothing is measurable.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        let measurable = self.measurable_lines();
        if measurable == 0 {
            return 0.0;
        }
        self.covered_count() as f64 / measurable as f64 * 100.0
    }

    /// Covered locations as `file:line`.
    #[must_use]
    pub fn covered_lines(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|(file, lines)| {
                lines
                    .iter()
                    .filter(|(_, hits)| **hits > 0)
                    .map(move |(line, _)| format!("{file}:{line}"))
            })
            .collect()
    }
}

/// Coverage loaded from one or more reports.
#[derive(Debug, Clone, Default)]
pub struct CoverageSnapshot {
    pub data: CoverageData,
    /// Test id -> covered `file:line` locations, when the report records contexts.
    pub per_test: BTreeMap<String, BTreeSet<String>>,
    pub sources: Vec<String>,
}

impl CoverageSnapshot {
    pub fn merge(&mut self, other: Self) {
        self.data.merge(&other.data);
        for (test, lines) in other.per_test {
            self.per_test.entry(test).or_default().extend(lines);
        }
        self.sources.extend(other.sources);
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.data.percentage()
    }

    /// Drop lines belonging to test files themselves, so percentages and
    /// overlaps measure the code under test.
    pub fn exclude_test_files(&mut self) {
        let is_source = |file: &str| classify(Path::new(file)).is_none();
        self.data.retain_files(is_source);
        for lines in self.per_test.values_mut() {
            lines.retain(|location| {
                location
                    .rsplit_once(':')
                    .is_none_or(|(file, _)| is_source(file))
            });
        }
    }
}

fn attrs(raw: &str) -> BTreeMap<&str, &str> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .collect()
}

/// Parse Cobertura XML. Class filenames are resolved against the first
/// `<source>` element, then made relative to `root`.
#[must_use]
pub fn parse_cobertura(xml: &str, root: &Path) -> AnalysisOutcome<CoverageData> {
    if !xml.contains("<coverage") {
        return AnalysisOutcome::Skipped("not a Cobertura report".to_string());
    }
    let mut data = CoverageData::new();
    let mut source_dir: Option<PathBuf> = None;
    let mut current: Option<String> = None;

    for caps in TAG_RE.captures_iter(xml) {
        let Some(tag) = caps.get(1) else { continue };
        let raw_attrs = caps.get(2).map_or("", |m| m.as_str());
        match tag.as_str() {
            "source" => {
                if source_dir.is_none() {
                    source_dir = caps
                        .get(3)
                        .map(|m| PathBuf::from(m.as_str().trim()))
                        .filter(|p| !p.as_os_str().is_empty());
                }
            }
            "class" => {
                current = attrs(raw_attrs).get("filename").map(|name| {
                    let path = Path::new(name);
                    let full = match &source_dir {
                        Some(dir) if path.is_relative() => dir.join(path),
                        _ => path.to_path_buf(),
                    };
                    relative_display(root, &full)
                });
            }
            "line" => {
                let Some(file) = current.as_deref() else { continue };
                let attrs = attrs(raw_attrs);
                let number = attrs.get("number").and_then(|n| n.parse::<usize>().ok());
                let hits = attrs.get("hits").and_then(|h| h.parse::<u64>().ok());
                if let (Some(number), Some(hits)) = (number, hits) {
                    data.record(file, number, hits);
                }
            }
            _ => {}
        }
    }
    AnalysisOutcome::Ok(data)
}

fn line_numbers(value: Option<&Value>) -> Vec<usize> {
    value
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|n| usize::try_from(n).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Parse coverage.py JSON, including `contexts` when recorded with
/// `--cov-context=test`.
#[must_use]
pub fn parse_coverage_py(value: &Value, root: &Path) -> AnalysisOutcome<CoverageSnapshot> {
    let Some(files) = value.get("files").and_then(Value::as_object) else {
        return AnalysisOutcome::Skipped("missing 'files' object".to_string());
    };
    let mut snapshot = CoverageSnapshot::default();
    for (name, entry) in files {
        let file = relative_display(root, Path::new(name));
        for line in line_numbers(entry.get("executed_lines")) {
            snapshot.data.record(&file, line, 1);
        }
        for line in line_numbers(entry.get("missing_lines")) {
            snapshot.data.record(&file, line, 0);
        }
        let Some(contexts) = entry.get("contexts").and_then(Value::as_object) else {
            continue;
        };
        for (line, names) in contexts {
            let Ok(line) = line.parse::<usize>() else { continue };
            let Some(names) = names.as_array() else { continue };
            for name in names.iter().filter_map(Value::as_str) {
                let test = name.split('|').next().unwrap_or(name).trim();
                if test.is_empty() {
                    continue;
                }
                snapshot
                    .per_test
                    .entry(super::history::normalize_test_id(test))
                    .or_default()
                    .insert(format!("{file}:{line}"));
            }
        }
    }
    AnalysisOutcome::Ok(snapshot)
}

/// Parse Istanbul `coverage-final.json`.
#[must_use]
pub fn parse_istanbul(value: &Value, root: &Path) -> AnalysisOutcome<CoverageData> {
    let Some(files) = value.as_object() else {
        return AnalysisOutcome::Skipped("expected an object keyed by file".to_string());
    };
    let mut data = CoverageData::new();
    for (key, entry) in files {
        let name = entry.get("path").and_then(Value::as_str).unwrap_or(key);
        let file = relative_display(root, Path::new(name));

        if let Some(lines) = entry.get("l").and_then(Value::as_object) {
            for (line, hits) in lines {
                if let (Ok(line), Some(hits)) = (line.parse::<usize>(), hits.as_u64()) {
                    data.record(&file, line, hits);
                }
            }
            continue;
        }

        let (Some(map), Some(counts)) = (
            entry.get("statementMap").and_then(Value::as_object),
            entry.get("s").and_then(Value::as_object),
        ) else {
            return AnalysisOutcome::Skipped(format!("no line data for {file}"));
        };
        for (id, location) in map {
            let line = location
                .get("start")
                .and_then(|start| start.get("line"))
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok());
            let hits = counts.get(id).and_then(Value::as_u64).unwrap_or(0);
            if let Some(line) = line {
                data.record(&file, line, hits);
            }
        }
    }
    AnalysisOutcome::Ok(data)
}

/// Parse any supported report file, choosing the format from its name and content.
#[must_use]
pub fn parse_coverage_file(path: &Path, root: &Path) -> AnalysisOutcome<CoverageSnapshot> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => return AnalysisOutcome::Skipped(format!("unreadable: {err}")),
    };
    let source = relative_display(root, path);
    let is_xml = path.extension().is_some_and(|ext| ext == "xml");

    let parsed = if is_xml {
        parse_cobertura(&text, root).map(|data| CoverageSnapshot {
            data,
            ..CoverageSnapshot::default()
        })
    } else {
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => return AnalysisOutcome::Skipped(format!("invalid JSON: {err}")),
        };
        if value.get("files").is_some() && value.get("meta").is_some() {
            parse_coverage_py(&value, root)
        } else {
            parse_istanbul(&value, root).map(|data| CoverageSnapshot {
                data,
                ..CoverageSnapshot::default()
            })
        }
    };
    parsed.map(|mut snapshot| {
        snapshot.sources.push(source);
        snapshot
    })
}

/// Well-known report locations under a directory.
#[must_use]
pub fn candidate_files(dir: &Path) -> Vec<PathBuf> {
    [
        "coverage.xml",
        "coverage.json",
        "coverage/coverage-final.json",
        "coverage-final.json",
    ]
    .iter()
    .map(|name| dir.join(name))
    .filter(|path| path.is_file())
    .collect()
}

/// Load and merge every report found in `dirs`. `None` when no report exists.
#[must_use]
pub fn load_coverage(root: &Path, dirs: &[&Path]) -> (Option<CoverageSnapshot>, Vec<SkippedItem>) {
    let mut merged: Option<CoverageSnapshot> = None;
    let mut skipped = Vec::new();
    let mut seen = BTreeSet::new();

    for path in dirs.iter().flat_map(|dir| candidate_files(dir)) {
        if !seen.insert(path.clone()) {
            continue;
        }
        match parse_coverage_file(&path, root) {
            AnalysisOutcome::Ok(snapshot) => {
                tracing::debug!(
                    report = %path.display(),
                    lines = snapshot.data.measurable_lines(),
                    "Loaded coverage report"
                );
                merged.get_or_insert_with(CoverageSnapshot::default).merge(snapshot);
            }
            AnalysisOutcome::Skipped(reason) => {
                tracing::warn!(report = %path.display(), %reason, "Skipping coverage report");
                skipped.push(SkippedItem {
                    path: relative_display(root, &path),
                    reason,
                });
            }
        }
    }
    (merged, skipped)
}

/// Pairs of tests with heavily overlapping coverage.
///
/// A pair is reported when one set is contained in the other (`redundant`,
/// with `test_a` the contained side) or the Jaccard overlap reaches
/// `threshold`. Tests without covered lines are ignored.
#[must_use]
pub fn find_overlaps(
    per_test: &BTreeMap<String, BTreeSet<String>>,
    threshold: f64,
) -> Vec<CoverageOverlap> {
    let tests: Vec<(&String, &BTreeSet<String>)> =
        per_test.iter().filter(|(_, lines)| !lines.is_empty()).collect();
    let mut overlaps = Vec::new();

    for (i, (name_a, lines_a)) in tests.iter().enumerate() {
        for (name_b, lines_b) in tests.iter().skip(i + 1) {
            let shared = lines_a.intersection(lines_b).count();
            if shared == 0 {
                continue;
            }
            let union = lines_a.len() + lines_b.len() - shared;
            let overlap = shared as f64 / union as f64;
            let a_in_b = shared == lines_a.len();
            let b_in_a = shared == lines_b.len();
            if !(a_in_b || b_in_a || overlap >= threshold) {
                continue;
            }
            let (test_a, test_b) = if b_in_a && !a_in_b {
                (name_b, name_a)
            } else {
                (name_a, name_b)
            };
            overlaps.push(CoverageOverlap {
                test_a: (*test_a).clone(),
                test_b: (*test_b).clone(),
                overlap,
                redundant: a_in_b || b_in_a,
            });
        }
    }
    overlaps
}
