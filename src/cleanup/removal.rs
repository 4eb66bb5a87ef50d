//! Removal of obsolete tests and files.

use super::CleanupPlan;
use super::edits::{indentation, line_span};
use crate::analysis::Analysis;
use crate::analysis::syntax::{ParsedTestFile, TestFunction};
use crate::model::{ActionType, CleanupAction, Ecosystem, ObsoleteFinding, ObsoleteScope};
use std::collections::BTreeSet;

fn reasons(findings: &[&ObsoleteFinding]) -> String {
    findings
        .iter()
        .map(|finding| finding.reason.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Whether removing `doomed` leaves the class enclosing `test` without a
/// statement. Blank lines and comments do not count.
fn class_emptied(file: &ParsedTestFile, test: &TestFunction, doomed: &[&TestFunction]) -> bool {
    let Some(class) = test.scope.last() else {
        return false;
    };
    let removed: Vec<(usize, usize)> = doomed
        .iter()
        .filter(|other| other.scope == test.scope)
        .map(|other| line_span(&file.source, other.start_byte, other.end_byte))
        .collect();

    let mut offset = 0;
    let lines: Vec<(usize, &str)> = file
        .source
        .split_inclusive('\n')
        .map(|line| {
            let at = offset;
            offset += line.len();
            (at, line)
        })
        .collect();
    let Some(header) = lines.iter().rposition(|(at, line)| {
        let trimmed = line.trim_start();
        *at < test.start_byte
            && trimmed
                .strip_prefix("class ")
                .and_then(|rest| rest.strip_prefix(class.as_str()))
                .is_some_and(|rest| rest.starts_with(['(', ':']))
    }) else {
        return false;
    };
    let header_indent = indentation(lines[header].1).len();

    lines[header + 1..]
        .iter()
        .filter(|(_, line)| !line.trim().is_empty())
        .take_while(|(_, line)| indentation(line).len() > header_indent)
        .filter(|(_, line)| !line.trim_start().starts_with('#'))
        .all(|(at, _)| removed.iter().any(|(start, end)| at >= start && at < end))
}

/// Replacement text for a removed span. A class whose last statement goes
/// gets one `pass`, on the span of its first removed method.
fn replacement(file: &ParsedTestFile, test: &TestFunction, doomed: &[&TestFunction]) -> String {
    if file.ecosystem != Ecosystem::Python || test.scope.is_empty() {
        return String::new();
    }
    let first_in_class = doomed
        .iter()
        .find(|other| other.scope == test.scope)
        .is_some_and(|first| first.qualified_name == test.qualified_name);
    if !first_in_class || !class_emptied(file, test, doomed) {
        return String::new();
    }
    let line = file.source.lines().nth(test.line.saturating_sub(1)).unwrap_or("");
    format!("{}pass\n", indentation(line))
}

/// Queue removals for every obsolete test.
pub fn plan(analysis: &Analysis, plan: &mut CleanupPlan) {
    let obsolete: BTreeSet<&str> =
        analysis.report.obsolete_tests.iter().map(String::as_str).collect();

    for file in &analysis.files {
        let findings: Vec<&ObsoleteFinding> = analysis
            .report
            .obsolete_findings
            .iter()
            .filter(|finding| finding.file_path == file.rel_path)
            .collect();
        if findings.is_empty() {
            continue;
        }
        let file_findings: Vec<&ObsoleteFinding> = findings
            .iter()
            .copied()
            .filter(|finding| finding.scope == ObsoleteScope::File)
            .collect();
        let doomed: Vec<&TestFunction> = file
            .tests
            .iter()
            .filter(|test| obsolete.contains(test.qualified_name.as_str()))
            .collect();
        let whole_file = !file_findings.is_empty()
            || (!doomed.is_empty() && doomed.len() == file.tests.len());

        if whole_file {
            plan.edits.delete_file(&file.path);
            let file_reason = if file_findings.is_empty() {
                "every test in the file is obsolete".to_string()
            } else {
                reasons(&file_findings)
            };
            if file.tests.is_empty() {
                plan.push(
                    CleanupAction::new(
                        ActionType::Remove,
                        &file.rel_path,
                        format!("obsolete file: {file_reason}"),
                    ),
                    vec![file.path.clone()],
                );
            }
            for test in &file.tests {
                plan.removed_tests.insert(test.qualified_name.clone());
                plan.push(
                    CleanupAction::new(
                        ActionType::Remove,
                        &test.qualified_name,
                        format!("obsolete file: {file_reason}"),
                    )
                    .with_before(analysis.history.get(&test.qualified_name).cloned()),
                    vec![file.path.clone()],
                );
            }
            continue;
        }

        for test in doomed.iter().copied() {
            let own: Vec<&ObsoleteFinding> = findings
                .iter()
                .copied()
                .filter(|finding| {
                    finding.test_name.as_deref() == Some(test.qualified_name.as_str())
                })
                .collect();
            let (start, end) = line_span(&file.source, test.start_byte, test.end_byte);
            plan.edits
                .replace(&file.path, start, end, replacement(file, test, &doomed));
            plan.removed_tests.insert(test.qualified_name.clone());
            plan.push(
                CleanupAction::new(
                    ActionType::Remove,
                    &test.qualified_name,
                    format!("obsolete: {}", reasons(&own)),
                )
                .with_before(analysis.history.get(&test.qualified_name).cloned()),
                vec![file.path.clone()],
            );
        }
    }
}
