//! Remediation annotations for non-deterministic patterns.
//!
//! Rewriting is advisory: each finding gets a comment above it naming the
//! category and the suggested fix. Lines already annotated are skipped, so
//! repeated runs do not stack comments.

use super::CleanupPlan;
use super::edits::{indentation, line_offset};
use crate::analysis::Analysis;
use crate::analysis::fragility::REWRITE_MARKER;
use crate::model::{ActionType, CleanupAction, Ecosystem, PatternCategory, PatternFinding};
use std::collections::BTreeMap;

/// Comment line inserted above a finding.
#[must_use]
pub fn annotation(finding: &PatternFinding, ecosystem: Ecosystem, indent: &str) -> String {
    format!(
        "{indent}{} {REWRITE_MARKER}({}): {}\n",
        ecosystem.comment_prefix(),
        finding.category,
        finding.suggestion
    )
}

fn describe(findings: &[&PatternFinding]) -> String {
    let mut categories: Vec<PatternCategory> = findings.iter().map(|f| f.category).collect();
    categories.sort();
    categories.dedup();
    let lines: Vec<String> = findings.iter().map(|f| f.line.to_string()).collect();
    format!(
        "rewrite: {} non-deterministic pattern(s) ({}) at line(s) {}",
        findings.len(),
        categories.iter().map(PatternCategory::as_str).collect::<Vec<_>>().join(", "),
        lines.join(", ")
    )
}

/// Queue annotations and one `rewrite` action per affected test, or per
/// file for findings outside any test.
pub fn plan(analysis: &Analysis, plan: &mut CleanupPlan) {
    for candidate in &analysis.report.rewrite_candidates {
        let Some(file) = analysis.file(&candidate.file_path) else {
            continue;
        };
        if plan.edits.is_deleted(&file.path) {
            continue;
        }
        let lines: Vec<&str> = file.source.lines().collect();
        let mut by_owner: BTreeMap<String, Vec<&PatternFinding>> = BTreeMap::new();

        for finding in &candidate.findings {
            let owner = file.test_at_line(finding.line);
            if owner.is_some_and(|test| plan.removed_tests.contains(&test.qualified_name)) {
                continue;
            }
            let annotated = finding
                .line
                .checked_sub(2)
                .and_then(|i| lines.get(i))
                .is_some_and(|prev| prev.contains(REWRITE_MARKER));
            if annotated {
                continue;
            }
            let indent = lines
                .get(finding.line.saturating_sub(1))
                .map_or("", |line| indentation(line));
            plan.edits.insert(
                &file.path,
                line_offset(&file.source, finding.line),
                annotation(finding, file.ecosystem, indent),
            );
            let key =
                owner.map_or_else(|| file.rel_path.clone(), |test| test.qualified_name.clone());
            by_owner.entry(key).or_default().push(finding);
        }

        for (owner, findings) in by_owner {
            let before = analysis.history.get(&owner).cloned();
            plan.push(
                CleanupAction::new(ActionType::Rewrite, owner, describe(&findings))
                    .with_before(before),
                vec![file.path.clone()],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::config::JanitorConfig;
    use crate::output::SilentReporter;
    use std::fs;
    use tempfile::TempDir;

    const SOURCE: &str = "import time\nimport random\n\n\n\
                          def test_wait():\n    time.sleep(1)\n    assert random.random() < 2\n";

    #[test]
    fn annotates_each_finding() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tests/test_wait.py");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, SOURCE).unwrap();

        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        let mut plan = CleanupPlan::default();
        super::plan(&analysis, &mut plan);

        assert_eq!(plan.count(ActionType::Rewrite), 1);
        let action = &plan.actions[0].action;
        assert_eq!(action.test_name, "tests/test_wait.py::test_wait");
        assert!(action.reason.contains("timing, randomness"));

        let rendered = plan.edits.get(&path).unwrap().render(SOURCE);
        insta::assert_snapshot!(rendered, @r"
        import time
        import random


        def test_wait():
            # TJ-REWRITE(timing): Replace sleep with fixture-driven state or a frozen clock (freezegun, monkeypatch)
            time.sleep(1)
            # TJ-REWRITE(randomness): Inject a fixed seed or pass generated values (ids, timestamps) in explicitly
            assert random.random() < 2
        ");

        // Once annotated, a second pass finds nothing new.
        fs::write(&path, &rendered).unwrap();
        let again = analyze(&config, &SilentReporter).unwrap();
        let mut second = CleanupPlan::default();
        super::plan(&again, &mut second);
        assert!(second.actions.is_empty());
    }
}
