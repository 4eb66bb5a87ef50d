//! `TESTING_STANDARDS.md`: the conventions and thresholds this suite is held to.

use super::{DocInputs, MarkdownTable, bullet_list};
use crate::analysis::fragility::suggestion_for;
use crate::analysis::obsolescence::DEFAULT_MARKERS;
use crate::cleanup::fixtures::{JS_FIXTURE_FILE, PYTHON_FIXTURE_FILE};
use crate::model::{Ecosystem, PatternCategory};

fn naming(inputs: &DocInputs<'_>) -> String {
    let count = |eco: Ecosystem| {
        inputs
            .analysis
            .files_by_ecosystem
            .get(&eco)
            .copied()
            .unwrap_or(0)
    };
    let mut table = MarkdownTable::new(["Ecosystem", "Runner", "File names", "Files found"]);
    table
        .row([
            "Python".to_string(),
            Ecosystem::Python.runner_name().to_string(),
            "`test_*.py`, `*_test.py`".to_string(),
            count(Ecosystem::Python).to_string(),
        ])
        .row([
            "JavaScript".to_string(),
            Ecosystem::JavaScript.runner_name().to_string(),
            "`*.test.{js,jsx,ts,tsx,mjs,cjs}`, `*.spec.*`".to_string(),
            count(Ecosystem::JavaScript).to_string(),
        ]);

    let mut out = String::from("## Naming\n\n");
    out.push_str(&table.render());
    out.push_str(
        "\nPython tests are functions named `test_*`, optionally grouped in `Test*` classes. \
         JavaScript tests are `test(...)` or `it(...)` calls, grouped with `describe(...)`. \
         Names describe the behavior under test, not the implementation.\n",
    );
    out
}

fn structure() -> String {
    let mut out = String::from("## Structure\n\n");
    out.push_str(&bullet_list(
        [
            "One behavior per test; split tests whose assertions check unrelated outcomes.",
            "Keep setup short. Setup repeated across tests belongs in a shared fixture.",
            "Every test asserts something. A test without assertions only checks that nothing throws.",
            "Prefer a docstring or a descriptive title over comments explaining intent.",
        ],
        "",
    ));
    out
}

fn determinism() -> String {
    let mut table = MarkdownTable::new(["Pattern", "Python", "JavaScript"]);
    for category in PatternCategory::ALL {
        table.row([
            category.as_str(),
            suggestion_for(category, Ecosystem::Python),
            suggestion_for(category, Ecosystem::JavaScript),
        ]);
    }
    let mut out = String::from("## Determinism\n\n");
    out.push_str(
        "Tests must give the same result on every run. These patterns are flagged during \
         analysis and annotated with `TJ-REWRITE` comments:\n\n",
    );
    out.push_str(&table.render());
    out.push_str(
        "\nExternal calls on lines that mention `mock` or `patch` are treated as mocked.\n",
    );
    out
}

fn reliability(inputs: &DocInputs<'_>) -> String {
    let analysis = &inputs.config.analysis;
    let validation = &inputs.config.validation;
    let mut table = MarkdownTable::new(["Rule", "Threshold"]);
    table
        .row([
            "Fragile: historical failure rate at or above".to_string(),
            format!("{:.1}%", analysis.fragile_threshold * 100.0),
        ])
        .row([
            "Flaky: pass rate over repeated runs above 0 and below".to_string(),
            format!("{:.1}%", validation.stability_threshold * 100.0),
        ])
        .row([
            "Repeated runs per probed test".to_string(),
            validation.iterations.to_string(),
        ])
        .row([
            "Duplicate: name similarity above".to_string(),
            format!("{:.2}", analysis.name_threshold),
        ])
        .row([
            "Duplicate: assertion overlap (Jaccard) above".to_string(),
            format!("{:.2}", analysis.assertion_threshold),
        ])
        .row([
            "Redundant coverage: line overlap (Jaccard) at or above".to_string(),
            format!("{:.2}", analysis.overlap_threshold),
        ]);

    let mut out = String::from("## Reliability\n\n");
    out.push_str(&table.render());
    out.push_str(
        "\nFragile tests are kept and rewritten, never deleted. A test that always fails is \
         failing, not flaky, and must be fixed before merging.\n",
    );
    out
}

fn fixtures() -> String {
    format!(
        "## Fixtures\n\n\
         Shared Python fixtures live in `{PYTHON_FIXTURE_FILE}` in the closest common test \
         directory. Shared JavaScript setup lives in `{JS_FIXTURE_FILE}`. Extracted fixtures are \
         named `shared_<resource>` (Python) or `shared<Resource>` (JavaScript) after the \
         resource they build.\n"
    )
}

fn maintenance(inputs: &DocInputs<'_>) -> String {
    let mut markers: Vec<String> = DEFAULT_MARKERS.iter().map(|m| format!("`{m}`")).collect();
    markers.extend(
        inputs
            .config
            .analysis
            .deprecation_markers
            .iter()
            .map(|m| format!("`{m}`")),
    );
    format!(
        "## Maintenance\n\n\
         Tests or files carrying a deprecation marker ({}) are removed during cleanup, as are \
         files importing modules that no longer resolve. Mark dead tests explicitly instead of \
         commenting them out, and review `cleanup_log.json` before merging a cleanup.\n",
        markers.join(", ")
    )
}

/// Render the standards document.
#[must_use]
pub fn render(inputs: &DocInputs<'_>) -> String {
    let mut out = String::from("# Testing Standards\n\n");
    out.push_str(&format!(
        "Conventions for the test suite in `{}`.\n\n",
        inputs.analysis.target
    ));
    for section in [
        naming(inputs),
        structure(),
        determinism(),
        reliability(inputs),
        fixtures(),
        maintenance(inputs),
    ] {
        out.push_str(&section);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JanitorConfig;
    use crate::model::AnalysisReport;
    use std::path::Path;

    #[test]
    fn thresholds_come_from_config() {
        let mut config = JanitorConfig::defaults_for(Path::new("/repo"));
        config.analysis.fragile_threshold = 0.1;
        config.analysis.deprecation_markers = vec!["sunset".into()];
        let mut report = AnalysisReport::empty("/repo");
        report.files_by_ecosystem.insert(Ecosystem::Python, 4);
        let inputs = DocInputs {
            config: &config,
            analysis: &report,
            cleanup: None,
            validation: None,
        };
        let doc = render(&inputs);
        assert!(doc.starts_with("# Testing Standards\n"));
        assert!(doc.contains("| Fragile: historical failure rate at or above "));
        assert!(doc.contains("10.0%"));
        assert!(doc.contains("`sunset`"));
        assert!(doc.contains("| pytest "));
        assert!(doc.contains("vi.useFakeTimers()"));
    }
}
