//! `TESTING_EXAMPLES.md`: anti-patterns found in this suite, next to fixes.

use super::{DocInputs, bullet_list};
use crate::model::{Ecosystem, GroupKind, PatternCategory, PatternFinding};
use std::collections::BTreeMap;

const EXAMPLES_PER_CATEGORY: usize = 3;
const GROUPS_SHOWN: usize = 5;

const fn fence(ecosystem: Ecosystem) -> &'static str {
    match ecosystem {
        Ecosystem::Python => "python",
        Ecosystem::JavaScript => "ts",
    }
}

/// Fallback illustration when the suite has no finding of a category.
const fn canonical(category: PatternCategory) -> (&'static str, &'static str) {
    match category {
        PatternCategory::Timing => (
            "time.sleep(2)\nassert job.done",
            "def test_job_finishes(frozen_clock):\n    frozen_clock.tick(2)\n    assert job.done",
        ),
        PatternCategory::Randomness => (
            "order_id = uuid.uuid4()\nassert create(order_id).ok",
            "def test_create_order():\n    assert create(\"order-1\").ok",
        ),
        PatternCategory::ExternalCall => (
            "resp = requests.get(\"https://api.example.com/users\")\nassert resp.status_code == 200",
            "@patch(\"app.client.requests.get\")\ndef test_users(mock_get):\n    mock_get.return_value.status_code = 200\n    assert fetch_users().ok",
        ),
        PatternCategory::GlobalState => (
            "os.environ[\"MODE\"] = \"debug\"\nassert settings().debug",
            "def test_debug_mode(monkeypatch):\n    monkeypatch.setenv(\"MODE\", \"debug\")\n    assert settings().debug",
        ),
    }
}

fn code_block(language: &str, body: &str) -> String {
    format!("```{language}\n{}\n```\n", body.trim_end())
}

fn pattern_section(inputs: &DocInputs<'_>) -> String {
    let mut by_category: BTreeMap<PatternCategory, Vec<(&str, Ecosystem, &PatternFinding)>> =
        BTreeMap::new();
    for candidate in &inputs.analysis.rewrite_candidates {
        for finding in &candidate.findings {
            by_category.entry(finding.category).or_default().push((
                candidate.file_path.as_str(),
                candidate.ecosystem,
                finding,
            ));
        }
    }

    let mut out = String::from("## Non-deterministic patterns\n\n");
    for category in PatternCategory::ALL {
        out.push_str(&format!("### {category}\n\n"));
        match by_category.get(&category) {
            Some(found) => {
                out.push_str(&format!("Found {} occurrence(s) in this suite.\n\n", found.len()));
                for (file, ecosystem, finding) in found.iter().take(EXAMPLES_PER_CATEGORY) {
                    out.push_str(&format!("`{file}:{}`\n\n", finding.line));
                    out.push_str(&code_block(fence(*ecosystem), &finding.snippet));
                    out.push_str(&format!("\nFix: {}\n\n", finding.suggestion));
                }
            }
            None => {
                let (bad, good) = canonical(category);
                out.push_str("None found. For reference:\n\nAvoid:\n\n");
                out.push_str(&code_block("python", bad));
                out.push_str("\nPrefer:\n\n");
                out.push_str(&code_block("python", good));
                out.push('\n');
            }
        }
    }
    out
}

fn duplicate_section(inputs: &DocInputs<'_>) -> String {
    let groups = &inputs.analysis.duplicate_groups;
    let mut out = String::from("## Duplicated tests\n\n");
    if groups.is_empty() {
        out.push_str("_No duplicate groups were found._\n");
        return out;
    }
    out.push_str(&format!(
        "{} group(s) of near-identical tests. Merge each group into one test that keeps every \
         distinct assertion.\n\n",
        groups.len()
    ));
    for (i, group) in groups.iter().take(GROUPS_SHOWN).enumerate() {
        let kind = match group.kind {
            GroupKind::Exact => "identical names",
            GroupKind::Similar => "similar names or assertions",
        };
        out.push_str(&format!(
            "### Group {} ({kind}, similarity {:.2})\n\n",
            i + 1,
            group.similarity_score
        ));
        out.push_str(&bullet_list(group.tests.iter().map(|t| format!("`{t}`")), ""));
        if !group.shared_assertions.is_empty() {
            out.push_str("\nShared assertions:\n\n");
            out.push_str(&code_block("", &group.shared_assertions.join("\n")));
        }
        out.push('\n');
    }
    if groups.len() > GROUPS_SHOWN {
        out.push_str(&format!(
            "_{} more group(s) in `analysis_report.json`._\n",
            groups.len() - GROUPS_SHOWN
        ));
    }
    out
}

fn obsolete_section(inputs: &DocInputs<'_>) -> String {
    let findings = &inputs.analysis.obsolete_findings;
    let mut out = String::from("## Obsolete tests\n\n");
    out.push_str(&bullet_list(
        findings.iter().map(|finding| {
            let target = finding.test_name.as_deref().unwrap_or(&finding.file_path);
            format!("`{target}`: {}", finding.reason)
        }),
        "No obsolete tests were found.",
    ));
    out
}

fn good_patterns() -> String {
    let mut out = String::from("## Patterns to follow\n\n### Shared fixture\n\n");
    out.push_str(&code_block(
        "python",
        "@pytest.fixture\ndef shared_client():\n    return make_client()\n\n\ndef test_lists_users(shared_client):\n    assert shared_client.users() == []",
    ));
    out.push_str("\n### Table-driven cases\n\n");
    out.push_str(&code_block(
        "ts",
        "test.each([\n  [1, 1, 2],\n  [2, 3, 5],\n])('adds %i + %i', (a, b, sum) => {\n  expect(add(a, b)).toBe(sum);\n});",
    ));
    out
}

/// Render the examples document.
#[must_use]
pub fn render(inputs: &DocInputs<'_>) -> String {
    let mut out = String::from("# Testing Examples\n\n");
    out.push_str("Examples taken from this suite's analysis, with the preferred alternative.\n\n");
    for section in [
        pattern_section(inputs),
        duplicate_section(inputs),
        obsolete_section(inputs),
        good_patterns(),
    ] {
        out.push_str(&section);
        out.push('\n');
    }
    out
}
