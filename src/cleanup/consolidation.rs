//! Duplicate consolidation.
//!
//! Each group becomes one generated test appended to the first member's
//! file; every member's span is removed. Member statements are concatenated
//! in group order, dropping any statement whose whitespace-normalized text
//! was already emitted, so the merged test carries each unique assertion
//! and setup line once.

use super::CleanupPlan;
use super::edits::{line_offset, line_span};
use crate::analysis::Analysis;
use crate::analysis::syntax::{ParsedTestFile, TestFunction};
use crate::model::{ActionType, CleanupAction, Ecosystem, TestGroup};
use crate::util::normalize_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;

static PY_PARAMS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)def\s+\w+\s*\((.*?)\)\s*(?:->[^:]*)?:").expect("static pattern is valid")
});
static JS_CALLEE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(test|it)\b").expect("static pattern is valid"));

/// Merged test name from the words every member name shares.
///
/// Python names split on `_`, JavaScript titles on whitespace. With no
/// shared words beyond `test`, the first name gets a `_consolidated` suffix
/// (` consolidated` for JavaScript titles).
#[must_use]
pub fn merged_name(names: &[&str], ecosystem: Ecosystem) -> String {
    let Some((first, rest)) = names.split_first() else {
        return String::new();
    };
    let split = |name: &str| -> Vec<String> {
        match ecosystem {
            Ecosystem::Python => name
                .split('_')
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect(),
            Ecosystem::JavaScript => name.split_whitespace().map(str::to_string).collect(),
        }
    };
    let others: Vec<BTreeSet<String>> =
        rest.iter().map(|n| split(n).into_iter().collect()).collect();
    let mut seen = BTreeSet::new();
    let common: Vec<String> = split(first)
        .into_iter()
        .filter(|word| others.iter().all(|set| set.contains(word)))
        .filter(|word| seen.insert(word.clone()))
        .collect();

    match ecosystem {
        Ecosystem::Python => {
            let meaningful = common.iter().any(|w| w != "test");
            if !meaningful {
                return format!("{first}_consolidated");
            }
            let joined = common.join("_");
            if joined.starts_with("test") {
                joined
            } else {
                format!("test_{joined}")
            }
        }
        Ecosystem::JavaScript => {
            if common.is_empty() {
                format!("{first} consolidated")
            } else {
                common.join(" ")
            }
        }
    }
}

fn split_params(raw: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in raw.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                params.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    params.push(current);
    params
        .into_iter()
        .map(|p| p.split([':', '=']).next().unwrap_or("").trim().to_string())
        .filter(|p| !p.is_empty() && p != "self" && p != "cls" && !p.starts_with('*') && p != "/")
        .collect()
}

fn span_text<'a>(file: &'a ParsedTestFile, test: &TestFunction) -> &'a str {
    file.source.get(test.start_byte..test.end_byte).unwrap_or("")
}

/// Fixture parameters of a pytest function.
fn python_params(file: &ParsedTestFile, test: &TestFunction) -> Vec<String> {
    PY_PARAMS_RE
        .captures(span_text(file, test))
        .and_then(|caps| caps.get(1))
        .map(|m| split_params(m.as_str()))
        .unwrap_or_default()
}

fn is_async(file: &ParsedTestFile, test: &TestFunction) -> bool {
    let text = span_text(file, test);
    match file.ecosystem {
        Ecosystem::Python => text
            .find("def ")
            .is_some_and(|idx| text[..idx].trim_end().ends_with("async")),
        Ecosystem::JavaScript => {
            let header_end = text.find("=>").or_else(|| text.find('{')).unwrap_or(text.len());
            text[..header_end].contains("async")
        }
    }
}

/// Top-level single-line import statements, with 1-based line numbers.
pub(super) fn top_level_imports(source: &str, ecosystem: Ecosystem) -> Vec<(usize, String)> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.starts_with(char::is_whitespace))
        .filter(|(_, line)| match ecosystem {
            Ecosystem::Python => {
                (line.starts_with("import ") || line.starts_with("from "))
                    && !line.trim_end().ends_with('(')
                    && !line.trim_end().ends_with('\\')
            }
            Ecosystem::JavaScript => {
                line.starts_with("import ")
                    && (line.contains(" from ") || line.contains('\'') || line.contains('"'))
                    && !line.trim_end().ends_with('{')
            }
        })
        .map(|(i, line)| (i + 1, line.trim_end().to_string()))
        .collect()
}

fn indent_block(block: &str, indent: &str) -> String {
    block
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Member statements in first-seen order, each normalized text once.
fn merged_body(members: &[(&ParsedTestFile, &TestFunction)]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    members
        .iter()
        .flat_map(|(_, test)| test.body.iter())
        .filter(|statement| seen.insert(normalize_whitespace(statement)))
        .cloned()
        .collect()
}

fn unique_assertions(members: &[(&ParsedTestFile, &TestFunction)]) -> usize {
    members
        .iter()
        .flat_map(|(_, test)| test.assertions.iter())
        .collect::<BTreeSet<_>>()
        .len()
}

fn render_python(name: &str, members: &[(&ParsedTestFile, &TestFunction)]) -> String {
    let mut decorators: Vec<&str> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    for (file, test) in members {
        for decorator in &test.decorators {
            if !decorators.contains(&decorator.as_str()) {
                decorators.push(decorator);
            }
        }
        for param in python_params(file, test) {
            if !params.contains(&param) {
                params.push(param);
            }
        }
    }
    let asynchronous = members.iter().any(|(file, test)| is_async(file, test));

    let sources: Vec<&str> = members.iter().map(|(_, t)| t.qualified_name.as_str()).collect();
    let mut doc = vec![format!(
        "Consolidated from {} tests: {}.",
        members.len(),
        sources.join(", ")
    )];
    let mut seen_docs = BTreeSet::new();
    for (_, test) in members {
        if let Some(docstring) = test.docstring.as_deref().filter(|d| !d.is_empty()) {
            if seen_docs.insert(docstring) {
                doc.push(String::new());
                doc.push(docstring.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\""));
            }
        }
    }

    let mut out = String::new();
    for decorator in decorators {
        out.push_str(decorator);
        out.push('\n');
    }
    let prefix = if asynchronous { "async " } else { "" };
    out.push_str(&format!("{prefix}def {name}({}):\n", params.join(", ")));
    out.push_str(&indent_block(&format!("\"\"\"{}\n\"\"\"", doc.join("\n")), "    "));
    out.push('\n');
    let body = merged_body(members);
    if body.is_empty() {
        out.push_str("    pass\n");
    }
    for statement in body {
        out.push_str(&indent_block(&statement, "    "));
        out.push('\n');
    }
    out
}

fn render_javascript(name: &str, members: &[(&ParsedTestFile, &TestFunction)]) -> String {
    let callee = members
        .first()
        .and_then(|(file, test)| JS_CALLEE_RE.captures(span_text(file, test)))
        .and_then(|caps| caps.get(1))
        .map_or("test", |m| m.as_str());
    let asynchronous = members.iter().any(|(file, test)| is_async(file, test));
    let title = name.replace('\\', "\\\\").replace('\'', "\\'");
    let sources: Vec<&str> = members.iter().map(|(_, t)| t.qualified_name.as_str()).collect();

    let mut out = format!(
        "{callee}('{title}', {}() => {{\n  // Consolidated from {} tests: {}\n",
        if asynchronous { "async " } else { "" },
        members.len(),
        sources.join(", ")
    );
    for statement in merged_body(members) {
        out.push_str(&indent_block(&statement, "  "));
        out.push('\n');
    }
    out.push_str("});\n");
    out
}

/// Why a group is left alone, if it is.
fn blocker(members: &[(&ParsedTestFile, &TestFunction)]) -> Option<&'static str> {
    for (file, test) in members {
        match file.ecosystem {
            Ecosystem::Python if !test.scope.is_empty() => {
                return Some("class-scoped tests share instance state");
            }
            Ecosystem::Python if test.decorators.iter().any(|d| d.contains("parametrize")) => {
                return Some("parametrized tests cannot be merged safely");
            }
            Ecosystem::JavaScript if test.decorators.iter().any(|d| d.starts_with(".each")) => {
                return Some("table-driven tests cannot be merged safely");
            }
            Ecosystem::JavaScript if !test.scope.is_empty() => {
                return Some("describe-scoped tests depend on their block's hooks and bindings");
            }
            _ => {}
        }
    }
    None
}

fn consolidate(analysis: &Analysis, group: &TestGroup, plan: &mut CleanupPlan) {
    let members: Vec<(&ParsedTestFile, &TestFunction)> =
        group.tests.iter().filter_map(|name| analysis.test(name)).collect();
    let Some((first_file, first_test)) = members.first().copied() else {
        return;
    };
    if members.len() < 2 {
        return;
    }
    if let Some(reason) = blocker(&members) {
        for (_, test) in &members {
            plan.push(
                CleanupAction::new(
                    ActionType::Keep,
                    &test.qualified_name,
                    format!("duplicate not consolidated: {reason}"),
                ),
                Vec::new(),
            );
        }
        return;
    }

    let ecosystem = first_file.ecosystem;
    let names: Vec<&str> = members.iter().map(|(_, t)| t.name.as_str()).collect();
    let mut name = merged_name(&names, ecosystem);
    let member_names: BTreeSet<&str> =
        members.iter().map(|(_, t)| t.qualified_name.as_str()).collect();
    let clashes = first_file
        .tests
        .iter()
        .any(|t| t.name == name && !member_names.contains(t.qualified_name.as_str()));
    if clashes {
        name = match ecosystem {
            Ecosystem::Python => format!("{name}_consolidated"),
            Ecosystem::JavaScript => format!("{name} consolidated"),
        };
    }

    let code = match ecosystem {
        Ecosystem::Python => render_python(&name, &members),
        Ecosystem::JavaScript => render_javascript(&name, &members),
    };

    // Imports the merged body may need from the other members' files.
    let existing: BTreeSet<String> = top_level_imports(&first_file.source, ecosystem)
        .into_iter()
        .map(|(_, line)| line)
        .collect();
    let mut missing: Vec<String> = Vec::new();
    for (file, _) in members.iter().skip(1) {
        for (_, line) in top_level_imports(&file.source, ecosystem) {
            if !existing.contains(&line) && !missing.contains(&line) {
                missing.push(line);
            }
        }
    }
    if !missing.is_empty() {
        let after = top_level_imports(&first_file.source, ecosystem)
            .last()
            .map_or(1, |(line, _)| line + 1);
        let at = line_offset(&first_file.source, after);
        let mut text = missing.join("\n");
        text.push('\n');
        plan.edits.insert(&first_file.path, at, text);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for (file, test) in &members {
        let (start, end) = line_span(&file.source, test.start_byte, test.end_byte);
        plan.edits.replace(&file.path, start, end, "");
        plan.removed_tests.insert(test.qualified_name.clone());
        if !files.contains(&file.path) {
            files.push(file.path.clone());
        }
    }
    plan.edits.append(&first_file.path, code);

    let merged_id = format!("{}::{name}", first_file.rel_path);
    let reason = format!(
        "merged {} tests ({}) with similarity {:.2}; {} unique assertions kept",
        members.len(),
        members
            .iter()
            .map(|(_, t)| t.qualified_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        group.similarity_score,
        unique_assertions(&members)
    );
    plan.push(
        CleanupAction::new(ActionType::Merge, merged_id, reason)
            .with_before(analysis.history.get(&first_test.qualified_name).cloned()),
        files,
    );
}

/// Queue one merge per duplicate group.
pub fn plan(analysis: &Analysis, plan: &mut CleanupPlan) {
    for group in &analysis.report.duplicate_groups {
        consolidate(analysis, group, plan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::config::JanitorConfig;
    use crate::output::SilentReporter;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn merged_names() {
        assert_eq!(
            merged_name(&["test_login_ok", "test_login_fail"], Ecosystem::Python),
            "test_login"
        );
        assert_eq!(
            merged_name(&["test_alpha", "test_beta"], Ecosystem::Python),
            "test_alpha_consolidated"
        );
        assert_eq!(
            merged_name(&["adds two numbers", "adds numbers quickly"], Ecosystem::JavaScript),
            "adds numbers"
        );
        assert_eq!(
            merged_name(&["a", "b"], Ecosystem::JavaScript),
            "a consolidated"
        );
    }

    #[test]
    fn params_skip_self_and_defaults() {
        assert_eq!(
            split_params("self, client, db: Session = None, *args, **kw"),
            vec!["client", "db"]
        );
        assert_eq!(split_params("data=dict(a=1, b=2), tmp_path"), vec!["data", "tmp_path"]);
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn python_group_is_merged_into_first_file() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "tests/test_a.py",
            "import math\n\n\ndef test_root(tmp_path):\n    \"\"\"Square roots.\"\"\"\n    assert math.sqrt(4) == 2\n",
        );
        write(
            temp.path(),
            "tests/test_b.py",
            "import json\n\n\ndef test_root():\n    value = json.loads('9')\n    assert value == 9\n",
        );
        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        assert_eq!(analysis.report.duplicate_groups.len(), 1);

        let mut plan = CleanupPlan::default();
        super::plan(&analysis, &mut plan);
        assert_eq!(plan.count(ActionType::Merge), 1);
        assert_eq!(plan.actions[0].action.test_name, "tests/test_a.py::test_root");

        let a = temp.path().join("tests/test_a.py");
        let rendered = plan.edits.get(&a).unwrap().render(&fs::read_to_string(&a).unwrap());
        insta::assert_snapshot!(rendered, @r#"
        import math
        import json


        def test_root(tmp_path):
            """Consolidated from 2 tests: tests/test_a.py::test_root, tests/test_b.py::test_root.

            Square roots.
            """
            assert math.sqrt(4) == 2
            value = json.loads('9')
            assert value == 9
        "#);

        let b = temp.path().join("tests/test_b.py");
        let rendered_b = plan.edits.get(&b).unwrap().render(&fs::read_to_string(&b).unwrap());
        assert_eq!(rendered_b, "import json\n");
    }

    #[test]
    fn merged_body_keeps_each_statement_once() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "tests/test_a.py",
            "def test_widget():\n    c = make()\n    assert c.ok\n    assert c.x == 1\n",
        );
        write(
            temp.path(),
            "tests/test_b.py",
            "def test_widget():\n    c  =  make()\n    assert c.ok\n    assert c.y == 2\n",
        );
        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        assert_eq!(analysis.report.duplicate_groups.len(), 1);

        let mut plan = CleanupPlan::default();
        super::plan(&analysis, &mut plan);
        assert_eq!(plan.count(ActionType::Merge), 1);

        let a = temp.path().join("tests/test_a.py");
        let rendered = plan.edits.get(&a).unwrap().render(&fs::read_to_string(&a).unwrap());
        assert_eq!(rendered.matches("make()").count(), 1);
        assert_eq!(rendered.matches("assert c.ok").count(), 1);
        assert!(rendered.contains("assert c.x == 1"));
        assert!(rendered.contains("assert c.y == 2"));
        assert!(rendered.find("assert c.x == 1") < rendered.find("assert c.y == 2"));
    }

    #[test]
    fn describe_scoped_group_is_kept() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "web/cart.test.ts",
            "describe('cart', () => {\n  let cart;\n  beforeEach(() => {\n    cart = makeCart();\n  });\n\n  it('adds item', () => {\n    expect(cart.add(1)).toBe(1);\n  });\n\n  it('adds item', () => {\n    expect(cart.add(1)).toBe(1);\n  });\n});\n",
        );
        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        assert_eq!(analysis.report.duplicate_groups.len(), 1);

        let mut plan = CleanupPlan::default();
        super::plan(&analysis, &mut plan);
        assert_eq!(plan.count(ActionType::Merge), 0);
        assert_eq!(plan.count(ActionType::Keep), 2);
        assert!(plan.actions.iter().all(|a| a.action.reason.contains("describe-scoped")));
        assert!(plan.edits.get(&temp.path().join("web/cart.test.ts")).is_none());
    }

    #[test]
    fn javascript_group_is_merged() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "web/a.test.ts",
            "import { test, expect } from 'vitest';\n\ntest('adds numbers', () => {\n  expect(1 + 1).toBe(2);\n});\n\ntest('adds numbers', async () => {\n  const r = await Promise.resolve(3);\n  expect(r).toBe(3);\n});\n",
        );
        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        assert_eq!(analysis.report.duplicate_groups.len(), 1);

        let mut plan = CleanupPlan::default();
        super::plan(&analysis, &mut plan);
        let path = temp.path().join("web/a.test.ts");
        let rendered = plan.edits.get(&path).unwrap().render(&fs::read_to_string(&path).unwrap());
        insta::assert_snapshot!(rendered, @r"
        import { test, expect } from 'vitest';


        test('adds numbers', async () => {
          // Consolidated from 2 tests: web/a.test.ts::adds numbers, web/a.test.ts::adds numbers#2
          expect(1 + 1).toBe(2);
          const r = await Promise.resolve(3);
          expect(r).toBe(3);
        });
        ");
    }
}
