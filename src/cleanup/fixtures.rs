//! Shared fixture extraction from repeated setup statements.
//!
//! Setup statements (neither docstring nor assertion) are compared after
//! whitespace normalization. A statement that appears in at least
//! `min_frequency` distinct tests becomes a named fixture: a pytest fixture
//! in `conftest.py`, or an exported setup function in
//! `test-setup.shared.js`, placed in the nearest common directory of the
//! tests that repeat it. Top-level imports that bind a name the statement
//! uses are copied along, with relative specifiers rebased onto the fixture
//! file's directory. Existing tests are left as they are.

use super::CleanupPlan;
use super::consolidation::top_level_imports;
use super::edits::line_offset;
use crate::analysis::Analysis;
use crate::analysis::syntax::ParsedTestFile;
use crate::model::{ActionType, CleanupAction, Ecosystem};
use crate::util::relative_display;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const PYTHON_FIXTURE_FILE: &str = "conftest.py";
pub const JS_FIXTURE_FILE: &str = "test-setup.shared.js";

static PY_ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*(?::[^=]+)?=[^=]").expect("static pattern is valid")
});
static JS_ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=").expect("static pattern is valid")
});
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_$][\w$]*").expect("static pattern is valid"));
static PY_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^from\s+(\.*)([\w.]*)\s+import\s+(.+)$").expect("static pattern is valid")
});
static JS_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^import\s+(?:type\s+)?(.+?)\s+from\s+(['"])([^'"]+)['"]"#)
        .expect("static pattern is valid")
});

const PY_SKIP_PREFIXES: &[&str] = &[
    "if ", "for ", "while ", "with ", "try", "def ", "class ", "async ", "return", "yield", "raise",
    "del ", "global ", "nonlocal ", "@",
];
const JS_SKIP_PREFIXES: &[&str] = &[
    "if ", "if(", "for ", "for(", "while", "do ", "try", "switch", "return", "throw", "function ",
    "class ", "describe(", "test(", "it(",
];

/// A setup statement promoted to a shared fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFixture {
    pub name: String,
    pub statement: String,
    pub ecosystem: Ecosystem,
    /// Qualified names of the tests repeating the statement.
    pub tests: Vec<String>,
    /// File the fixture is written to.
    pub location: PathBuf,
    /// Variable the statement assigns, returned from the fixture.
    pub returns: Option<String>,
    /// Import lines the statement needs, valid from `location`.
    pub imports: Vec<String>,
}

/// Statements that survive being lifted out of their test unchanged.
fn extractable(statement: &str, ecosystem: Ecosystem) -> bool {
    if statement.is_empty() || statement.contains("await") {
        return false;
    }
    match ecosystem {
        Ecosystem::Python => {
            !statement.contains('#') && !PY_SKIP_PREFIXES.iter().any(|p| statement.starts_with(p))
        }
        Ecosystem::JavaScript => {
            !statement.contains("//") && !JS_SKIP_PREFIXES.iter().any(|p| statement.starts_with(p))
        }
    }
}

fn assigned_variable(statement: &str, ecosystem: Ecosystem) -> Option<String> {
    let re = match ecosystem {
        Ecosystem::Python => &*PY_ASSIGN_RE,
        Ecosystem::JavaScript => &*JS_ASSIGN_RE,
    };
    re.captures(statement)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Base name from the assigned variable, or from keywords in the statement.
#[must_use]
pub fn base_name(statement: &str, ecosystem: Ecosystem) -> String {
    if let Some(var) = assigned_variable(statement, ecosystem) {
        return var;
    }
    let lower = statement.to_lowercase();
    let keyword = [
        ("client", "client"),
        ("database", "database"),
        ("session", "database"),
        ("db", "database"),
        ("user", "user"),
        ("config", "config"),
        ("settings", "config"),
    ]
    .iter()
    .find(|(needle, _)| lower.contains(needle))
    .map_or("setup", |(_, name)| name);
    keyword.to_string()
}

fn fixture_name(base: &str, ecosystem: Ecosystem) -> String {
    match ecosystem {
        Ecosystem::Python => format!("shared_{}", base.trim_start_matches('_')),
        Ecosystem::JavaScript => {
            let mut chars = base.trim_start_matches(['_', '$']).chars();
            let capitalized = chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default();
            format!("shared{capitalized}")
        }
    }
}

fn common_ancestor<'a, I: IntoIterator<Item = &'a Path>>(paths: I) -> Option<PathBuf> {
    let mut dirs = paths.into_iter().map(|p| p.parent().unwrap_or(p));
    let first = dirs.next()?.to_path_buf();
    Some(dirs.fold(first, |acc, dir| {
        acc.components()
            .zip(dir.components())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect()
    }))
}

/// Names an import line binds; `*` for a wildcard import.
fn bound_names(line: &str, ecosystem: Ecosystem) -> Vec<String> {
    let alias = |item: &str| -> Option<String> {
        let item = item.trim();
        let name = item.rsplit(" as ").next().unwrap_or(item).trim();
        (!name.is_empty()).then(|| name.to_string())
    };
    match ecosystem {
        Ecosystem::Python => {
            if let Some(caps) = PY_FROM_RE.captures(line) {
                let items = caps.get(3).map_or("", |m| m.as_str());
                let items = items.trim().trim_start_matches('(').trim_end_matches(')');
                items.split(',').filter_map(alias).collect()
            } else if let Some(rest) = line.strip_prefix("import ") {
                rest.split(',')
                    .filter_map(|item| {
                        let item = item.trim();
                        if item.contains(" as ") {
                            alias(item)
                        } else {
                            item.split('.').next().map(str::to_string)
                        }
                    })
                    .filter(|name| !name.is_empty())
                    .collect()
            } else {
                Vec::new()
            }
        }
        Ecosystem::JavaScript => {
            let Some(clause) = JS_IMPORT_RE.captures(line).and_then(|caps| caps.get(1)) else {
                return Vec::new();
            };
            let clause = clause.as_str();
            let mut names = Vec::new();
            let (outside, braced) = match (clause.find('{'), clause.rfind('}')) {
                (Some(open), Some(close)) if open < close => (
                    format!("{}{}", &clause[..open], &clause[close + 1..]),
                    &clause[open + 1..close],
                ),
                _ => (clause.to_string(), ""),
            };
            names.extend(braced.split(',').filter_map(alias));
            for part in outside.split(',') {
                let part = part.trim();
                if part.starts_with('*') {
                    names.extend(alias(part));
                } else if !part.is_empty() {
                    names.push(part.to_string());
                }
            }
            names
        }
    }
}

/// Directory path from `to` (an ancestor) down to `from`, as components.
fn descent(from: &Path, to: &Path) -> Option<Vec<String>> {
    let rel = from.strip_prefix(to).ok()?;
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect(),
    )
}

/// Rewrite an import written in `source_dir` so it resolves from `target_dir`.
/// `None` when the import cannot be expressed from there.
fn rebase_import(
    line: &str,
    ecosystem: Ecosystem,
    source_dir: &Path,
    target_dir: &Path,
) -> Option<String> {
    if source_dir == target_dir {
        return Some(line.to_string());
    }
    match ecosystem {
        Ecosystem::Python => {
            let Some(caps) = PY_FROM_RE.captures(line) else {
                return Some(line.to_string());
            };
            let dots = caps.get(1).map_or(0, |m| m.as_str().len());
            if dots == 0 {
                return Some(line.to_string());
            }
            let down = descent(source_dir, target_dir)?;
            let up = dots - 1;
            if up > down.len() {
                return None;
            }
            let mut parts: Vec<String> = down[..down.len() - up].to_vec();
            let module = caps.get(2).map_or("", |m| m.as_str());
            if !module.is_empty() {
                parts.push(module.to_string());
            }
            let names = caps.get(3).map_or("", |m| m.as_str());
            Some(format!("from .{} import {names}", parts.join(".")))
        }
        Ecosystem::JavaScript => {
            let Some(spec) = JS_IMPORT_RE.captures(line).and_then(|caps| caps.get(3)) else {
                return Some(line.to_string());
            };
            let specifier = spec.as_str();
            if !specifier.starts_with('.') {
                return Some(line.to_string());
            }
            let mut parts = descent(source_dir, target_dir)?;
            for segment in specifier.split('/') {
                match segment {
                    "." | "" => {}
                    ".." => {
                        parts.pop()?;
                    }
                    other => parts.push(other.to_string()),
                }
            }
            let rebased = format!("./{}", parts.join("/"));
            Some(format!("{}{rebased}{}", &line[..spec.start()], &line[spec.end()..]))
        }
    }
}

/// Import lines from `files` binding any identifier used by `statement`.
fn needed_imports(
    statement: &str,
    ecosystem: Ecosystem,
    files: &[&ParsedTestFile],
    target_dir: &Path,
) -> Vec<String> {
    let used: BTreeSet<&str> = IDENT_RE.find_iter(statement).map(|m| m.as_str()).collect();
    let mut imports: Vec<String> = Vec::new();
    for file in files {
        let source_dir = file.path.parent().unwrap_or(&file.path);
        for (_, line) in top_level_imports(&file.source, ecosystem) {
            let names = bound_names(&line, ecosystem);
            let needed = names.iter().any(|name| name == "*" || used.contains(name.as_str()));
            if !needed {
                continue;
            }
            match rebase_import(&line, ecosystem, source_dir, target_dir) {
                Some(rebased) if !imports.contains(&rebased) => imports.push(rebased),
                Some(_) => {}
                None => tracing::debug!(
                    file = %file.path.display(),
                    import = %line,
                    "Import cannot be rebased onto the fixture directory"
                ),
            }
        }
    }
    imports
}

/// Find fixtures without queuing anything.
#[must_use]
pub fn extract(analysis: &Analysis, min_frequency: usize) -> Vec<ExtractedFixture> {
    let obsolete: BTreeSet<&str> =
        analysis.report.obsolete_tests.iter().map(String::as_str).collect();
    // (ecosystem, statement) -> (tests, files), in first-seen order.
    let mut order: Vec<(Ecosystem, &str)> = Vec::new();
    let mut seen: BTreeMap<(Ecosystem, &str), (Vec<&str>, Vec<&ParsedTestFile>)> = BTreeMap::new();

    for (file, test) in analysis.tests() {
        if obsolete.contains(test.qualified_name.as_str()) {
            continue;
        }
        let mut in_test = BTreeSet::new();
        for statement in &test.setup {
            if !extractable(statement, file.ecosystem) || !in_test.insert(statement.as_str()) {
                continue;
            }
            let key = (file.ecosystem, statement.as_str());
            let entry = seen.entry(key).or_insert_with(|| {
                order.push(key);
                (Vec::new(), Vec::new())
            });
            entry.0.push(test.qualified_name.as_str());
            if !entry.1.iter().any(|known| known.path == file.path) {
                entry.1.push(file);
            }
        }
    }

    let mut taken: BTreeSet<(PathBuf, String)> = BTreeSet::new();
    let mut fixtures = Vec::new();
    for key in order {
        let Some((tests, files)) = seen.get(&key) else { continue };
        if tests.len() < min_frequency.max(2) {
            continue;
        }
        let (ecosystem, statement) = key;
        let Some(dir) = common_ancestor(files.iter().map(|file| file.path.as_path())) else {
            continue;
        };
        let imports = needed_imports(statement, ecosystem, files, &dir);
        let location = dir.join(match ecosystem {
            Ecosystem::Python => PYTHON_FIXTURE_FILE,
            Ecosystem::JavaScript => JS_FIXTURE_FILE,
        });
        let existing = fs::read_to_string(&location).unwrap_or_default();

        let base = fixture_name(&base_name(statement, ecosystem), ecosystem);
        let mut name = base.clone();
        let mut n = 1;
        while taken.contains(&(location.clone(), name.clone()))
            || existing.contains(&format!("def {name}("))
            || existing.contains(&format!("function {name}("))
        {
            n += 1;
            name = match ecosystem {
                Ecosystem::Python => format!("{base}_{n}"),
                Ecosystem::JavaScript => format!("{base}{n}"),
            };
        }
        taken.insert((location.clone(), name.clone()));

        fixtures.push(ExtractedFixture {
            name,
            statement: statement.to_string(),
            ecosystem,
            tests: tests.iter().map(ToString::to_string).collect(),
            location,
            returns: assigned_variable(statement, ecosystem),
            imports,
        });
    }
    fixtures
}

/// Source for one fixture.
#[must_use]
pub fn render(fixture: &ExtractedFixture) -> String {
    match fixture.ecosystem {
        Ecosystem::Python => {
            let mut out = format!(
                "@pytest.fixture\ndef {}():\n    \"\"\"Shared setup repeated in {} tests.\"\"\"\n    {}\n",
                fixture.name,
                fixture.tests.len(),
                fixture.statement
            );
            if let Some(var) = &fixture.returns {
                out.push_str(&format!("    return {var}\n"));
            }
            out
        }
        Ecosystem::JavaScript => {
            let terminated =
                fixture.statement.ends_with(';') || fixture.statement.ends_with('}');
            let statement = if terminated {
                fixture.statement.clone()
            } else {
                format!("{};", fixture.statement)
            };
            let mut out = format!(
                "// Shared setup repeated in {} tests.\nexport function {}() {{\n  {statement}\n",
                fixture.tests.len(),
                fixture.name
            );
            if let Some(var) = &fixture.returns {
                out.push_str(&format!("  return {var};\n"));
            }
            out.push_str("}\n");
            out
        }
    }
}

/// Import lines to add to a fixture file, in first-seen order.
fn file_imports<'a>(
    fixtures: impl Iterator<Item = &'a ExtractedFixture>,
    existing: &str,
) -> Vec<String> {
    let present: BTreeSet<&str> = existing.lines().map(str::trim).collect();
    let mut lines: Vec<String> = Vec::new();
    for fixture in fixtures {
        if fixture.ecosystem == Ecosystem::Python && !lines.iter().any(|l| l == "import pytest") {
            lines.insert(0, "import pytest".to_string());
        }
        for line in &fixture.imports {
            if !lines.contains(line) {
                lines.push(line.clone());
            }
        }
    }
    lines.retain(|line| !present.contains(line.as_str()));
    lines
}

/// Queue fixture files and one `keep` action per fixture.
pub fn plan(analysis: &Analysis, min_frequency: usize, plan: &mut CleanupPlan) {
    let root = analysis_root(analysis);
    let fixtures = extract(analysis, min_frequency);

    let mut locations: Vec<&Path> = Vec::new();
    for fixture in &fixtures {
        if !locations.contains(&fixture.location.as_path()) {
            locations.push(&fixture.location);
        }
    }
    for location in locations {
        let here: Vec<&ExtractedFixture> =
            fixtures.iter().filter(|f| f.location == location).collect();
        let Some(ecosystem) = here.first().map(|f| f.ecosystem) else { continue };
        let existing = fs::read_to_string(location).ok();
        let imports = file_imports(here.iter().copied(), existing.as_deref().unwrap_or(""));

        if let Some(existing) = existing.as_deref().filter(|_| !imports.is_empty()) {
            let after = top_level_imports(existing, ecosystem)
                .last()
                .map_or(1, |(line, _)| line + 1);
            let mut text = imports.join("\n");
            text.push('\n');
            plan.edits.insert(location, line_offset(existing, after), text);
        }
        let mut header = match ecosystem {
            Ecosystem::Python => String::new(),
            Ecosystem::JavaScript => {
                "// Shared setup extracted from repeated test code.\n".to_string()
            }
        };
        if existing.is_none() {
            for line in &imports {
                header.push_str(line);
                header.push('\n');
            }
        }

        for fixture in here {
            plan.edits.create_or_append(location, &header, render(fixture));
            let rel = relative_display(&root, location);
            plan.push(
                CleanupAction::new(
                    ActionType::Keep,
                    format!("{rel}::{}", fixture.name),
                    format!(
                        "extracted fixture from {} tests: `{}`",
                        fixture.tests.len(),
                        fixture.statement
                    ),
                ),
                vec![location.to_path_buf()],
            );
        }
    }
}

fn analysis_root(analysis: &Analysis) -> PathBuf {
    PathBuf::from(&analysis.report.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::config::JanitorConfig;
    use crate::output::SilentReporter;
    use tempfile::TempDir;

    #[test]
    fn names_from_variables_and_keywords() {
        assert_eq!(base_name("api = make_client()", Ecosystem::Python), "api");
        assert_eq!(base_name("connect_db()", Ecosystem::Python), "database");
        assert_eq!(base_name("const user = buildUser();", Ecosystem::JavaScript), "user");
        assert_eq!(base_name("reset()", Ecosystem::Python), "setup");
        assert_eq!(fixture_name("client", Ecosystem::JavaScript), "sharedClient");
    }

    #[test]
    fn extractable_statements() {
        assert!(extractable("client = make()", Ecosystem::Python));
        assert!(!extractable("for i in range(3): x.append(i)", Ecosystem::Python));
        assert!(!extractable("const r = await load();", Ecosystem::JavaScript));
        assert!(!extractable("if (x) { y(); }", Ecosystem::JavaScript));
    }

    #[test]
    fn repeated_setup_becomes_conftest_fixture() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tests");
        fs::create_dir_all(dir.join("unit")).unwrap();
        fs::write(
            dir.join("unit/test_one.py"),
            "def test_one():\n    client = make_client()\n    assert client.ok\n",
        )
        .unwrap();
        fs::write(
            dir.join("test_two.py"),
            "def test_two():\n    client = make_client()\n    assert client.ready\n",
        )
        .unwrap();

        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        let fixtures = extract(&analysis, 2);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].name, "shared_client");
        assert_eq!(fixtures[0].location, dir.join("conftest.py"));
        assert_eq!(
            render(&fixtures[0]),
            "@pytest.fixture\ndef shared_client():\n    \"\"\"Shared setup repeated in 2 tests.\"\"\"\n    client = make_client()\n    return client\n"
        );

        let mut plan = CleanupPlan::default();
        super::plan(&analysis, 2, &mut plan);
        assert_eq!(plan.count(ActionType::Keep), 1);
        assert_eq!(plan.actions[0].action.test_name, "tests/conftest.py::shared_client");

        assert!(extract(&analysis, 3).is_empty());
    }

    #[test]
    fn import_bindings() {
        assert_eq!(bound_names("import os.path", Ecosystem::Python), vec!["os"]);
        assert_eq!(
            bound_names("from factory import make_client, Api as Remote", Ecosystem::Python),
            vec!["make_client", "Remote"]
        );
        assert_eq!(
            bound_names("import Cart, { makeCart as build } from './cart';", Ecosystem::JavaScript),
            vec!["build", "Cart"]
        );
        assert_eq!(
            bound_names("import * as helpers from './helpers';", Ecosystem::JavaScript),
            vec!["helpers"]
        );
        assert!(bound_names("import './polyfill';", Ecosystem::JavaScript).is_empty());
    }

    #[test]
    fn relative_imports_follow_the_fixture_file() {
        let source = Path::new("/suite/web/cart");
        let target = Path::new("/suite/web");
        assert_eq!(
            rebase_import(
                "import { makeCart } from './fixtures';",
                Ecosystem::JavaScript,
                source,
                target
            )
            .as_deref(),
            Some("import { makeCart } from './cart/fixtures';")
        );
        assert_eq!(
            rebase_import("import { db } from '../db';", Ecosystem::JavaScript, source, target)
                .as_deref(),
            Some("import { db } from './db';")
        );
        assert_eq!(
            rebase_import(
                "from .helpers import build",
                Ecosystem::Python,
                Path::new("/suite/tests/unit"),
                Path::new("/suite/tests")
            )
            .as_deref(),
            Some("from .unit.helpers import build")
        );
        assert_eq!(
            rebase_import("import os", Ecosystem::Python, source, target).as_deref(),
            Some("import os")
        );
        assert_eq!(
            rebase_import(
                "from ..shared import build",
                Ecosystem::Python,
                Path::new("/suite/tests"),
                Path::new("/suite")
            ),
            None
        );
    }

    #[test]
    fn generated_conftest_imports_what_the_setup_uses() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tests");
        fs::create_dir_all(dir.join("unit")).unwrap();
        fs::write(temp.path().join("factory.py"), "def make_client():\n    return None\n").unwrap();
        fs::write(
            dir.join("unit/test_one.py"),
            "import os\nfrom factory import make_client\n\n\ndef test_one():\n    client = make_client()\n    assert client.ok\n",
        )
        .unwrap();
        fs::write(
            dir.join("test_two.py"),
            "from factory import make_client\n\n\ndef test_two():\n    client = make_client()\n    assert client.ready\n",
        )
        .unwrap();

        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        let mut plan = CleanupPlan::default();
        super::plan(&analysis, 2, &mut plan);
        let conftest = dir.join("conftest.py");
        plan.edits.apply(&conftest).unwrap();

        insta::assert_snapshot!(fs::read_to_string(&conftest).unwrap(), @r#"
        import pytest
        from factory import make_client


        @pytest.fixture
        def shared_client():
            """Shared setup repeated in 2 tests."""
            client = make_client()
            return client
        "#);
    }

    #[test]
    fn existing_conftest_gets_missing_imports_only() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tests");
        fs::create_dir_all(&dir).unwrap();
        fs::write(temp.path().join("factory.py"), "def make_client():\n    return None\n").unwrap();
        fs::write(dir.join("conftest.py"), "import pytest\n\n\nLIMIT = 3\n").unwrap();
        for name in ["one", "two"] {
            fs::write(
                dir.join(format!("test_{name}.py")),
                format!(
                    "from factory import make_client\n\n\n\
                     def test_{name}():\n    client = make_client()\n    assert client\n"
                ),
            )
            .unwrap();
        }

        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        let mut plan = CleanupPlan::default();
        super::plan(&analysis, 2, &mut plan);
        let conftest = dir.join("conftest.py");
        plan.edits.apply(&conftest).unwrap();

        let written = fs::read_to_string(&conftest).unwrap();
        assert!(written.starts_with("import pytest\nfrom factory import make_client\n"));
        assert_eq!(written.matches("import pytest").count(), 1);
        assert!(written.contains("LIMIT = 3"));
        assert!(written.contains("def shared_client():"));
    }

    #[test]
    fn javascript_setup_hook_rebases_relative_imports() {
        let temp = TempDir::new().unwrap();
        let web = temp.path().join("web");
        fs::create_dir_all(web.join("cart")).unwrap();
        fs::write(web.join("cart/fixtures.ts"), "export const makeCart = () => ({});\n").unwrap();
        fs::write(
            web.join("cart/add.test.ts"),
            "import { it, expect } from 'vitest';\nimport { makeCart } from './fixtures';\n\nit('adds', () => {\n  const cart = makeCart();\n  expect(cart.add(1)).toBe(1);\n});\n",
        )
        .unwrap();
        fs::write(
            web.join("remove.test.ts"),
            "import { it, expect } from 'vitest';\nimport { makeCart } from './cart/fixtures';\n\nit('removes', () => {\n  const cart = makeCart();\n  expect(cart.remove(1)).toBe(0);\n});\n",
        )
        .unwrap();

        let config = JanitorConfig::defaults_for(temp.path());
        let analysis = analyze(&config, &SilentReporter).unwrap();
        let fixtures = extract(&analysis, 2);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].imports, vec!["import { makeCart } from './cart/fixtures';"]);

        let mut plan = CleanupPlan::default();
        super::plan(&analysis, 2, &mut plan);
        let hook = web.join(JS_FIXTURE_FILE);
        plan.edits.apply(&hook).unwrap();

        insta::assert_snapshot!(fs::read_to_string(&hook).unwrap(), @r"
        // Shared setup extracted from repeated test code.
        import { makeCart } from './cart/fixtures';


        // Shared setup repeated in 2 tests.
        export function sharedCart() {
          const cart = makeCart();
          return cart;
        }
        ");
    }
}
