//! Syntax-tree extraction of test functions and imports.
//!
//! Python files are parsed with `tree-sitter-python`; JavaScript and
//! TypeScript files with `tree-sitter-typescript` (TSX grammar for
//! everything but `.ts`). Files with syntax errors are skipped, not guessed.

use crate::model::{AnalysisOutcome, Ecosystem};
use crate::util::{normalize_whitespace, relative_display};
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::{Language, Node, Parser};

/// One test function (Python) or `test`/`it` call (JavaScript).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFunction {
    /// `path::Class::name` or `path::describe title`.
    pub qualified_name: String,
    /// Bare function name or test title.
    pub name: String,
    /// Relative file path, forward slashes.
    pub file_path: String,
    /// Enclosing class (Python) or describe titles (JavaScript).
    pub scope: Vec<String>,
    /// 1-based first line, including decorators.
    pub line: usize,
    /// 1-based last line.
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub docstring: Option<String>,
    /// Whitespace-normalized assertion statements, in source order.
    pub assertions: Vec<String>,
    /// Whitespace-normalized statements that are neither docstring nor assertion.
    pub setup: Vec<String>,
    /// Raw body statements (docstring excluded), dedented to column zero.
    pub body: Vec<String>,
    pub decorators: Vec<String>,
    pub lines_of_code: usize,
}

impl TestFunction {
    #[must_use]
    pub const fn contains_line(&self, line: usize) -> bool {
        line >= self.line && line <= self.end_line
    }
}

/// A module reference found in an import statement or `require` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub module: String,
    pub line: usize,
}

/// Everything extracted from one test file.
#[derive(Debug, Clone)]
pub struct ParsedTestFile {
    pub path: PathBuf,
    pub rel_path: String,
    pub ecosystem: Ecosystem,
    pub source: String,
    pub tests: Vec<TestFunction>,
    pub imports: Vec<ImportRef>,
    pub module_docstring: Option<String>,
}

impl ParsedTestFile {
    /// The test whose span covers a 1-based line, if any.
    #[must_use]
    pub fn test_at_line(&self, line: usize) -> Option<&TestFunction> {
        self.tests.iter().find(|test| test.contains_line(line))
    }
}

/// Read and parse a test file.
#[must_use]
pub fn parse_file(
    root: &Path,
    path: &Path,
    ecosystem: Ecosystem,
) -> AnalysisOutcome<ParsedTestFile> {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => return AnalysisOutcome::Skipped(format!("unreadable: {err}")),
    };
    let rel_path = relative_display(root, path);
    parse_source(path, &rel_path, source, ecosystem)
}

/// Parse already-loaded source. `path` selects the grammar variant.
#[must_use]
pub fn parse_source(
    path: &Path,
    rel_path: &str,
    source: String,
    ecosystem: Ecosystem,
) -> AnalysisOutcome<ParsedTestFile> {
    let mut parser = Parser::new();
    if let Err(err) = parser.set_language(&language_for(ecosystem, path)) {
        return AnalysisOutcome::Skipped(format!("grammar unavailable: {err}"));
    }
    let Some(tree) = parser.parse(&source, None) else {
        return AnalysisOutcome::Skipped("parser produced no tree".to_string());
    };
    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return AnalysisOutcome::Skipped(format!("syntax error near line {line}"));
    }

    let mut extractor = Extractor {
        source: &source,
        rel_path,
        tests: Vec::new(),
    };
    let (imports, module_docstring) = match ecosystem {
        Ecosystem::Python => {
            extractor.python_module(root);
            (python_imports(root, &source), python_docstring(root, &source))
        }
        Ecosystem::JavaScript => {
            extractor.js_walk(root, &mut Vec::new());
            (js_imports(root, &source), None)
        }
    };
    let tests = extractor.tests;

    AnalysisOutcome::Ok(ParsedTestFile {
        path: path.to_path_buf(),
        rel_path: rel_path.to_string(),
        ecosystem,
        source,
        tests,
        imports,
        module_docstring,
    })
}

fn language_for(ecosystem: Ecosystem, path: &Path) -> Language {
    match ecosystem {
        Ecosystem::Python => tree_sitter_python::language(),
        Ecosystem::JavaScript => {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if matches!(ext, "ts" | "mts" | "cts") {
                tree_sitter_typescript::language_typescript()
            } else {
                tree_sitter_typescript::language_tsx()
            }
        }
    }
}

fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Node text with continuation lines shifted left by the node's start column.
fn dedented(node: Node<'_>, source: &str) -> String {
    let column = node.start_position().column;
    node_text(node, source)
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                return line;
            }
            let leading = line.len() - line.trim_start().len();
            &line[leading.min(column)..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn descendants_where<'t>(node: Node<'t>, pred: &dyn Fn(Node<'t>) -> bool) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if pred(current) {
            found.push(current);
            continue;
        }
        let mut children = named_children(current);
        children.reverse();
        stack.extend(children);
    }
    found
}

fn first_error_line(root: Node<'_>) -> Option<usize> {
    descendants_where(root, &|n| n.is_error() || n.is_missing())
        .first()
        .map(|n| n.start_position().row + 1)
}

fn strip_quotes(raw: &str) -> String {
    let trimmed = raw
        .trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U' | 'f' | 'F'));
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.trim().to_string()
}

fn strip_comment(raw: &str) -> String {
    let body = raw
        .trim()
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_start_matches("//")
        .trim_end_matches("*/");
    body.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Python assertion forms: `assert`, unittest `self.assert*`, `pytest.raises`.
#[must_use]
pub fn is_python_assertion(statement: &str) -> bool {
    statement.starts_with("assert ")
        || statement.starts_with("assert(")
        || statement.starts_with("self.assert")
        || statement.starts_with("pytest.raises")
        || statement.starts_with("with pytest.raises")
        || statement.starts_with("pytest.fail(")
}

/// JavaScript assertion forms: `expect(...)` chains and `assert` calls.
#[must_use]
pub fn is_js_assertion(statement: &str) -> bool {
    let statement = statement.strip_prefix("await ").unwrap_or(statement);
    statement.starts_with("expect(")
        || statement.starts_with("expect.")
        || statement.starts_with("expectTypeOf(")
        || statement.starts_with("assert(")
        || statement.starts_with("assert.")
}

#[derive(Default)]
struct BodyParts {
    docstring: Option<String>,
    assertions: Vec<String>,
    setup: Vec<String>,
    body: Vec<String>,
}

struct Extractor<'s> {
    source: &'s str,
    rel_path: &'s str,
    tests: Vec<TestFunction>,
}

impl Extractor<'_> {
    // ── Python ──────────────────────────────────────────────────────

    fn python_module(&mut self, root: Node<'_>) {
        for child in named_children(root) {
            match child.kind() {
                "function_definition" => self.python_function(child, child, None, Vec::new()),
                "class_definition" => self.python_class(child, &[]),
                "decorated_definition" => {
                    let decorators = self.decorators_of(child);
                    let Some(definition) = child.child_by_field_name("definition") else {
                        continue;
                    };
                    match definition.kind() {
                        "function_definition" => {
                            self.python_function(definition, child, None, decorators);
                        }
                        "class_definition" => self.python_class(definition, &decorators),
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    fn decorators_of(&self, decorated: Node<'_>) -> Vec<String> {
        named_children(decorated)
            .into_iter()
            .filter(|n| n.kind() == "decorator")
            .map(|n| normalize_whitespace(node_text(n, self.source)))
            .collect()
    }

    fn python_class(&mut self, class: Node<'_>, class_decorators: &[String]) {
        let Some(name) = class.child_by_field_name("name") else {
            return;
        };
        let class_name = node_text(name, self.source).to_string();
        if !class_name.starts_with("Test") {
            return;
        }
        let Some(body) = class.child_by_field_name("body") else {
            return;
        };
        for member in named_children(body) {
            match member.kind() {
                "function_definition" => self.python_function(
                    member,
                    member,
                    Some(&class_name),
                    class_decorators.to_vec(),
                ),
                "decorated_definition" => {
                    let mut decorators = class_decorators.to_vec();
                    decorators.extend(self.decorators_of(member));
                    if let Some(definition) = member
                        .child_by_field_name("definition")
                        .filter(|d| d.kind() == "function_definition")
                    {
                        self.python_function(definition, member, Some(&class_name), decorators);
                    }
                }
                _ => {}
            }
        }
    }

    fn python_function(
        &mut self,
        def: Node<'_>,
        span: Node<'_>,
        class: Option<&str>,
        decorators: Vec<String>,
    ) {
        let Some(name_node) = def.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        if !name.starts_with("test") {
            return;
        }
        let parts = def
            .child_by_field_name("body")
            .map(|body| self.python_body(body))
            .unwrap_or_default();
        let scope: Vec<String> = class.map(str::to_string).into_iter().collect();
        let qualified = std::iter::once(self.rel_path.to_string())
            .chain(scope.iter().cloned())
            .chain(std::iter::once(name.clone()))
            .collect::<Vec<_>>()
            .join("::");
        self.push_named(span, qualified, name, scope, parts, decorators);
    }

    fn python_body(&self, body: Node<'_>) -> BodyParts {
        let mut parts = BodyParts::default();
        let mut first = true;
        for stmt in named_children(body) {
            if matches!(stmt.kind(), "comment" | "pass_statement") {
                continue;
            }
            let is_first = std::mem::replace(&mut first, false);
            if is_first && stmt.kind() == "expression_statement" && stmt.named_child_count() == 1 {
                if let Some(string) = stmt.named_child(0).filter(|n| n.kind() == "string") {
                    parts.docstring = Some(strip_quotes(node_text(string, self.source)));
                    continue;
                }
            }
            let text = normalize_whitespace(node_text(stmt, self.source));
            if text == "..." {
                continue;
            }
            parts.body.push(dedented(stmt, self.source));
            if is_python_assertion(&text) {
                parts.assertions.push(text);
                continue;
            }
            let nested = descendants_where(stmt, &|n| n.kind() == "assert_statement");
            if nested.is_empty() {
                parts.setup.push(text);
            } else {
                parts.assertions.extend(
                    nested
                        .into_iter()
                        .map(|n| normalize_whitespace(node_text(n, self.source))),
                );
            }
        }
        parts
    }

    // ── JavaScript / TypeScript ─────────────────────────────────────

    fn js_walk(&mut self, node: Node<'_>, describes: &mut Vec<String>) {
        for child in named_children(node) {
            if child.kind() == "call_expression" {
                if let Some(call) = self.js_test_call(child) {
                    match call.kind {
                        JsCallKind::Describe => {
                            describes.push(call.title);
                            if let Some(body) = call.callback.child_by_field_name("body") {
                                self.js_walk(body, describes);
                            }
                            describes.pop();
                        }
                        JsCallKind::Test => {
                            let span = child
                                .parent()
                                .filter(|p| p.kind() == "expression_statement")
                                .unwrap_or(child);
                            let parts = call
                                .callback
                                .child_by_field_name("body")
                                .map(|body| self.js_body(body))
                                .unwrap_or_default();
                            let qualified = format!(
                                "{}::{}",
                                self.rel_path,
                                describes
                                    .iter()
                                    .map(String::as_str)
                                    .chain(std::iter::once(call.title.as_str()))
                                    .collect::<Vec<_>>()
                                    .join(" ")
                            );
                            self.push_named(
                                span,
                                qualified,
                                call.title,
                                describes.clone(),
                                parts,
                                call.modifiers,
                            );
                        }
                    }
                    continue;
                }
            }
            self.js_walk(child, describes);
        }
    }

    fn js_test_call<'t>(&self, call: Node<'t>) -> Option<JsCall<'t>> {
        let function = call.child_by_field_name("function")?;
        let callee = if function.kind() == "call_expression" {
            function.child_by_field_name("function")?
        } else {
            function
        };
        let callee_text = node_text(callee, self.source);
        let mut segments = callee_text.split('.');
        let kind = match segments.next()? {
            "test" | "it" => JsCallKind::Test,
            "describe" | "suite" => JsCallKind::Describe,
            _ => return None,
        };
        let modifiers = segments.map(|m| format!(".{m}")).collect();

        let args = named_children(call.child_by_field_name("arguments")?);
        let title_node = args.first()?;
        if !matches!(title_node.kind(), "string" | "template_string") {
            return None;
        }
        let callback = args.iter().copied().find(|n| {
            matches!(n.kind(), "arrow_function" | "function_expression" | "function")
        })?;

        Some(JsCall {
            kind,
            title: strip_quotes(node_text(*title_node, self.source)),
            callback,
            modifiers,
        })
    }

    fn js_body(&self, body: Node<'_>) -> BodyParts {
        let mut parts = BodyParts::default();
        if body.kind() != "statement_block" {
            let text = normalize_whitespace(node_text(body, self.source));
            parts.body.push(format!("{};", dedented(body, self.source)));
            if is_js_assertion(&text) {
                parts.assertions.push(text);
            } else {
                parts.setup.push(text);
            }
            return parts;
        }

        let mut seen_statement = false;
        for stmt in named_children(body) {
            if stmt.kind() == "comment" {
                if !seen_statement && parts.docstring.is_none() {
                    parts.docstring = Some(strip_comment(node_text(stmt, self.source)));
                }
                continue;
            }
            if stmt.kind() == "empty_statement" {
                continue;
            }
            seen_statement = true;
            parts.body.push(dedented(stmt, self.source));
            let text = normalize_whitespace(node_text(stmt, self.source));
            if is_js_assertion(&text) {
                parts.assertions.push(text.trim_end_matches(';').to_string());
                continue;
            }
            let nested: Vec<String> =
                descendants_where(stmt, &|n| n.kind() == "expression_statement")
                    .into_iter()
                    .map(|n| normalize_whitespace(node_text(n, self.source)))
                    .filter(|t| is_js_assertion(t))
                    .map(|t| t.trim_end_matches(';').to_string())
                    .collect();
            if nested.is_empty() {
                parts.setup.push(text);
            } else {
                parts.assertions.extend(nested);
            }
        }
        parts
    }

    fn push_named(
        &mut self,
        span: Node<'_>,
        qualified_name: String,
        name: String,
        scope: Vec<String>,
        parts: BodyParts,
        decorators: Vec<String>,
    ) {
        let line = span.start_position().row + 1;
        let end_line = span.end_position().row + 1;
        // Same-named tests in one file (redefinitions, repeated titles) stay distinct.
        let taken = self
            .tests
            .iter()
            .filter(|t| {
                t.qualified_name == qualified_name
                    || t.qualified_name.starts_with(&format!("{qualified_name}#"))
            })
            .count();
        let qualified_name = if taken == 0 {
            qualified_name
        } else {
            format!("{qualified_name}#{}", taken + 1)
        };
        self.tests.push(TestFunction {
            qualified_name,
            name,
            file_path: self.rel_path.to_string(),
            scope,
            line,
            end_line,
            start_byte: span.start_byte(),
            end_byte: span.end_byte(),
            docstring: parts.docstring,
            assertions: parts.assertions,
            setup: parts.setup,
            body: parts.body,
            decorators,
            lines_of_code: end_line - line + 1,
        });
    }
}

enum JsCallKind {
    Test,
    Describe,
}

struct JsCall<'t> {
    kind: JsCallKind,
    title: String,
    callback: Node<'t>,
    modifiers: Vec<String>,
}

fn python_docstring(root: Node<'_>, source: &str) -> Option<String> {
    let first = named_children(root)
        .into_iter()
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let string = first.named_child(0).filter(|n| n.kind() == "string")?;
    Some(strip_quotes(node_text(string, source)))
}

fn python_imports(root: Node<'_>, source: &str) -> Vec<ImportRef> {
    let mut imports = Vec::new();
    let nodes = descendants_where(root, &|n| {
        matches!(n.kind(), "import_statement" | "import_from_statement")
    });
    for node in nodes {
        let line = node.start_position().row + 1;
        if node.kind() == "import_from_statement" {
            if let Some(module) = node.child_by_field_name("module_name") {
                imports.push(ImportRef {
                    module: node_text(module, source).to_string(),
                    line,
                });
            }
            continue;
        }
        let mut cursor = node.walk();
        let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let target = if name.kind() == "aliased_import" {
                name.child_by_field_name("name")
            } else {
                Some(name)
            };
            if let Some(target) = target {
                imports.push(ImportRef {
                    module: node_text(target, source).to_string(),
                    line,
                });
            }
        }
    }
    imports
}

fn js_imports(root: Node<'_>, source: &str) -> Vec<ImportRef> {
    let mut imports = Vec::new();
    let nodes = descendants_where(root, &|n| {
        n.kind() == "import_statement"
            || (n.kind() == "call_expression"
                && n.child_by_field_name("function")
                    .is_some_and(|f| node_text(f, source) == "require"))
    });
    for node in nodes {
        let module_node = if node.kind() == "import_statement" {
            node.child_by_field_name("source")
        } else {
            node.child_by_field_name("arguments")
                .and_then(|args| args.named_child(0))
                .filter(|arg| arg.kind() == "string")
        };
        if let Some(module_node) = module_node {
            imports.push(ImportRef {
                module: strip_quotes(node_text(module_node, source)),
                line: node.start_position().row + 1,
            });
        }
    }
    imports
}
