//! Obsolescence detection: deprecation markers and unresolvable imports.
//!
//! Findings are advisory. A renamed module that still exists elsewhere is
//! reported as unresolved; the cleanup log makes that reviewable before
//! anything is removed.

use super::fragility::REWRITE_MARKER;
use super::syntax::{ImportRef, ParsedTestFile};
use crate::model::{Ecosystem, ObsoleteFinding, ObsoleteReason, ObsoleteScope};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Built-in deprecation markers, matched case-insensitively.
pub const DEFAULT_MARKERS: &[&str] = &[
    "@deprecated",
    "deprecated",
    "todo: remove",
    "obsolete",
    "legacy",
];

const PYTHON_FRAMEWORK: &[&str] = &[
    "pytest", "_pytest", "unittest", "mock", "conftest", "hypothesis", "pytest_asyncio",
    "pytest_mock", "freezegun", "responses",
];

const PYTHON_STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
    "bz2", "calendar", "cmath", "codecs", "collections", "concurrent", "configparser",
    "contextlib", "contextvars", "copy", "csv", "ctypes", "dataclasses", "datetime", "decimal",
    "difflib", "dis", "email", "enum", "errno", "faulthandler", "fnmatch", "fractions",
    "functools", "gc", "getpass", "gettext", "glob", "gzip", "hashlib", "heapq", "hmac", "html",
    "http", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "linecache",
    "locale", "logging", "lzma", "math", "mimetypes", "multiprocessing", "numbers", "operator",
    "os", "pathlib", "pickle", "platform", "pprint", "queue", "random", "re", "secrets", "select",
    "selectors", "shlex", "shutil", "signal", "smtplib", "socket", "sqlite3", "ssl", "stat",
    "statistics", "string", "struct", "subprocess", "sys", "sysconfig", "tarfile", "tempfile",
    "textwrap", "threading", "time", "timeit", "tomllib", "traceback", "types", "typing",
    "unicodedata", "urllib", "uuid", "venv", "warnings", "weakref", "xml", "zipfile", "zlib",
    "zoneinfo",
];

const JS_FRAMEWORK: &[&str] = &["vitest", "@vitest", "jest", "@jest", "vite"];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "crypto", "dgram",
    "dns", "events", "fs", "http", "http2", "https", "inspector", "module", "net", "os", "path",
    "perf_hooks", "process", "querystring", "readline", "stream", "string_decoder", "timers",
    "tls", "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

const JS_EXTENSIONS: &[&str] = &[
    "", ".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".json", ".vue", ".svelte", "/index.js",
    "/index.ts", "/index.tsx", "/index.jsx",
];

/// Resolves imported module names against the filesystem.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    root: PathBuf,
    /// Project-local roots: submodules must resolve fully.
    local_paths: Vec<PathBuf>,
    /// Installed packages: the top-level name is enough.
    site_paths: Vec<PathBuf>,
}

impl ImportResolver {
    /// Build a resolver for `root`, searching `extra_paths` and any
    /// site-packages directory that can be found.
    #[must_use]
    pub fn new(root: &Path, extra_paths: &[PathBuf]) -> Self {
        let mut local_paths = vec![root.to_path_buf(), root.join("src")];
        local_paths.extend(extra_paths.iter().cloned());
        let mut site_paths = site_packages(root);
        let mut seen = BTreeSet::new();
        local_paths.retain(|p| p.is_dir() && seen.insert(p.clone()));
        site_paths.retain(|p| p.is_dir() && seen.insert(p.clone()));
        Self {
            root: root.to_path_buf(),
            local_paths,
            site_paths,
        }
    }

    /// Whether an import resolves. Stdlib and test-framework modules always do.
    #[must_use]
    pub fn resolves(&self, ecosystem: Ecosystem, module: &str, from_file: &Path) -> bool {
        match ecosystem {
            Ecosystem::Python => self.resolves_python(module, from_file),
            Ecosystem::JavaScript => self.resolves_js(module, from_file),
        }
    }

    fn resolves_python(&self, module: &str, from_file: &Path) -> bool {
        if let Some(stripped) = module.strip_prefix('.') {
            let ups = stripped.chars().take_while(|c| *c == '.').count();
            let rest = &stripped[ups..];
            let mut base = from_file.parent().map(Path::to_path_buf).unwrap_or_default();
            for _ in 0..ups {
                base = base.parent().map(Path::to_path_buf).unwrap_or_default();
            }
            return rest.is_empty() || python_module_exists(&base, rest);
        }

        let top = module.split('.').next().unwrap_or(module);
        if PYTHON_STDLIB.contains(&top)
            || PYTHON_FRAMEWORK.contains(&top)
            || top.starts_with("pytest_")
        {
            return true;
        }

        // pytest's rootdir insertion puts the test file's ancestors on sys.path.
        let local: Vec<PathBuf> = from_file
            .ancestors()
            .skip(1)
            .take_while(|dir| dir.starts_with(&self.root))
            .map(Path::to_path_buf)
            .chain(self.local_paths.iter().cloned())
            .collect();
        if local.iter().any(|base| python_module_exists(base, top)) {
            return local.iter().any(|base| python_module_exists(base, module));
        }
        self.site_paths
            .iter()
            .any(|base| python_module_exists(base, top))
    }

    fn resolves_js(&self, module: &str, from_file: &Path) -> bool {
        let bare = module.strip_prefix("node:").unwrap_or(module);
        let dir = from_file.parent().unwrap_or(&self.root);

        if module.starts_with("./") || module.starts_with("../") || module == "." || module == ".."
        {
            return js_file_exists(&dir.join(module));
        }
        if let Some(rest) = module.strip_prefix('/') {
            return js_file_exists(&self.root.join(rest));
        }
        if let Some(rest) = module.strip_prefix("@/").or_else(|| module.strip_prefix("~/")) {
            return js_file_exists(&self.root.join("src").join(rest));
        }

        let package = package_name(bare);
        let head = package.split('/').next().unwrap_or(package);
        if module.starts_with("node:")
            || NODE_BUILTINS.contains(&head)
            || JS_FRAMEWORK.contains(&package)
            || JS_FRAMEWORK.contains(&head)
        {
            return true;
        }

        dir.ancestors()
            .any(|ancestor| ancestor.join("node_modules").join(package).exists())
    }
}

/// `@scope/pkg/sub` -> `@scope/pkg`, `pkg/sub` -> `pkg`.
fn package_name(specifier: &str) -> &str {
    let mut cut = specifier.len();
    let skip = usize::from(specifier.starts_with('@'));
    if let Some((index, _)) = specifier.match_indices('/').nth(skip) {
        cut = index;
    }
    &specifier[..cut]
}

fn python_module_exists(base: &Path, dotted: &str) -> bool {
    let rel: PathBuf = dotted.split('.').collect();
    let as_dir = base.join(&rel);
    if as_dir.is_dir()
        || as_dir.with_extension("py").is_file()
        || as_dir.with_extension("pyi").is_file()
    {
        return true;
    }
    // Compiled extension modules: name.cpython-312-x86_64-linux-gnu.so
    let (Some(parent), Some(stem)) =
        (as_dir.parent(), as_dir.file_name().and_then(|s| s.to_str()))
    else {
        return false;
    };
    fs::read_dir(parent).is_ok_and(|entries| {
        entries.flatten().any(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(&format!("{stem}."))
                && (name.ends_with(".so") || name.ends_with(".pyd"))
        })
    })
}

fn js_file_exists(base: &Path) -> bool {
    let base = base.to_string_lossy();
    JS_EXTENSIONS
        .iter()
        .any(|ext| Path::new(&format!("{base}{ext}")).is_file())
}

fn site_packages(root: &Path) -> Vec<PathBuf> {
    let mut prefixes: Vec<PathBuf> = Vec::new();
    if let Ok(venv) = env::var("VIRTUAL_ENV") {
        prefixes.push(PathBuf::from(venv));
    }
    prefixes.push(root.join(".venv"));
    prefixes.push(root.join("venv"));
    prefixes.push(PathBuf::from("/usr/local"));
    prefixes.push(PathBuf::from("/usr"));
    if let Ok(home) = env::var("HOME") {
        prefixes.push(Path::new(&home).join(".local"));
    }

    let mut found = Vec::new();
    for prefix in prefixes {
        let Ok(entries) = fs::read_dir(prefix.join("lib")) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("python") {
                continue;
            }
            for leaf in ["site-packages", "dist-packages"] {
                found.push(entry.path().join(leaf));
            }
        }
    }
    found.sort();
    found
}

/// Marker scanner plus import resolver.
#[derive(Debug, Clone)]
pub struct ObsolescenceDetector {
    markers: Vec<String>,
    resolver: ImportResolver,
}

impl ObsolescenceDetector {
    #[must_use]
    pub fn new(resolver: ImportResolver, extra_markers: &[String]) -> Self {
        let mut markers: Vec<String> = DEFAULT_MARKERS.iter().map(|m| (*m).to_string()).collect();
        markers.extend(extra_markers.iter().map(|m| m.to_lowercase()));
        Self { markers, resolver }
    }

    /// First marker found in a line, case-insensitively.
    #[must_use]
    pub fn marker_in(&self, line: &str) -> Option<&str> {
        let lower = line.to_lowercase();
        self.markers
            .iter()
            .find(|marker| lower.contains(marker.as_str()))
            .map(String::as_str)
    }

    /// Scan one parsed file.
    ///
    /// Markers inside a test's span are test-scoped; markers elsewhere and
    /// unresolved imports are file-scoped.
    #[must_use]
    pub fn scan(&self, file: &ParsedTestFile) -> Vec<ObsoleteFinding> {
        let mut findings = Vec::new();
        let mut flagged_tests = BTreeSet::new();

        for (index, line) in file.source.lines().enumerate() {
            if line.contains(REWRITE_MARKER) {
                continue;
            }
            let Some(marker) = self.marker_in(line) else {
                continue;
            };
            let line_no = index + 1;
            let reason = ObsoleteReason::DeprecationMarker {
                marker: marker.to_string(),
                line: line_no,
            };
            match file.test_at_line(line_no) {
                Some(test) => {
                    if flagged_tests.insert(test.qualified_name.clone()) {
                        findings.push(ObsoleteFinding {
                            file_path: file.rel_path.clone(),
                            test_name: Some(test.qualified_name.clone()),
                            scope: ObsoleteScope::Test,
                            reason,
                        });
                    }
                }
                None => findings.push(ObsoleteFinding {
                    file_path: file.rel_path.clone(),
                    test_name: None,
                    scope: ObsoleteScope::File,
                    reason,
                }),
            }
        }

        findings.extend(self.unresolved_imports(file).into_iter().map(|import| {
            ObsoleteFinding {
                file_path: file.rel_path.clone(),
                test_name: None,
                scope: ObsoleteScope::File,
                reason: ObsoleteReason::UnresolvedImport {
                    module: import.module.clone(),
                    line: import.line,
                },
            }
        }));
        findings
    }

    fn unresolved_imports<'a>(&self, file: &'a ParsedTestFile) -> Vec<&'a ImportRef> {
        file.imports
            .iter()
            .filter(|import| !self.resolver.resolves(file.ecosystem, &import.module, &file.path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::syntax::parse_source;
    use tempfile::TempDir;

    fn parsed(root: &Path, rel: &str, source: &str, ecosystem: Ecosystem) -> ParsedTestFile {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        parse_source(&path, rel, source.to_string(), ecosystem)
            .ok()
            .unwrap()
    }

    #[test]
    fn package_names() {
        assert_eq!(package_name("lodash/fp"), "lodash");
        assert_eq!(package_name("@testing-library/react"), "@testing-library/react");
        assert_eq!(package_name("@scope/pkg/deep"), "@scope/pkg");
    }

    #[test]
    fn python_resolution() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/auth.py"), "").unwrap();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("tests/helpers.py"), "").unwrap();
        let file = root.join("tests/test_x.py");
        let resolver = ImportResolver::new(root, &[]);

        assert!(resolver.resolves(Ecosystem::Python, "os.path", &file));
        assert!(resolver.resolves(Ecosystem::Python, "pytest", &file));
        assert!(resolver.resolves(Ecosystem::Python, "app.auth", &file));
        assert!(resolver.resolves(Ecosystem::Python, "helpers", &file));
        assert!(resolver.resolves(Ecosystem::Python, ".helpers", &file));
        assert!(!resolver.resolves(Ecosystem::Python, ".gone", &file));
        assert!(!resolver.resolves(Ecosystem::Python, "app.removed_module_xyz", &file));
        assert!(!resolver.resolves(Ecosystem::Python, "zz_no_such_package_tj", &file));
    }

    #[test]
    fn javascript_resolution() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/math.ts"), "").unwrap();
        fs::create_dir_all(root.join("node_modules/lodash")).unwrap();
        let file = root.join("tests/math.test.ts");
        let resolver = ImportResolver::new(root, &[]);

        assert!(resolver.resolves(Ecosystem::JavaScript, "../src/math", &file));
        assert!(resolver.resolves(Ecosystem::JavaScript, "@/math", &file));
        assert!(resolver.resolves(Ecosystem::JavaScript, "lodash/fp", &file));
        assert!(resolver.resolves(Ecosystem::JavaScript, "node:fs", &file));
        assert!(resolver.resolves(Ecosystem::JavaScript, "path", &file));
        assert!(resolver.resolves(Ecosystem::JavaScript, "vitest", &file));
        assert!(resolver.resolves(Ecosystem::JavaScript, "@vitest/expect", &file));
        assert!(!resolver.resolves(Ecosystem::JavaScript, "../src/old", &file));
        assert!(!resolver.resolves(Ecosystem::JavaScript, "left-pad-tj", &file));
    }

    #[test]
    fn markers_scope_to_tests_or_file() {
        let temp = TempDir::new().unwrap();
        let source = "\
import os


def test_current():
    assert os.sep


def test_old():
    \"\"\"Legacy path, TODO: remove.\"\"\"
    assert True
";
        let file = parsed(temp.path(), "tests/test_m.py", source, Ecosystem::Python);
        let detector = ObsolescenceDetector::new(ImportResolver::new(temp.path(), &[]), &[]);
        let findings = detector.scan(&file);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].scope, ObsoleteScope::Test);
        assert_eq!(findings[0].test_name.as_deref(), Some("tests/test_m.py::test_old"));
        assert!(matches!(
            findings[0].reason,
            ObsoleteReason::DeprecationMarker { ref marker, line: 9 } if marker == "todo: remove"
        ));
    }

    #[test]
    fn module_marker_and_unresolved_import_are_file_scoped() {
        let temp = TempDir::new().unwrap();
        let source = "# DEPRECATED: superseded by test_new\n\
                      from gone_module_tj import thing\n\n\n\
                      def test_a():\n    assert thing\n";
        let file = parsed(temp.path(), "test_old.py", source, Ecosystem::Python);
        let detector = ObsolescenceDetector::new(ImportResolver::new(temp.path(), &[]), &[]);
        let findings = detector.scan(&file);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.scope == ObsoleteScope::File));
        assert!(matches!(
            findings[1].reason,
            ObsoleteReason::UnresolvedImport { ref module, line: 2 } if module == "gone_module_tj"
        ));
    }

    #[test]
    fn extra_markers_are_lowercased() {
        let detector = ObsolescenceDetector::new(
            ImportResolver::new(Path::new("/nonexistent"), &[]),
            &["SUNSET".to_string()],
        );
        assert_eq!(detector.marker_in("# sunset in Q3"), Some("sunset"));
        assert_eq!(detector.marker_in("# fine"), None);
    }
}
