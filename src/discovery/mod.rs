//! Test file discovery.
//!
//! Walks a target directory and classifies files into the two ecosystems by
//! naming convention. Output lists are sorted, so discovery is deterministic
//! and idempotent for an unchanged tree.

use crate::model::Ecosystem;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".git",
    ".venv",
    "venv",
    "dist",
    "build",
    "coverage",
    ".mypy_cache",
    ".tox",
    "htmlcov",
    ".next",
    ".nuxt",
];

const JS_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

impl Ecosystem {
    /// Whether a bare file name follows this ecosystem's test convention.
    #[must_use]
    pub fn matches_file_name(&self, name: &str) -> bool {
        match self {
            Self::Python => name.strip_suffix(".py").is_some_and(|stem| {
                (stem.starts_with("test_") && stem.len() > "test_".len())
                    || (stem.ends_with("_test") && stem.len() > "_test".len())
            }),
            Self::JavaScript => {
                let Some((stem, ext)) = name.rsplit_once('.') else {
                    return false;
                };
                if !JS_EXTENSIONS.contains(&ext) {
                    return false;
                }
                stem.rsplit_once('.').is_some_and(|(base, marker)| {
                    !base.is_empty() && (marker == "test" || marker == "spec")
                })
            }
        }
    }
}

/// Classify a path by its file name.
#[must_use]
pub fn classify(path: &Path) -> Option<Ecosystem> {
    let name = path.file_name()?.to_str()?;
    Ecosystem::ALL
        .into_iter()
        .find(|ecosystem| ecosystem.matches_file_name(name))
}

/// Disjoint, sorted per-ecosystem file lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredFiles {
    pub python: Vec<PathBuf>,
    pub javascript: Vec<PathBuf>,
}

impl DiscoveredFiles {
    #[must_use]
    pub fn for_ecosystem(&self, ecosystem: Ecosystem) -> &[PathBuf] {
        match ecosystem {
            Ecosystem::Python => &self.python,
            Ecosystem::JavaScript => &self.javascript,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.python.len() + self.javascript.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every file tagged with its ecosystem, python first.
    pub fn iter(&self) -> impl Iterator<Item = (Ecosystem, &Path)> {
        self.python
            .iter()
            .map(|p| (Ecosystem::Python, p.as_path()))
            .chain(
                self.javascript
                    .iter()
                    .map(|p| (Ecosystem::JavaScript, p.as_path())),
            )
    }

    #[must_use]
    pub fn counts(&self) -> BTreeMap<Ecosystem, usize> {
        Ecosystem::ALL
            .into_iter()
            .map(|ecosystem| (ecosystem, self.for_ecosystem(ecosystem).len()))
            .collect()
    }
}

/// Directory walker with the standard exclusions plus caller-provided ones.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    extra_excludes: Vec<PathBuf>,
}

impl Discovery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also skip these directories (typically the output and backup roots).
    #[must_use]
    pub fn excluding<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.extra_excludes.extend(dirs.into_iter().map(Into::into));
        self
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            return false;
        }
        let excluded_name = entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name));
        excluded_name || self.extra_excludes.iter().any(|dir| entry.path() == dir)
    }

    /// Walk `root` and classify test files.
    ///
    /// A missing root yields empty lists. Unreadable entries are skipped.
    #[must_use]
    pub fn discover(&self, root: &Path) -> DiscoveredFiles {
        let mut found = DiscoveredFiles::default();
        if !root.exists() {
            tracing::debug!(root = %root.display(), "Discovery root does not exist");
            return found;
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match classify(entry.path()) {
                Some(Ecosystem::Python) => found.python.push(entry.into_path()),
                Some(Ecosystem::JavaScript) => found.javascript.push(entry.into_path()),
                None => {}
            }
        }

        found.python.sort();
        found.javascript.sort();
        tracing::info!(
            root = %root.display(),
            python = found.python.len(),
            javascript = found.javascript.len(),
            "Discovered test files"
        );
        found
    }
}

/// Discover with only the standard exclusions.
#[must_use]
pub fn discover(root: &Path) -> DiscoveredFiles {
    Discovery::new().discover(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn python_naming_convention() {
        let py = Ecosystem::Python;
        assert!(py.matches_file_name("test_auth.py"));
        assert!(py.matches_file_name("auth_test.py"));
        assert!(!py.matches_file_name("test_.py"));
        assert!(!py.matches_file_name("auth.py"));
        assert!(!py.matches_file_name("test_auth.pyc"));
        assert!(!py.matches_file_name("conftest.py"));
    }

    #[test]
    fn javascript_naming_convention() {
        let js = Ecosystem::JavaScript;
        assert!(js.matches_file_name("button.test.tsx"));
        assert!(js.matches_file_name("api.spec.js"));
        assert!(js.matches_file_name("util.test.mjs"));
        assert!(!js.matches_file_name("button.tsx"));
        assert!(!js.matches_file_name(".test.ts"));
        assert!(!js.matches_file_name("button.test.py"));
    }

    #[test]
    fn discovers_and_excludes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(root, "tests/test_a.py");
        touch(root, "tests/unit/b_test.py");
        touch(root, "web/src/button.test.tsx");
        touch(root, "web/node_modules/pkg/x.test.js");
        touch(root, ".venv/lib/test_site.py");
        touch(root, "out/test_generated.py");
        touch(root, "tests/helpers.py");

        let found = Discovery::new()
            .excluding([root.join("out")])
            .discover(root);
        assert_eq!(
            found.python,
            vec![root.join("tests/test_a.py"), root.join("tests/unit/b_test.py")]
        );
        assert_eq!(found.javascript, vec![root.join("web/src/button.test.tsx")]);
        assert_eq!(found.counts()[&Ecosystem::Python], 2);
    }

    #[test]
    fn missing_root_is_empty() {
        let found = discover(Path::new("/no/such/dir/for/tj"));
        assert!(found.is_empty());
    }

    #[test]
    fn discovery_is_idempotent() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "b/test_z.py");
        touch(temp.path(), "a/test_y.py");
        touch(temp.path(), "c.spec.ts");
        assert_eq!(discover(temp.path()), discover(temp.path()));
    }
}
