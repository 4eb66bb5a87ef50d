#![allow(dead_code)]

use assert_cmd::Command;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        test_janitor::logging::init_test_logging();
    });
}

pub struct TestLogGuard {
    name: String,
    start: Instant,
}

impl Drop for TestLogGuard {
    fn drop(&mut self) {
        info!(
            "{}: assertions passed (elapsed {:?})",
            self.name,
            self.start.elapsed()
        );
    }
}

pub fn test_log(name: &str) -> TestLogGuard {
    init_test_logging();
    info!("{name}: starting");
    TestLogGuard {
        name: name.to_string(),
        start: Instant::now(),
    }
}

pub const DUPLICATE_A: &str = "def test_example():\n    assert 1 == 1\n\n\n\
    def test_unique_alpha():\n    value = 3\n    assert value * 2 == 6\n";
pub const DUPLICATE_B: &str = "def test_example():\n    assert 1 == 1\n";
pub const OBSOLETE: &str =
    "# DEPRECATED: covered by test_a\n\ndef test_legacy_path():\n    assert True\n";
pub const VITEST: &str = "import { describe, it, expect } from 'vitest';\n\n\
                          describe('math', () => {\n  it('adds', () => {\n    \
                          expect(1 + 1).toBe(2);\n  });\n});\n";

/// A scratch suite with an isolated HOME so user config never leaks in.
pub struct SuiteWorkspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
}

impl SuiteWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().join("suite");
        let home = temp_dir.path().join("home");
        fs::create_dir_all(&root).expect("suite dir");
        fs::create_dir_all(&home).expect("home dir");
        Self {
            temp_dir,
            root,
            home,
        }
    }

    /// Mixed pytest and Vitest suite: one exact duplicate pair, one obsolete
    /// file, one valuable test of each ecosystem.
    pub fn mixed() -> Self {
        let workspace = Self::new();
        workspace.write("tests/test_a.py", DUPLICATE_A);
        workspace.write("tests/test_b.py", DUPLICATE_B);
        workspace.write("tests/test_old.py", OBSOLETE);
        workspace.write("web/math.test.ts", VITEST);
        workspace
    }

    pub fn write(&self, rel: &str, body: &str) {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(path, body).expect("write fixture");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).expect("read fixture")
    }

    pub fn output(&self, file: &str) -> PathBuf {
        self.root.join(".test-janitor").join(file)
    }

    /// Every file under the suite except tool-owned directories, with contents.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        snapshot_tree(&self.root)
    }
}

pub fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(
                name.as_ref(),
                ".test-janitor" | ".test-janitor-backups" | ".test-history"
            )
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry
                .path()
                .strip_prefix(root)
                .expect("under root")
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read(entry.path()).expect("read file"))
        })
        .collect()
}

#[derive(Debug)]
pub struct TjRun {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
    pub duration: Duration,
}

impl TjRun {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdout.trim()).expect("stdout is JSON")
    }

    pub fn error_json(&self) -> serde_json::Value {
        let start = self
            .stderr
            .find("{\n  \"error\"")
            .expect("stderr holds a JSON error");
        serde_json::from_str(self.stderr[start..].trim()).expect("stderr is JSON")
    }
}

pub fn run_tj<I, S>(workspace: &SuiteWorkspace, args: I) -> TjRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tj"));
    cmd.current_dir(&workspace.root);
    cmd.args(args);
    cmd.env("NO_COLOR", "1");
    cmd.env("RUST_LOG", "test_janitor=debug");
    cmd.env("HOME", &workspace.home);
    for (key, _) in std::env::vars() {
        if key.starts_with("TJ_") {
            cmd.env_remove(key);
        }
    }

    let start = Instant::now();
    let output = cmd.output().expect("run tj");
    let duration = start.elapsed();

    TjRun {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        status: output.status,
        duration,
    }
}
