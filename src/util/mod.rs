//! Shared utilities for `test_janitor`.
//!
//! Common functionality used across modules:
//! - Content hashing (SHA256) for backup manifests
//! - Time parsing and formatting
//! - Progress indicators
//! - Atomic artifact persistence

mod hash;
pub mod progress;
pub mod time;

pub use hash::{content_hash, file_hash};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::{JanitorError, Result, ResultExt};

/// Render `path` relative to `root` with forward slashes.
///
/// Falls back to the full path when `path` is not under `root`.
#[must_use]
pub fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        rel.to_string_lossy().into_owned()
    } else {
        parts.join("/")
    }
}

/// Collapse runs of whitespace into single spaces and trim.
#[must_use]
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Write bytes atomically: temp file in the same directory, then rename.
///
/// # Errors
///
/// Returns an error if the parent cannot be created or the write fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    fs::create_dir_all(&parent)?;

    let file_name = path
        .file_name()
        .map_or_else(|| "artifact".to_string(), |n| n.to_string_lossy().into_owned());
    let tmp = parent.join(format!(".{file_name}.tmp"));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');
    write_atomic(path, &body)
}

/// Read a JSON artifact written by [`write_json`].
///
/// # Errors
///
/// Returns `ArtifactNotFound` if missing, or a parse error if malformed.
pub fn read_json<T: DeserializeOwned>(path: &Path, phase: &'static str) -> Result<T> {
    if !path.is_file() {
        return Err(JanitorError::ArtifactNotFound {
            path: path.to_path_buf(),
            phase,
        });
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).map_err(|err| JanitorError::parse(path, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_display() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_display(root, Path::new("/repo/tests/test_a.py")),
            "tests/test_a.py"
        );
        assert_eq!(relative_display(root, Path::new("/other/x.py")), "other/x.py");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  client =   make()\t"), "client = make()");
    }

    #[test]
    fn test_json_roundtrip_and_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("a.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = read_json(&path, "analyze").unwrap();
        assert_eq!(back, vec![1, 2, 3]);

        let missing = read_json::<Vec<i32>>(&temp.path().join("nope.json"), "analyze");
        assert!(matches!(missing, Err(JanitorError::ArtifactNotFound { .. })));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert!(!temp.path().join(".f.txt.tmp").exists());
    }
}
