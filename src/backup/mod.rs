//! Full-tree backups taken before cleanup mutates anything.
//!
//! Layout under the backup root:
//!
//! ```text
//! <backup-root>/
//!   20260101_120000/
//!     manifest.json   source, creation time, SHA256 per file
//!     tree/           verbatim copy of the target minus caches
//! ```
//!
//! Restoring deletes the live tree (leaving excluded directories alone),
//! copies the backup back and verifies every file against the manifest.

use crate::config::JanitorConfig;
use crate::discovery::EXCLUDED_DIRS;
use crate::error::{JanitorError, Result, ResultExt};
use crate::util::time::STAMP_FORMAT;
use crate::util::{file_hash, read_json, relative_display, write_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub const TREE_DIR: &str = "tree";
pub const MANIFEST_FILE: &str = "manifest.json";

/// What a backup contains and how to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub source: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Relative path (forward slashes) to hex SHA256.
    pub files: BTreeMap<String, String>,
}

/// A backup found under the backup root.
#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
}

/// Creates, lists, restores and prunes backups of one target tree.
#[derive(Debug, Clone)]
pub struct BackupManager {
    source: PathBuf,
    root: PathBuf,
    excludes: Vec<PathBuf>,
}

impl BackupManager {
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            source: source.into(),
            excludes: vec![root.clone()],
            root,
        }
    }

    /// Manager for a target, skipping the output, backup and history dirs.
    #[must_use]
    pub fn for_config(config: &JanitorConfig) -> Self {
        Self::new(&config.target, &config.backup_dir).excluding([
            config.output_dir.clone(),
            config.analysis.history_dir.clone(),
        ])
    }

    #[must_use]
    pub fn excluding<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.excludes.extend(dirs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if !is_dir {
            return false;
        }
        let cache = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name));
        cache || self.excludes.iter().any(|dir| dir == path)
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        entry.depth() == 0 || !self.is_excluded(entry.path(), entry.file_type().is_dir())
    }

    /// Regular files of the live tree, relative to the source.
    fn live_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.source)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| self.keep_entry(entry));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.path().to_path_buf());
            } else if entry.file_type().is_symlink() {
                tracing::debug!(path = %entry.path().display(), "Skipping symlink in backup");
            }
        }
        Ok(files)
    }

    fn unique_dir(&self, created_at: DateTime<Utc>) -> PathBuf {
        let stamp = created_at.format(STAMP_FORMAT).to_string();
        let mut candidate = self.root.join(&stamp);
        let mut n = 2;
        while candidate.exists() {
            candidate = self.root.join(format!("{stamp}_{n}"));
            n += 1;
        }
        candidate
    }

    /// Copy the live tree into a new timestamped backup.
    ///
    /// # Errors
    ///
    /// Returns `TargetNotFound` if the source is missing, or an I/O error.
    pub fn create(&self) -> Result<BackupEntry> {
        if !self.source.is_dir() {
            return Err(JanitorError::TargetNotFound {
                path: self.source.clone(),
            });
        }
        let created_at = Utc::now();
        let dir = self.unique_dir(created_at);
        let tree = dir.join(TREE_DIR);
        fs::create_dir_all(&tree)?;

        let mut files = BTreeMap::new();
        for path in self.live_files()? {
            let rel = relative_display(&self.source, &path);
            let dest = tree.join(&rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&path, &dest).with_context(|| format!("backing up {rel}"))?;
            files.insert(rel, file_hash(&dest)?);
        }

        let manifest = BackupManifest {
            source: self.source.clone(),
            created_at,
            files,
        };
        write_json(&dir.join(MANIFEST_FILE), &manifest)?;
        tracing::info!(
            backup = %dir.display(),
            files = manifest.files.len(),
            "Created backup"
        );
        Ok(entry_for(dir, &manifest))
    }

    /// Backups under the root, newest first. Directories without a readable
    /// manifest are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup root cannot be read.
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match read_json::<BackupManifest>(&path.join(MANIFEST_FILE), "run") {
                Ok(manifest) => entries.push(entry_for(path, &manifest)),
                Err(err) => {
                    tracing::debug!(
                        path = %path.display(),
                        error = %err,
                        "Ignoring directory without manifest"
                    );
                }
            }
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.name.cmp(&a.name)));
        Ok(entries)
    }

    /// The newest backup.
    ///
    /// # Errors
    ///
    /// Returns `BackupNotFound` when the root holds no backup.
    pub fn latest(&self) -> Result<BackupEntry> {
        self.list()?
            .into_iter()
            .next()
            .ok_or_else(|| JanitorError::BackupNotFound {
                path: self.root.clone(),
            })
    }

    /// Accept a backup directory, or a backup name under the root.
    ///
    /// # Errors
    ///
    /// Returns `BackupNotFound` if neither holds a manifest.
    pub fn resolve(&self, backup: &Path) -> Result<PathBuf> {
        [backup.to_path_buf(), self.root.join(backup)]
            .into_iter()
            .find(|dir| dir.join(MANIFEST_FILE).is_file())
            .ok_or_else(|| JanitorError::BackupNotFound {
                path: backup.to_path_buf(),
            })
    }

    fn verify(tree: &Path, manifest: &BackupManifest) -> Result<()> {
        for (rel, expected) in &manifest.files {
            let path = tree.join(rel);
            let actual = file_hash(&path).map_err(|err| JanitorError::BackupIntegrity {
                path: path.clone(),
                reason: err.to_string(),
            })?;
            if &actual != expected {
                return Err(JanitorError::BackupIntegrity {
                    path,
                    reason: format!("hash {actual} does not match manifest {expected}"),
                });
            }
        }
        Ok(())
    }

    /// Remove everything under `dir` except excluded directories and
    /// symlinks, neither of which is part of a backup.
    fn clear(&self, dir: &Path) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                if self.is_excluded(&path, true) {
                    continue;
                }
                self.clear(&path)?;
                if fs::read_dir(&path)?.next().is_none() {
                    fs::remove_dir(&path)?;
                }
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Restore a backup over the live tree and verify it byte-for-byte.
    ///
    /// The backup itself is verified first; a corrupt backup leaves the live
    /// tree untouched. Returns the number of files restored.
    ///
    /// # Errors
    ///
    /// Returns `BackupNotFound`, `BackupIntegrity`, or an I/O error.
    pub fn restore(&self, backup: &Path) -> Result<usize> {
        let dir = self.resolve(backup)?;
        let manifest: BackupManifest = read_json(&dir.join(MANIFEST_FILE), "run")?;
        let tree = dir.join(TREE_DIR);
        Self::verify(&tree, &manifest)?;

        fs::create_dir_all(&self.source)?;
        self.clear(&self.source)?;
        for rel in manifest.files.keys() {
            let dest = self.source.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(tree.join(rel), &dest)?;
        }
        Self::verify(&self.source, &manifest)?;
        tracing::info!(
            backup = %dir.display(),
            files = manifest.files.len(),
            "Restored backup"
        );
        Ok(manifest.files.len())
    }

    /// Restore the newest backup.
    ///
    /// # Errors
    ///
    /// See [`Self::restore`].
    pub fn restore_latest(&self) -> Result<usize> {
        let latest = self.latest()?;
        self.restore(&latest.path)
    }

    /// Delete all but the `keep` newest backups. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a backup directory cannot be deleted.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let mut removed = 0;
        for entry in self.list()?.into_iter().skip(keep) {
            fs::remove_dir_all(&entry.path)?;
            removed += 1;
        }
        if removed > 0 {
            tracing::debug!(removed, keep, "Pruned old backups");
        }
        Ok(removed)
    }
}

fn entry_for(path: PathBuf, manifest: &BackupManifest) -> BackupEntry {
    BackupEntry {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path,
        created_at: manifest.created_at,
        file_count: manifest.files.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(root: &Path) {
        fs::create_dir_all(root.join("tests/unit")).unwrap();
        fs::create_dir_all(root.join("node_modules/vitest")).unwrap();
        fs::write(root.join("tests/test_a.py"), "def test_a():\n    assert 1\n").unwrap();
        fs::write(root.join("tests/unit/math.test.ts"), b"test('x', () => {});\n\xff").unwrap();
        fs::write(root.join("node_modules/vitest/index.js"), "module.exports = {};\n").unwrap();
    }

    #[test]
    fn restore_is_byte_for_byte() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("suite");
        seed(&target);
        let manager = BackupManager::new(&target, target.join(".test-janitor-backups"));
        let backup = manager.create().unwrap();
        assert_eq!(backup.file_count, 2);
        assert!(!backup.path.join("tree/node_modules").exists());

        fs::write(target.join("tests/test_a.py"), "# edited\n").unwrap();
        fs::remove_file(target.join("tests/unit/math.test.ts")).unwrap();
        fs::write(target.join("tests/conftest.py"), "import pytest\n").unwrap();

        assert_eq!(manager.restore(&backup.path).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(target.join("tests/test_a.py")).unwrap(),
            "def test_a():\n    assert 1\n"
        );
        assert_eq!(
            fs::read(target.join("tests/unit/math.test.ts")).unwrap(),
            b"test('x', () => {});\n\xff"
        );
        assert!(!target.join("tests/conftest.py").exists());
        assert!(target.join("node_modules/vitest/index.js").exists());
        assert!(backup.path.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn list_latest_and_prune() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("suite");
        seed(&target);
        let manager = BackupManager::new(&target, temp.path().join("backups"));
        assert!(matches!(manager.latest(), Err(JanitorError::BackupNotFound { .. })));

        let first = manager.create().unwrap();
        let second = manager.create().unwrap();
        assert_ne!(first.path, second.path);
        let listed = manager.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(manager.latest().unwrap().path, listed[0].path);

        assert_eq!(manager.prune(1).unwrap(), 1);
        assert_eq!(manager.list().unwrap().len(), 1);
        assert_eq!(manager.prune(1).unwrap(), 0);
    }

    #[test]
    fn corrupt_backup_leaves_live_tree_alone() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("suite");
        seed(&target);
        let manager = BackupManager::new(&target, temp.path().join("backups"));
        let backup = manager.create().unwrap();
        fs::write(backup.path.join("tree/tests/test_a.py"), "tampered\n").unwrap();
        fs::write(target.join("tests/test_a.py"), "live\n").unwrap();

        let err = manager.restore(&backup.path).unwrap_err();
        assert!(matches!(err, JanitorError::BackupIntegrity { .. }));
        assert_eq!(fs::read_to_string(target.join("tests/test_a.py")).unwrap(), "live\n");
    }

    #[test]
    fn resolves_backup_by_name() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("suite");
        seed(&target);
        let manager = BackupManager::new(&target, temp.path().join("backups"));
        let backup = manager.create().unwrap();
        assert_eq!(manager.resolve(Path::new(&backup.name)).unwrap(), backup.path);
        assert!(matches!(
            manager.resolve(Path::new("19990101_000000")),
            Err(JanitorError::BackupNotFound { .. })
        ));
    }

    #[test]
    fn config_excludes_output_and_history() {
        let temp = TempDir::new().unwrap();
        let target = temp.path();
        seed(target);
        let config = JanitorConfig::defaults_for(target);
        fs::create_dir_all(&config.output_dir).unwrap();
        fs::write(config.output_dir.join("analysis_report.json"), "{}").unwrap();
        fs::create_dir_all(&config.analysis.history_dir).unwrap();
        fs::write(config.analysis.history_dir.join("run.json"), "{}").unwrap();

        let manager = BackupManager::for_config(&config);
        let backup = manager.create().unwrap();
        assert_eq!(backup.file_count, 2);

        fs::write(config.output_dir.join("cleanup_log.json"), "{}").unwrap();
        manager.restore_latest().unwrap();
        assert!(config.output_dir.join("cleanup_log.json").exists());
        assert!(config.analysis.history_dir.join("run.json").exists());
    }
}
