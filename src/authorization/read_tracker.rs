//! Session read-tracking
//!
//! The read tool records every file it returns to the model here. The
//! `write_file_diff` policy refuses to edit a file the model never read.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::permissions::{resolve_path, resolve_root_or_keep};

/// Set of files read during the current session
#[derive(Debug)]
pub struct ReadTracker {
    base_dir: PathBuf,
    read: RwLock<HashSet<PathBuf>>,
}

impl ReadTracker {
    /// Create a tracker resolving relative paths against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir: PathBuf = base_dir.into();
        Self {
            base_dir: resolve_root_or_keep(&base_dir),
            read: RwLock::new(HashSet::new()),
        }
    }

    /// Record that `path` was read
    pub fn mark_read(&self, path: impl AsRef<Path>) {
        let resolved = resolve_path(path.as_ref(), &self.base_dir);
        tracing::debug!("[ReadTracker] Marked read: {}", resolved.display());
        self.read
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(resolved);
    }

    /// Whether `path` was read in this session
    pub fn has_read(&self, path: impl AsRef<Path>) -> bool {
        let resolved = resolve_path(path.as_ref(), &self.base_dir);
        self.read
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&resolved)
    }

    /// Number of distinct files read
    pub fn len(&self) -> usize {
        self.read.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if nothing was read yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all reads
    pub fn clear(&self) {
        self.read.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_and_absolute_agree() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.go"), "package a").unwrap();

        let tracker = ReadTracker::new(dir.path());
        assert!(!tracker.has_read("a.go"));

        tracker.mark_read("./a.go");
        assert!(tracker.has_read(dir.path().join("a.go")));
        assert_eq!(tracker.len(), 1);

        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_relative_base_uses_current_dir() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        let tracker = ReadTracker::new(".");

        tracker.mark_read("Cargo.toml");
        assert!(tracker.has_read(cwd.join("Cargo.toml")));
        assert!(!tracker.has_read("/Cargo.toml"));
    }
}
