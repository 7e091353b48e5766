//! Workspace-persisted approvals
//!
//! Approvals granted with [`ApprovalScope::Workspace`] are appended to
//! `<state_dir>/workspaces/<workspace key>/approvals.json` and loaded back
//! into the authorization actor when the next session starts. The state
//! directory lives outside the workspace (by default `$HOME/.shadow`) so
//! sandboxed processes cannot rewrite the approvals of later sessions.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::matchers::DomainPattern;
use super::paths::AllowedPath;
use crate::core::GuardResult;

/// Subdirectory of the state directory with one entry per workspace
const WORKSPACES_DIR: &str = "workspaces";

/// File name of the persisted approvals
const APPROVALS_FILE: &str = "approvals.json";

/// How long an approval lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalScope {
    /// Until the session ends (in-memory)
    Session,
    /// Persisted for every future session in this workspace
    Workspace,
}

/// Approvals persisted for a workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedApprovals {
    /// Approved command prefixes
    #[serde(default)]
    pub command_prefixes: Vec<String>,

    /// Approved domains
    #[serde(default)]
    pub domains: Vec<DomainPattern>,

    /// Approved paths
    #[serde(default)]
    pub paths: Vec<AllowedPath>,
}

impl PersistedApprovals {
    /// Check if nothing has been approved
    pub fn is_empty(&self) -> bool {
        self.command_prefixes.is_empty() && self.domains.is_empty() && self.paths.is_empty()
    }
}

/// File-backed store for workspace approvals
#[derive(Debug)]
pub struct ApprovalStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ApprovalStore {
    /// Create the store for `workspace_dir` under `state_dir`
    pub fn for_workspace(state_dir: impl AsRef<Path>, workspace_dir: impl AsRef<Path>) -> Self {
        Self::with_file(
            state_dir
                .as_ref()
                .join(WORKSPACES_DIR)
                .join(workspace_key(workspace_dir.as_ref()))
                .join(APPROVALS_FILE),
        )
    }

    /// Create a store backed by a specific file
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted approvals (empty if the file does not exist)
    pub fn load(&self) -> GuardResult<PersistedApprovals> {
        if !self.path.exists() {
            return Ok(PersistedApprovals::default());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let approvals = serde_json::from_reader(reader)?;
        Ok(approvals)
    }

    /// Append a command prefix
    pub fn add_command_prefix(&self, prefix: impl Into<String>) -> GuardResult<()> {
        let prefix = prefix.into();
        self.update(|a| {
            if !a.command_prefixes.contains(&prefix) {
                a.command_prefixes.push(prefix);
            }
        })
    }

    /// Append a domain
    pub fn add_domain(&self, domain: DomainPattern) -> GuardResult<()> {
        self.update(|a| {
            if !a.domains.contains(&domain) {
                a.domains.push(domain);
            }
        })
    }

    /// Append a path
    pub fn add_path(&self, path: AllowedPath) -> GuardResult<()> {
        self.update(|a| {
            if !a.paths.contains(&path) {
                a.paths.push(path);
            }
        })
    }

    fn update(&self, apply: impl FnOnce(&mut PersistedApprovals)) -> GuardResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut approvals = self.load()?;
        apply(&mut approvals);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &approvals)?;

        tracing::info!("[ApprovalStore] Saved workspace approvals to {}", self.path.display());
        Ok(())
    }
}

/// Flatten a workspace path into a single directory name
///
/// `/home/me/project` becomes `-home-me-project`.
fn workspace_key(workspace_dir: &Path) -> String {
    workspace_dir
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PathAccess;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_empty() {
        let state = TempDir::new().unwrap();
        let store = ApprovalStore::for_workspace(state.path(), "/work/project");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_store_lives_under_state_dir() {
        let state = TempDir::new().unwrap();
        let store = ApprovalStore::for_workspace(state.path(), "/home/me/my project");
        assert_eq!(
            store.path(),
            state
                .path()
                .join("workspaces")
                .join("-home-me-my-project")
                .join("approvals.json")
        );
        assert!(!store.path().starts_with("/home/me/my project"));
    }

    #[test]
    fn test_round_trip_and_dedup() {
        let state = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let store = ApprovalStore::for_workspace(state.path(), dir.path());

        store.add_command_prefix("cargo test").unwrap();
        store.add_command_prefix("cargo test").unwrap();
        store
            .add_domain(DomainPattern::parse("*.crates.io").unwrap())
            .unwrap();
        store
            .add_path(AllowedPath {
                path: dir.path().join("out"),
                access: PathAccess::ReadWrite,
            })
            .unwrap();

        let reopened = ApprovalStore::for_workspace(state.path(), dir.path());
        let approvals = reopened.load().unwrap();
        assert_eq!(approvals.command_prefixes, vec!["cargo test".to_string()]);
        assert_eq!(approvals.domains.len(), 1);
        assert_eq!(approvals.paths[0].access, PathAccess::ReadWrite);
        assert!(reopened.path().starts_with(state.path()));
        assert!(!dir.path().join(".shadow").exists());
    }
}
