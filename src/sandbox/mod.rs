//! OS capability sandbox
//!
//! Restricts filesystem access of supervised processes with Landlock:
//! - The workspace directory is always read-write
//! - Detected system and package-manager paths (read-only unless they are caches)
//! - Paths from configuration and paths granted at runtime
//!
//! Support is detected once at construction. In [`EnforcementMode::Strict`] a
//! process is refused when the restriction cannot be applied; in
//! [`EnforcementMode::BestEffort`] a warning is logged once and the process
//! runs unrestricted. `disable_sandbox` reports [`SandboxStatus::Disabled`].

mod access;
mod config;
#[cfg(target_os = "linux")]
mod linux;
mod rules;

pub use access::{PathAccessRequest, PathGrant};
pub use config::{EnforcementMode, SandboxConfig};
pub use rules::{default_system_paths, merge_rules, RuleSource, SandboxRule};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::Serialize;

use crate::core::{GuardError, GuardResult};
use crate::permissions::{resolve_root_or_keep, AllowedPath, PathAccess};

/// Outcome of the construction-time support check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SandboxStatus {
    /// Turned off by configuration
    Disabled,
    /// Restrictions are applied to every supervised process
    Enforced,
    /// The platform cannot enforce restrictions
    Unavailable(String),
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxStatus::Disabled => write!(f, "disabled"),
            SandboxStatus::Enforced => write!(f, "enforced"),
            SandboxStatus::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

/// Filesystem sandbox for one workspace
#[derive(Debug)]
pub struct Sandbox {
    config: SandboxConfig,
    workspace_dir: PathBuf,
    status: SandboxStatus,
    defaults: Vec<SandboxRule>,
    runtime_grants: RwLock<Vec<AllowedPath>>,
    warned: AtomicBool,
}

impl Sandbox {
    /// Build the sandbox and detect platform support
    pub fn new(config: SandboxConfig, workspace_dir: impl Into<PathBuf>) -> Self {
        let status = if config.disable_sandbox {
            tracing::warn!("[Sandbox] Disabled by configuration; processes run unrestricted");
            SandboxStatus::Disabled
        } else {
            detect_support()
        };
        Self::with_status(config, workspace_dir, status)
    }

    /// Build with a known status (skips support detection)
    pub fn with_status(
        config: SandboxConfig,
        workspace_dir: impl Into<PathBuf>,
        status: SandboxStatus,
    ) -> Self {
        let workspace_dir: PathBuf = workspace_dir.into();
        let workspace_dir = resolve_root_or_keep(&workspace_dir);
        let defaults = if config.include_default_paths {
            default_system_paths()
        } else {
            Vec::new()
        };

        tracing::info!(
            "[Sandbox] Status: {} (mode {:?}, {} default paths)",
            status,
            config.enforcement,
            defaults.len()
        );

        Self {
            config,
            workspace_dir,
            status,
            defaults,
            runtime_grants: RwLock::new(Vec::new()),
            warned: AtomicBool::new(false),
        }
    }

    /// A sandbox that never restricts anything
    pub fn disabled(workspace_dir: impl Into<PathBuf>) -> Self {
        Self::with_status(
            SandboxConfig::new().with_disabled(true).with_default_paths(false),
            workspace_dir,
            SandboxStatus::Disabled,
        )
    }

    pub fn status(&self) -> &SandboxStatus {
        &self.status
    }

    pub fn enforcement(&self) -> EnforcementMode {
        self.config.enforcement
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Whether processes are actually restricted
    pub fn is_enforcing(&self) -> bool {
        self.status == SandboxStatus::Enforced
    }

    /// Add a runtime grant; returns `false` if it was already present
    pub fn grant(&self, path: AllowedPath) -> bool {
        let mut grants = self.runtime_grants.write().unwrap_or_else(|e| e.into_inner());
        if grants.contains(&path) {
            return false;
        }
        tracing::info!(
            "[Sandbox] Granted {} ({})",
            path.path.display(),
            path.access
        );
        grants.push(path);
        true
    }

    /// Runtime grants, in the order they were made
    pub fn grants(&self) -> Vec<AllowedPath> {
        self.runtime_grants
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The merged rule list applied to the next process
    pub fn rules(&self) -> Vec<SandboxRule> {
        merge_rules(
            &self.workspace_dir,
            &self.config,
            &self.grants(),
            self.defaults.clone(),
        )
    }

    /// Whether the merged rules let processes write `path`
    pub fn allows_write(&self, path: &Path) -> bool {
        self.rules()
            .iter()
            .any(|rule| rule.access == PathAccess::ReadWrite && path.starts_with(&rule.path))
    }

    /// Arrange for `command` to be restricted when it is spawned
    ///
    /// Fails in strict mode when the platform cannot enforce restrictions.
    pub fn apply(&self, command: &mut tokio::process::Command) -> GuardResult<()> {
        match &self.status {
            SandboxStatus::Disabled => Ok(()),
            SandboxStatus::Unavailable(reason) => match self.config.enforcement {
                EnforcementMode::Strict => Err(GuardError::SandboxEnforcement(format!(
                    "sandbox required but unavailable: {}",
                    reason
                ))),
                EnforcementMode::BestEffort => {
                    if !self.warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            "[Sandbox] Unavailable ({}); running processes unrestricted",
                            reason
                        );
                    }
                    Ok(())
                }
            },
            SandboxStatus::Enforced => self.install(command),
        }
    }

    #[cfg(target_os = "linux")]
    #[allow(unsafe_code)]
    fn install(&self, command: &mut tokio::process::Command) -> GuardResult<()> {
        let rules = self.rules();
        let prepared = linux::prepare(&rules, self.config.enforcement);
        if prepared.is_empty() {
            tracing::warn!(
                "[Sandbox] None of the {} rule paths could be opened; processes get no filesystem access",
                rules.len()
            );
        } else {
            tracing::debug!(
                "[Sandbox] Applying {} of {} rules",
                prepared.len(),
                rules.len()
            );
        }

        let mut prepared = Some(prepared);
        // SAFETY: pre_exec runs between fork() and exec(). The closure only
        // issues Landlock syscalls over descriptors opened above.
        unsafe {
            command.pre_exec(move || {
                let rules = prepared.take().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "Landlock pre_exec called more than once",
                    )
                })?;
                linux::enforce(rules)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::PermissionDenied, e))
            });
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn install(&self, _command: &mut tokio::process::Command) -> GuardResult<()> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn detect_support() -> SandboxStatus {
    if linux::is_supported() {
        SandboxStatus::Enforced
    } else {
        SandboxStatus::Unavailable(
            "Landlock not available (requires Linux 5.13+ with Landlock enabled)".to_string(),
        )
    }
}

#[cfg(not(target_os = "linux"))]
fn detect_support() -> SandboxStatus {
    SandboxStatus::Unavailable("Landlock is only available on Linux".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_reported() {
        let sandbox = Sandbox::new(SandboxConfig::new().with_disabled(true), "/work");
        assert_eq!(sandbox.status(), &SandboxStatus::Disabled);
        assert!(!sandbox.is_enforcing());

        let mut cmd = tokio::process::Command::new("true");
        sandbox.apply(&mut cmd).unwrap();
    }

    #[test]
    fn test_strict_mode_refuses_when_unavailable() {
        let sandbox = Sandbox::with_status(
            SandboxConfig::new().with_enforcement(EnforcementMode::Strict),
            "/work",
            SandboxStatus::Unavailable("test".into()),
        );
        let mut cmd = tokio::process::Command::new("true");
        let err = sandbox.apply(&mut cmd).unwrap_err();
        assert!(matches!(err, GuardError::SandboxEnforcement(_)));
    }

    #[test]
    fn test_best_effort_continues_when_unavailable() {
        let sandbox = Sandbox::with_status(
            SandboxConfig::new(),
            "/work",
            SandboxStatus::Unavailable("test".into()),
        );
        let mut cmd = tokio::process::Command::new("true");
        sandbox.apply(&mut cmd).unwrap();
        sandbox.apply(&mut cmd).unwrap();
    }

    #[test]
    fn test_runtime_grants_feed_rules() {
        let sandbox = Sandbox::disabled("/work");
        let grant = AllowedPath {
            path: PathBuf::from("/srv/data"),
            access: PathAccess::ReadOnly,
        };

        assert!(sandbox.grant(grant.clone()));
        assert!(!sandbox.grant(grant));

        let rules = sandbox.rules();
        assert_eq!(rules[0].source, RuleSource::Workspace);
        assert!(rules
            .iter()
            .any(|r| r.path == Path::new("/srv/data") && r.source == RuleSource::Runtime));
    }

    #[test]
    fn test_relative_workspace_is_never_root() {
        let sandbox = Sandbox::disabled(".");
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();

        assert_eq!(sandbox.workspace_dir(), cwd.as_path());
        let rules = sandbox.rules();
        assert_eq!(rules[0].path, cwd);
        assert!(rules.iter().all(|r| r.path != Path::new("/")));
    }

    #[test]
    fn test_allows_write_follows_read_write_rules() {
        let sandbox = Sandbox::disabled("/work");
        sandbox.grant(AllowedPath {
            path: PathBuf::from("/srv/data"),
            access: PathAccess::ReadOnly,
        });

        assert!(sandbox.allows_write(Path::new("/work/.shadow/approvals.json")));
        assert!(!sandbox.allows_write(Path::new("/srv/data/approvals.json")));
        assert!(!sandbox.allows_write(Path::new("/home/me/.shadow/approvals.json")));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_enforced_sandbox_blocks_writes_outside_workspace() {
        if !linux::is_supported() {
            return;
        }
        let workspace = tempfile::TempDir::new().unwrap();
        let outside = tempfile::TempDir::new_in(env!("CARGO_MANIFEST_DIR")).unwrap();
        let sandbox = Sandbox::new(SandboxConfig::new(), workspace.path());

        let covered = sandbox
            .rules()
            .iter()
            .any(|r| outside.path().starts_with(&r.path) && r.access == PathAccess::ReadWrite);
        if covered {
            return;
        }

        let inside = workspace.path().join("ok.txt");
        let target = outside.path().join("escape.txt");
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(format!(
                "echo hi > {}; echo hi > {}",
                inside.display(),
                target.display()
            ))
            .current_dir(workspace.path());
        sandbox.apply(&mut cmd).unwrap();

        let _ = cmd.status().await.unwrap();
        assert!(inside.exists());
        assert!(!target.exists());
    }
}
