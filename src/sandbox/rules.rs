//! Sandbox path rules
//!
//! Rules come from three sources, merged in priority order: explicit
//! configuration, runtime grants, then detected defaults. The workspace is
//! always read-write. When two sources name the same path, the first wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::SandboxConfig;
use crate::permissions::{absolutize, resolve_root_or_keep, AllowedPath, PathAccess};

/// Where a rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Workspace,
    Config,
    Runtime,
    Default,
}

/// A single filesystem rule applied to sandboxed processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRule {
    pub path: PathBuf,
    pub access: PathAccess,
    pub source: RuleSource,
}

impl SandboxRule {
    pub fn new(path: impl Into<PathBuf>, access: PathAccess, source: RuleSource) -> Self {
        Self {
            path: path.into(),
            access,
            source,
        }
    }
}

/// System paths needed to run ordinary programs
const SYSTEM_READ_ONLY: &[&str] = &[
    "/usr", "/bin", "/sbin", "/lib", "/lib32", "/lib64", "/libx32", "/etc", "/opt", "/nix/store",
    "/proc", "/sys", "/run",
];

/// System paths programs routinely write to
const SYSTEM_READ_WRITE: &[&str] = &["/tmp", "/var/tmp", "/dev"];

/// Package-manager toolchains under `$HOME` (read-only)
const HOME_READ_ONLY: &[&str] = &[".rustup", ".nvm", ".pyenv", ".local/bin", ".sdkman"];

/// Package-manager caches under `$HOME` (read-write)
const HOME_READ_WRITE: &[&str] = &[
    ".cache",
    ".cargo",
    ".npm",
    ".yarn",
    ".pnpm-store",
    "go/pkg",
    ".m2",
    ".gradle",
];

/// Detect default system and package-manager paths that exist on this machine
pub fn default_system_paths() -> Vec<SandboxRule> {
    let mut rules = Vec::new();

    let mut push_existing = |path: PathBuf, access: PathAccess| {
        if path.exists() {
            rules.push(SandboxRule::new(path, access, RuleSource::Default));
        }
    };

    for path in SYSTEM_READ_ONLY {
        push_existing(PathBuf::from(path), PathAccess::ReadOnly);
    }
    for path in SYSTEM_READ_WRITE {
        push_existing(PathBuf::from(path), PathAccess::ReadWrite);
    }
    if let Some(tmp) = std::env::var_os("TMPDIR") {
        push_existing(PathBuf::from(tmp), PathAccess::ReadWrite);
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        for rel in HOME_READ_ONLY {
            push_existing(home.join(rel), PathAccess::ReadOnly);
        }
        for rel in HOME_READ_WRITE {
            push_existing(home.join(rel), PathAccess::ReadWrite);
        }
    }

    rules
}

/// Merge every rule source into the final rule list
///
/// Glob grants cannot be expressed as kernel rules and are skipped.
pub fn merge_rules(
    workspace_dir: &Path,
    config: &SandboxConfig,
    runtime_grants: &[AllowedPath],
    defaults: Vec<SandboxRule>,
) -> Vec<SandboxRule> {
    let mut merged: Vec<SandboxRule> = Vec::new();
    let mut push = |rule: SandboxRule| {
        if !merged.iter().any(|existing| existing.path == rule.path) {
            merged.push(rule);
        }
    };

    let workspace_dir = resolve_root_or_keep(workspace_dir);
    let workspace_dir = workspace_dir.as_path();
    push(SandboxRule::new(
        workspace_dir.to_path_buf(),
        PathAccess::ReadWrite,
        RuleSource::Workspace,
    ));

    for path in &config.read_write_paths {
        push(SandboxRule::new(
            absolutize(path, workspace_dir),
            PathAccess::ReadWrite,
            RuleSource::Config,
        ));
    }
    for path in &config.read_only_paths {
        push(SandboxRule::new(
            absolutize(path, workspace_dir),
            PathAccess::ReadOnly,
            RuleSource::Config,
        ));
    }

    for grant in runtime_grants {
        if grant.is_glob() {
            tracing::debug!(
                "[Sandbox] Glob grant {} is not enforceable by the kernel; skipping",
                grant.path.display()
            );
            continue;
        }
        push(SandboxRule::new(
            grant.path.clone(),
            grant.access,
            RuleSource::Runtime,
        ));
    }

    if config.include_default_paths {
        for rule in defaults {
            push(rule);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_priority() {
        let workspace = Path::new("/work/project");
        let config = SandboxConfig::new()
            .read_only("/data")
            .read_write("/tmp");
        let grants = vec![
            AllowedPath {
                path: PathBuf::from("/data"),
                access: PathAccess::ReadWrite,
            },
            AllowedPath {
                path: PathBuf::from("/srv/*.log"),
                access: PathAccess::ReadOnly,
            },
        ];
        let defaults = vec![
            SandboxRule::new("/tmp", PathAccess::ReadOnly, RuleSource::Default),
            SandboxRule::new("/usr", PathAccess::ReadOnly, RuleSource::Default),
        ];

        let rules = merge_rules(workspace, &config, &grants, defaults);

        assert_eq!(rules[0].path, PathBuf::from("/work/project"));
        assert_eq!(rules[0].access, PathAccess::ReadWrite);

        let data = rules.iter().find(|r| r.path == Path::new("/data")).unwrap();
        assert_eq!(data.access, PathAccess::ReadOnly);
        assert_eq!(data.source, RuleSource::Config);

        let tmp = rules.iter().find(|r| r.path == Path::new("/tmp")).unwrap();
        assert_eq!(tmp.access, PathAccess::ReadWrite);

        assert!(rules.iter().any(|r| r.path == Path::new("/usr")));
        assert!(!rules.iter().any(|r| r.path.to_string_lossy().contains('*')));
    }

    #[test]
    fn test_defaults_can_be_excluded() {
        let config = SandboxConfig::new().with_default_paths(false);
        let defaults = vec![SandboxRule::new("/usr", PathAccess::ReadOnly, RuleSource::Default)];

        let rules = merge_rules(Path::new("/w"), &config, &[], defaults);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].source, RuleSource::Workspace);
    }

    #[test]
    fn test_relative_workspace_and_paths_use_current_dir() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        let config = SandboxConfig::new().read_only("fixtures");

        let rules = merge_rules(Path::new("."), &config, &[], Vec::new());
        assert_eq!(rules[0].path, cwd);
        assert_eq!(rules[0].access, PathAccess::ReadWrite);
        assert_eq!(rules[1].path, cwd.join("fixtures"));
        assert!(rules.iter().all(|r| r.path != Path::new("/")));
    }

    #[test]
    fn test_default_paths_exist() {
        for rule in default_system_paths() {
            assert!(rule.path.exists(), "{} should exist", rule.path.display());
            assert_eq!(rule.source, RuleSource::Default);
        }
    }
}
