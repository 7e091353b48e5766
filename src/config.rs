//! File-backed guard configuration
//!
//! One JSON document feeds every construction surface. Every field has a
//! default, so `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "workspace_dir": "/home/me/project",
//!   "authorization": { "allowed_command_prefixes": ["git status", "cargo test"] },
//!   "sandbox": { "enforcement": "strict", "read_only_paths": ["/srv/fixtures"] },
//!   "jobs": { "max_output_lines": 5000 },
//!   "logging": { "level": "debug" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::authorization::AuthorizationOptions;
use crate::core::{GuardError, GuardResult};
use crate::jobs::JobsConfig;
use crate::logging::LoggingConfig;
use crate::permissions::resolve_root;
use crate::sandbox::SandboxConfig;

/// Complete configuration for a guard session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Workspace root; the current directory when unset
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// Directory holding persisted approvals; `$HOME/.shadow` when unset
    ///
    /// Must not sit under any read-write sandbox rule.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub authorization: AuthorizationOptions,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> GuardResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!("[GuardConfig] Loaded {}", path.display());
        Ok(config)
    }

    /// Parse a JSON configuration string
    pub fn from_json_str(content: &str) -> GuardResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> GuardResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The canonical workspace directory
    ///
    /// Relative paths resolve against the current directory, which is also
    /// the fallback when no workspace is configured.
    pub fn resolved_workspace_dir(&self) -> GuardResult<PathBuf> {
        let dir = self.workspace_dir.as_deref().unwrap_or_else(|| Path::new("."));
        Ok(resolve_root(dir)?)
    }

    /// The canonical state directory, falling back to `$HOME/.shadow`
    pub fn resolved_state_dir(&self) -> GuardResult<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(resolve_root(dir)?),
            None => {
                let home = std::env::var_os("HOME")
                    .filter(|home| !home.is_empty())
                    .ok_or_else(|| {
                        GuardError::other("HOME is not set and no state_dir is configured")
                    })?;
                Ok(resolve_root(&PathBuf::from(home).join(".shadow"))?)
            }
        }
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn with_authorization(mut self, options: AuthorizationOptions) -> Self {
        self.authorization = options;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_jobs(mut self, jobs: JobsConfig) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::EnforcementMode;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = GuardConfig::from_json_str("{}").unwrap();
        assert_eq!(config, GuardConfig::default());
        assert!(config.sandbox.include_default_paths);
        assert!(!config.authorization.dangerously_allow_all);
    }

    #[test]
    fn test_parse_nested_sections() {
        let config = GuardConfig::from_json_str(
            r#"{
                "workspace_dir": "/work",
                "authorization": {
                    "allowed_domains": ["*.example.com"],
                    "allowed_command_prefixes": ["git status"]
                },
                "sandbox": { "enforcement": "strict", "read_only_paths": ["/srv"] },
                "jobs": { "max_output_lines": 50, "kill_grace_ms": 100 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.workspace_dir, Some(PathBuf::from("/work")));
        assert_eq!(config.authorization.allowed_domains, vec!["*.example.com"]);
        assert_eq!(config.sandbox.enforcement, EnforcementMode::Strict);
        assert_eq!(config.jobs.max_output_lines, 50);
        assert_eq!(config.jobs.kill_grace_ms, 100);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("guard.json");
        let config = GuardConfig::new()
            .with_workspace_dir("/work")
            .with_jobs(JobsConfig::new().with_default_wait_timeout(5_000));

        config.save(&path).unwrap();
        assert_eq!(GuardConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_relative_workspace_resolves_against_current_dir() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();

        let config = GuardConfig::new().with_workspace_dir(".");
        assert_eq!(config.resolved_workspace_dir().unwrap(), cwd);
        assert_eq!(GuardConfig::new().resolved_workspace_dir().unwrap(), cwd);

        let nested = GuardConfig::new().with_workspace_dir("src");
        assert_eq!(nested.resolved_workspace_dir().unwrap(), cwd.join("src"));
    }

    #[test]
    fn test_state_dir_override() {
        let dir = TempDir::new().unwrap();
        let config = GuardConfig::new().with_state_dir(dir.path());
        assert_eq!(
            config.resolved_state_dir().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(GuardConfig::from_json_str("{not json").is_err());
        assert!(GuardConfig::load("/definitely/missing.json").is_err());
    }
}
