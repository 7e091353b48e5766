//! Sandbox configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What to do when the OS restriction cannot be applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Log a warning and run unrestricted
    #[default]
    BestEffort,
    /// Refuse to run
    Strict,
}

/// Configuration for the OS capability sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// **DANGEROUS:** run supervised processes without any restriction
    #[serde(default)]
    pub disable_sandbox: bool,

    /// Behaviour when the kernel cannot enforce the restriction
    #[serde(default)]
    pub enforcement: EnforcementMode,

    /// Extra paths readable by sandboxed processes
    #[serde(default)]
    pub read_only_paths: Vec<PathBuf>,

    /// Extra paths readable and writable by sandboxed processes
    #[serde(default)]
    pub read_write_paths: Vec<PathBuf>,

    /// Include the detected system and package-manager paths
    #[serde(default = "default_true")]
    pub include_default_paths: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            disable_sandbox: false,
            enforcement: EnforcementMode::BestEffort,
            read_only_paths: Vec::new(),
            read_write_paths: Vec::new(),
            include_default_paths: true,
        }
    }
}

impl SandboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable the sandbox entirely
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disable_sandbox = disabled;
        self
    }

    /// Set the enforcement mode
    pub fn with_enforcement(mut self, mode: EnforcementMode) -> Self {
        self.enforcement = mode;
        self
    }

    /// Add a read-only path
    pub fn read_only(mut self, path: impl Into<PathBuf>) -> Self {
        self.read_only_paths.push(path.into());
        self
    }

    /// Add a read-write path
    pub fn read_write(mut self, path: impl Into<PathBuf>) -> Self {
        self.read_write_paths.push(path.into());
        self
    }

    /// Include or skip the detected default paths
    pub fn with_default_paths(mut self, include: bool) -> Self {
        self.include_default_paths = include;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: SandboxConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SandboxConfig::default());
        assert!(config.include_default_paths);
        assert_eq!(config.enforcement, EnforcementMode::BestEffort);
    }

    #[test]
    fn test_strict_mode_from_json() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{"enforcement": "strict", "read_only_paths": ["/data"]}"#)
                .unwrap();
        assert_eq!(config.enforcement, EnforcementMode::Strict);
        assert_eq!(config.read_only_paths, vec![PathBuf::from("/data")]);
    }
}
