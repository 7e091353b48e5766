//! Authorization options
//!
//! Process-wide configuration snapshot handed to the authorization actor at
//! construction. After that the actor owns it; the only way to change it is
//! through session approvals, which are append-only.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the authorization actor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationOptions {
    /// **DANGEROUS:** allow every request without evaluation
    #[serde(default)]
    pub dangerously_allow_all: bool,

    /// Allow all network egress from sandboxed code
    #[serde(default)]
    pub allow_all_network: bool,

    /// Pre-authorized directories (read-write)
    #[serde(default)]
    pub allowed_directories: Vec<PathBuf>,

    /// Pre-authorized directories (read-only)
    #[serde(default)]
    pub read_only_directories: Vec<PathBuf>,

    /// Pre-authorized individual files (read-write)
    #[serde(default)]
    pub allowed_files: Vec<PathBuf>,

    /// Pre-authorized domains (`example.com` or `*.example.com`)
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Pre-authorized shell command prefixes (`git status`, `ls`)
    #[serde(default)]
    pub allowed_command_prefixes: Vec<String>,

    /// Maximum time a caller waits for a decision, in milliseconds
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl AuthorizationOptions {
    /// Create options with nothing pre-authorized
    pub fn new() -> Self {
        Self::default()
    }

    /// **DANGEROUS:** allow every request without evaluation
    pub fn with_dangerously_allow_all(mut self, enabled: bool) -> Self {
        self.dangerously_allow_all = enabled;
        self
    }

    /// Allow all network egress
    pub fn with_allow_all_network(mut self, enabled: bool) -> Self {
        self.allow_all_network = enabled;
        self
    }

    /// Pre-authorize a directory for reads and writes
    pub fn allow_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.allowed_directories.push(dir.into());
        self
    }

    /// Pre-authorize a directory for reads only
    pub fn allow_read_only_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.read_only_directories.push(dir.into());
        self
    }

    /// Pre-authorize a single file
    pub fn allow_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.allowed_files.push(file.into());
        self
    }

    /// Pre-authorize a domain pattern
    pub fn allow_domain(mut self, domain: impl Into<String>) -> Self {
        self.allowed_domains.push(domain.into());
        self
    }

    /// Pre-authorize a command prefix
    pub fn allow_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.allowed_command_prefixes.push(prefix.into());
        self
    }

    /// Set the maximum time a caller waits for a decision
    pub fn with_request_timeout(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = Some(timeout_ms);
        self
    }

    /// Get the request timeout as Duration
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
