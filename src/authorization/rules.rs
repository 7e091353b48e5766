//! Per-tool authorization policy
//!
//! [`Policy`] holds the pre-authorization state and evaluates one request at
//! a time. It is owned by the actor loop, so none of its state needs a lock.
//!
//! | tool                  | rule |
//! |-----------------------|------|
//! | `write_file_diff`     | pre-authorized path → allow; missing → deny; unread → escalate |
//! | `create_file`         | existing → deny |
//! | `go_sandbox_domain`   | allow-listed or all-network → allow; otherwise judge |
//! | `shell`               | allow-listed prefix or approved command → allow; otherwise judge |
//! | `request_path_access` | already granted → allow; otherwise escalate |
//! | anything else         | allow |

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use super::channels::PreAuthSnapshot;
use super::decision::AuthorizationDecision;
use super::judge::SafetyJudge;
use super::options::AuthorizationOptions;
use super::read_tracker::ReadTracker;
use crate::core::{GuardError, GuardResult};
use crate::permissions::{
    is_command_authorized, is_domain_authorized, normalize_command, normalize_domain,
    resolve_path, resolve_root_or_keep, suggest_command_prefix, AllowedPath, AllowedPathRegistry,
    DomainPattern, PathAccess, PersistedApprovals,
};

/// Tool name: edit an existing file with a diff
pub const WRITE_FILE_DIFF: &str = "write_file_diff";
/// Tool name: create a new file
pub const CREATE_FILE: &str = "create_file";
/// Tool name: network egress from sandboxed code
pub const GO_SANDBOX_DOMAIN: &str = "go_sandbox_domain";
/// Tool name: run a shell command
pub const SHELL: &str = "shell";
/// Tool name: ask for access to a path outside the allow-list
pub const REQUEST_PATH_ACCESS: &str = "request_path_access";

/// Parameter names read by the rules
pub mod params {
    pub const PATH: &str = "path";
    pub const DOMAIN: &str = "domain";
    pub const COMMAND: &str = "command";
    pub const ACCESS: &str = "access";
    pub const WORKING_DIR: &str = "working_dir";
}

/// Pre-authorization state and rule evaluation
pub struct Policy {
    dangerously_allow_all: bool,
    allow_all_network: bool,
    paths: AllowedPathRegistry,
    domains: Vec<DomainPattern>,
    command_prefixes: Vec<String>,
    approved_commands: HashSet<String>,
    read_tracker: Arc<ReadTracker>,
    judge: Arc<dyn SafetyJudge>,
    workspace_dir: PathBuf,
}

impl Policy {
    /// Build the policy from configuration
    ///
    /// Invalid domain patterns are logged and skipped.
    pub fn new(
        options: &AuthorizationOptions,
        workspace_dir: impl Into<PathBuf>,
        read_tracker: Arc<ReadTracker>,
        judge: Arc<dyn SafetyJudge>,
    ) -> Self {
        let workspace_dir: PathBuf = workspace_dir.into();
        let workspace_dir = resolve_root_or_keep(&workspace_dir);
        let mut policy = Self {
            dangerously_allow_all: options.dangerously_allow_all,
            allow_all_network: options.allow_all_network,
            paths: AllowedPathRegistry::new(&workspace_dir),
            domains: Vec::new(),
            command_prefixes: Vec::new(),
            approved_commands: HashSet::new(),
            read_tracker,
            judge,
            workspace_dir,
        };

        for dir in &options.allowed_directories {
            policy.paths.add(dir, PathAccess::ReadWrite);
        }
        for dir in &options.read_only_directories {
            policy.paths.add(dir, PathAccess::ReadOnly);
        }
        for file in &options.allowed_files {
            policy.paths.add(file, PathAccess::ReadWrite);
        }
        for domain in &options.allowed_domains {
            match DomainPattern::parse(domain) {
                Ok(pattern) => {
                    policy.approve_domain(pattern);
                }
                Err(e) => tracing::warn!("[AuthActor] Skipping allowed domain: {}", e),
            }
        }
        for prefix in &options.allowed_command_prefixes {
            policy.approve_command_prefix(prefix);
        }

        if policy.dangerously_allow_all {
            tracing::warn!("[AuthActor] dangerously_allow_all is set; every request will be allowed");
        }

        policy
    }

    /// Merge approvals persisted for the workspace
    pub fn apply_persisted(&mut self, approvals: &PersistedApprovals) {
        for prefix in &approvals.command_prefixes {
            self.approve_command_prefix(prefix);
        }
        for domain in &approvals.domains {
            self.approve_domain(domain.clone());
        }
        for path in &approvals.paths {
            self.approve_path(path);
        }
    }

    /// Add a command prefix; returns `false` if already present
    pub fn approve_command_prefix(&mut self, prefix: &str) -> bool {
        let prefix = normalize_command(prefix);
        if prefix.is_empty() || self.command_prefixes.contains(&prefix) {
            return false;
        }
        self.command_prefixes.push(prefix);
        true
    }

    /// Add a domain pattern; returns `false` if already present
    pub fn approve_domain(&mut self, pattern: DomainPattern) -> bool {
        if self.domains.contains(&pattern) {
            return false;
        }
        self.domains.push(pattern);
        true
    }

    /// Add a path; returns `false` if already present
    pub fn approve_path(&mut self, path: &AllowedPath) -> bool {
        self.paths.add_allowed(path)
    }

    /// Current pre-authorization state
    pub fn snapshot(&self) -> PreAuthSnapshot {
        let mut approved_commands: Vec<String> = self.approved_commands.iter().cloned().collect();
        approved_commands.sort();
        PreAuthSnapshot {
            dangerously_allow_all: self.dangerously_allow_all,
            allow_all_network: self.allow_all_network,
            paths: self.paths.entries(),
            domains: self.domains.clone(),
            command_prefixes: self.command_prefixes.clone(),
            approved_commands,
            workspace_dir: self.workspace_dir.clone(),
        }
    }

    /// Evaluate a single tool invocation
    ///
    /// Denials are returned as decisions. Errors mean the request could not be
    /// evaluated at all.
    pub async fn evaluate(
        &mut self,
        tool_name: &str,
        parameters: &Value,
    ) -> GuardResult<AuthorizationDecision> {
        if self.dangerously_allow_all {
            return Ok(AuthorizationDecision::allow("All requests allowed by configuration"));
        }

        match tool_name {
            WRITE_FILE_DIFF => self.evaluate_write_file_diff(parameters).await,
            CREATE_FILE => self.evaluate_create_file(parameters).await,
            GO_SANDBOX_DOMAIN => self.evaluate_domain(parameters).await,
            SHELL => self.evaluate_shell(parameters).await,
            REQUEST_PATH_ACCESS => self.evaluate_path_access(parameters),
            _ => Ok(AuthorizationDecision::allow(format!(
                "No policy for {}; allowed by default",
                tool_name
            ))),
        }
    }

    // =========================================================================
    // File rules
    // =========================================================================

    async fn evaluate_write_file_diff(
        &self,
        parameters: &Value,
    ) -> GuardResult<AuthorizationDecision> {
        let raw = required_str(parameters, params::PATH)?;
        let path = resolve_path(Path::new(raw), &self.workspace_dir);

        if self.paths.is_allowed(&path, PathAccess::ReadWrite) {
            return Ok(AuthorizationDecision::allow(format!(
                "{} is pre-authorized",
                path.display()
            )));
        }

        if !path_exists(&path).await? {
            return Ok(AuthorizationDecision::deny(format!(
                "File {} does not exist; use {} to create it",
                raw, CREATE_FILE
            )));
        }

        if !self.read_tracker.has_read(&path) {
            return Ok(AuthorizationDecision::escalate(format!(
                "File {} has not been read in this session; read it before editing",
                raw
            )));
        }

        Ok(AuthorizationDecision::allow(format!("{} was read before editing", raw)))
    }

    async fn evaluate_create_file(&self, parameters: &Value) -> GuardResult<AuthorizationDecision> {
        let raw = required_str(parameters, params::PATH)?;
        let path = resolve_path(Path::new(raw), &self.workspace_dir);

        if path_exists(&path).await? {
            return Ok(AuthorizationDecision::deny(format!(
                "File {} already exists; use {} to modify it",
                raw, WRITE_FILE_DIFF
            )));
        }

        Ok(AuthorizationDecision::allow(format!("{} is a new file", raw)))
    }

    fn evaluate_path_access(&self, parameters: &Value) -> GuardResult<AuthorizationDecision> {
        let raw = required_str(parameters, params::PATH)?;
        let access = match parameters.get(params::ACCESS).and_then(Value::as_str) {
            Some(label) => PathAccess::parse(label).ok_or_else(|| {
                GuardError::invalid_input(format!("unknown access level: {}", label))
            })?,
            None => PathAccess::ReadOnly,
        };

        if self.paths.is_allowed(raw, access) {
            return Ok(AuthorizationDecision::allow(format!(
                "{} already has {} access",
                raw, access
            )));
        }

        Ok(AuthorizationDecision::escalate(format!(
            "Access to {} ({}) requires approval",
            raw, access
        )))
    }

    // =========================================================================
    // Judged rules
    // =========================================================================

    async fn evaluate_domain(&mut self, parameters: &Value) -> GuardResult<AuthorizationDecision> {
        let raw = required_str(parameters, params::DOMAIN)?;
        let domain = normalize_domain(raw);
        if domain.is_empty() {
            return Err(GuardError::invalid_input(format!("invalid domain: {}", raw)));
        }

        if self.allow_all_network {
            return Ok(AuthorizationDecision::allow("All network access allowed"));
        }
        if is_domain_authorized(&domain, &self.domains) {
            return Ok(AuthorizationDecision::allow(format!(
                "{} is pre-authorized",
                domain
            )));
        }

        let decision = self
            .judge
            .judge_domain(&domain)
            .await
            .map_err(|e| GuardError::Judge(e.to_string()))?;

        if decision.allowed {
            if let Ok(pattern) = DomainPattern::parse(&domain) {
                self.approve_domain(pattern);
            }
        }
        Ok(decision)
    }

    async fn evaluate_shell(&mut self, parameters: &Value) -> GuardResult<AuthorizationDecision> {
        let raw = required_str(parameters, params::COMMAND)?;
        let command = normalize_command(raw);
        if command.is_empty() {
            return Err(GuardError::invalid_input("empty command"));
        }

        if is_command_authorized(&command, &self.command_prefixes) {
            return Ok(AuthorizationDecision::allow("Command matches an allowed prefix"));
        }
        if self.approved_commands.contains(&command) {
            return Ok(AuthorizationDecision::allow(
                "Command was approved earlier in this session",
            ));
        }

        let working_dir = parameters
            .get(params::WORKING_DIR)
            .and_then(Value::as_str)
            .map(|dir| resolve_path(Path::new(dir), &self.workspace_dir))
            .unwrap_or_else(|| self.workspace_dir.clone());

        let mut decision = self
            .judge
            .judge_command(&command, &working_dir)
            .await
            .map_err(|e| GuardError::Judge(e.to_string()))?;

        if decision.allowed {
            self.approved_commands.insert(command);
        } else if decision.suggested_command_prefix.is_empty() {
            decision.suggested_command_prefix = suggest_command_prefix(&command);
        }
        Ok(decision)
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("dangerously_allow_all", &self.dangerously_allow_all)
            .field("allow_all_network", &self.allow_all_network)
            .field("paths", &self.paths)
            .field("domains", &self.domains)
            .field("command_prefixes", &self.command_prefixes)
            .field("workspace_dir", &self.workspace_dir)
            .finish()
    }
}

fn required_str<'a>(parameters: &'a Value, key: &str) -> GuardResult<&'a str> {
    parameters
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| GuardError::invalid_input(format!("missing '{}' parameter", key)))
}

async fn path_exists(path: &Path) -> GuardResult<bool> {
    tokio::fs::try_exists(path).await.map_err(|e| {
        GuardError::evaluation(format!("cannot check {}: {}", path.display(), e))
    })
}
