//! GuardRuntime - Wires the guard components for one session
//!
//! The `GuardRuntime` is responsible for:
//! - Spawning the authorization actor with configured and persisted approvals
//! - Building the sandbox, the job registry and the job supervisor
//! - Registering the built-in tools behind the exclusive gate
//! - Applying user approvals to the actor, the sandbox and the approval store
//! - Killing background jobs on shutdown

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::authorization::{
    spawn_authorization_actor, AuthorizationClient, EscalatingJudge, PreAuthSnapshot,
    ReadTracker, SafetyJudge,
};
use crate::config::GuardConfig;
use crate::core::{GuardError, GuardResult};
use crate::jobs::{JobRegistry, JobSupervisor};
use crate::permissions::{
    AllowedPath, ApprovalScope, ApprovalStore, DomainPattern, PathAccess, PersistedApprovals,
};
use crate::sandbox::{PathGrant, Sandbox};
use crate::tools::{
    RequestPathAccessTool, ShellTool, StatusProgramTool, StopProgramTool, Tool, ToolCallResult,
    ToolRegistry, WaitProgramTool,
};

/// All guard components for a single session
///
/// Must be created inside a tokio runtime (the authorization actor is
/// spawned on construction).
///
/// # Example
///
/// ```ignore
/// let config = GuardConfig::load("guard.json")?;
/// let runtime = GuardRuntime::new(&config)?;
///
/// let result = runtime
///     .call_tool("shell", &json!({"command": "cargo test"}), &CancellationToken::new())
///     .await;
/// if result.requires_user_input {
///     // ask the user, then:
///     runtime.approve_command("cargo test", ApprovalScope::Session).await?;
/// }
/// ```
pub struct GuardRuntime {
    session_id: String,
    workspace_dir: PathBuf,
    authorization: AuthorizationClient,
    read_tracker: Arc<ReadTracker>,
    sandbox: Arc<Sandbox>,
    jobs: JobSupervisor,
    approvals: ApprovalStore,
    tools: ToolRegistry,
}

impl GuardRuntime {
    /// Start a session that escalates every judgment call to the user
    pub fn new(config: &GuardConfig) -> GuardResult<Self> {
        Self::with_judge(config, Arc::new(EscalatingJudge), Vec::new())
    }

    /// Start a session with a custom safety judge and extra tools
    pub fn with_judge(
        config: &GuardConfig,
        judge: Arc<dyn SafetyJudge>,
        extra_tools: Vec<Arc<dyn Tool>>,
    ) -> GuardResult<Self> {
        let session_id = Uuid::new_v4().to_string();
        let workspace_dir = config.resolved_workspace_dir()?;

        tracing::info!(
            session_id = %session_id,
            "[GuardRuntime] Starting session in {}",
            workspace_dir.display()
        );

        let mut sandbox_config = config.sandbox.clone();
        if config.authorization.dangerously_allow_all && !sandbox_config.disable_sandbox {
            tracing::warn!(
                "[GuardRuntime] dangerously_allow_all is set; authorization and sandbox are bypassed"
            );
            sandbox_config.disable_sandbox = true;
        }
        let sandbox = Arc::new(Sandbox::new(sandbox_config, &workspace_dir));
        for grant in preauthorized_paths(config, &workspace_dir) {
            sandbox.grant(grant);
        }

        let approvals =
            ApprovalStore::for_workspace(config.resolved_state_dir()?, &workspace_dir);
        let persisted = load_trusted_approvals(&approvals, &sandbox);
        for grant in &persisted.paths {
            sandbox.grant(grant.clone());
        }

        let read_tracker = Arc::new(ReadTracker::new(&workspace_dir));
        let authorization = spawn_authorization_actor(
            &config.authorization,
            workspace_dir.clone(),
            read_tracker.clone(),
            judge,
            Some(&persisted),
        );

        let jobs = JobSupervisor::new(JobRegistry::new(), sandbox.clone(), config.jobs.clone());

        let mut tools = ToolRegistry::new(authorization.clone(), &workspace_dir);
        tools.register(ShellTool::new(jobs.clone()));
        tools.register(StatusProgramTool::new(jobs.clone()));
        tools.register(WaitProgramTool::new(jobs.clone()));
        tools.register(StopProgramTool::new(jobs.clone()));
        tools.register(RequestPathAccessTool::new(sandbox.clone()));
        for tool in extra_tools {
            tools.register_arc(tool);
        }

        Ok(Self {
            session_id,
            workspace_dir,
            authorization,
            read_tracker,
            sandbox,
            jobs,
            approvals,
            tools,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn authorization(&self) -> &AuthorizationClient {
        &self.authorization
    }

    pub fn read_tracker(&self) -> &Arc<ReadTracker> {
        &self.read_tracker
    }

    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    pub fn jobs(&self) -> &JobSupervisor {
        &self.jobs
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn approval_store(&self) -> &ApprovalStore {
        &self.approvals
    }

    /// Authorize and run a tool
    pub async fn call_tool(
        &self,
        name: &str,
        input: &Value,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        self.tools.call(name, input, cancel).await
    }

    /// Record that the session read `path` (enables `write_file_diff` on it)
    pub fn mark_read(&self, path: impl AsRef<Path>) {
        self.read_tracker.mark_read(path);
    }

    /// Current pre-authorization lists
    pub async fn snapshot(&self) -> GuardResult<PreAuthSnapshot> {
        self.authorization.snapshot().await
    }

    // =========================================================================
    // User approvals
    // =========================================================================

    /// Apply a user's approval of a `request_path_access` escalation
    pub async fn grant_path_access(
        &self,
        path: impl AsRef<Path>,
        access: PathAccess,
        scope: ApprovalScope,
    ) -> GuardResult<PathGrant> {
        let grant = PathGrant::new(path, access, scope, &self.workspace_dir);
        if grant.is_persistent() {
            self.ensure_store_protected(Some(&grant.allowed))?;
        }

        self.authorization.approve_path(grant.allowed.clone()).await?;
        self.sandbox.grant(grant.allowed.clone());
        if grant.is_persistent() {
            self.approvals.add_path(grant.allowed.clone())?;
        }

        tracing::info!(
            session_id = %self.session_id,
            "[GuardRuntime] Granted {} ({}, {:?})",
            grant.allowed.path.display(),
            grant.allowed.access,
            scope
        );
        Ok(grant)
    }

    /// Approve a shell command prefix
    ///
    /// Returns `false` if the prefix was already approved this session.
    pub async fn approve_command(
        &self,
        prefix: impl Into<String>,
        scope: ApprovalScope,
    ) -> GuardResult<bool> {
        let prefix = prefix.into();
        if scope == ApprovalScope::Workspace {
            self.ensure_store_protected(None)?;
        }
        let added = self.authorization.approve_command(prefix.clone()).await?;
        if scope == ApprovalScope::Workspace {
            self.approvals.add_command_prefix(prefix)?;
        }
        Ok(added)
    }

    /// Approve a domain (`example.com` or `*.example.com`)
    pub async fn approve_domain(&self, pattern: &str, scope: ApprovalScope) -> GuardResult<bool> {
        let pattern = DomainPattern::parse(pattern)?;
        if scope == ApprovalScope::Workspace {
            self.ensure_store_protected(None)?;
        }
        let added = self.authorization.approve_domain(pattern.clone()).await?;
        if scope == ApprovalScope::Workspace {
            self.approvals.add_domain(pattern)?;
        }
        Ok(added)
    }

    /// Refuse workspace-scope approvals when sandboxed processes could rewrite them
    fn ensure_store_protected(&self, new_grant: Option<&AllowedPath>) -> GuardResult<()> {
        let store = self.approvals.path();
        let exposed_by_grant = new_grant.is_some_and(|grant| {
            self.sandbox.is_enforcing()
                && grant.access == PathAccess::ReadWrite
                && store.starts_with(&grant.path)
        });
        if store_exposed(&self.sandbox, &self.approvals) || exposed_by_grant {
            return Err(GuardError::other(format!(
                "approval store {} would be writable from the sandbox; approve for this session instead",
                store.display()
            )));
        }
        Ok(())
    }

    /// Kill every running background job
    pub async fn shutdown(&self) -> usize {
        tracing::info!(session_id = %self.session_id, "[GuardRuntime] Shutting down");
        self.jobs.shutdown_all().await
    }
}

/// Whether sandboxed processes could rewrite the approval store
fn store_exposed(sandbox: &Sandbox, store: &ApprovalStore) -> bool {
    sandbox.is_enforcing() && sandbox.allows_write(store.path())
}

/// Load persisted approvals unless a sandboxed process could have written them
fn load_trusted_approvals(store: &ApprovalStore, sandbox: &Sandbox) -> PersistedApprovals {
    if store_exposed(sandbox, store) {
        tracing::warn!(
            "[GuardRuntime] Ignoring approvals in {}: the sandbox allows writes there; set state_dir outside the workspace",
            store.path().display()
        );
        return PersistedApprovals::default();
    }

    let persisted = match store.load() {
        Ok(persisted) => persisted,
        Err(e) => {
            tracing::warn!(
                "[GuardRuntime] Ignoring unreadable approvals file {}: {}",
                store.path().display(),
                e
            );
            return PersistedApprovals::default();
        }
    };

    let self_exposing = sandbox.is_enforcing()
        && persisted
            .paths
            .iter()
            .any(|p| p.access == PathAccess::ReadWrite && store.path().starts_with(&p.path));
    if self_exposing {
        tracing::warn!(
            "[GuardRuntime] Ignoring approvals in {}: a persisted grant makes the file writable from the sandbox",
            store.path().display()
        );
        return PersistedApprovals::default();
    }

    persisted
}

/// Paths the authorization layer already trusts, as sandbox grants
fn preauthorized_paths(config: &GuardConfig, workspace_dir: &Path) -> Vec<AllowedPath> {
    let options = &config.authorization;
    let read_write = options
        .allowed_directories
        .iter()
        .chain(&options.allowed_files)
        .map(|p| AllowedPath::new(p, PathAccess::ReadWrite, workspace_dir));
    let read_only = options
        .read_only_directories
        .iter()
        .map(|p| AllowedPath::new(p, PathAccess::ReadOnly, workspace_dir));

    read_write.chain(read_only).collect()
}
