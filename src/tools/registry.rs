//! Tool registry for managing available tools
//!
//! The registry holds every tool available to the session and is the single
//! entry point for invoking one. A call goes through three steps:
//! 1. If the tool declares an exclusivity class, take that class's lock
//! 2. Ask the authorization actor for a decision
//! 3. Execute, converting errors and panics into the call result
//!
//! The lock is held until the call result is built and released however the
//! call ends.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::exclusive::{acquire, ExclusiveLock, ExclusiveLocks};
use super::tool::{Tool, ToolContext, ToolDefinition, ToolInfo, ToolResult};
use crate::authorization::{AuthorizationClient, AuthorizationDecision};
use crate::core::GuardError;

/// Outcome of a tool call as reported to the model loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Tool output when it ran successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error text when it was denied, failed, or could not run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// A denial the user may still approve
    #[serde(default)]
    pub requires_user_input: bool,

    /// Reason given by the authorization actor for a denial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_reason: Option<String>,

    /// Prefix the user can approve to allow similar commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_command_prefix: Option<String>,
}

impl ToolCallResult {
    fn success(result: ToolResult) -> Self {
        if result.is_error {
            return Self::failure(result.output);
        }
        Self {
            result: Some(result.data.unwrap_or(Value::String(result.output))),
            ..Default::default()
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn denied(tool_name: &str, decision: AuthorizationDecision) -> Self {
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Self {
            result: None,
            error: Some(format!("{} not authorized: {}", tool_name, decision.reason)),
            requires_user_input: decision.requires_user_input,
            auth_reason: non_empty(decision.reason),
            suggested_command_prefix: non_empty(decision.suggested_command_prefix),
        }
    }

    /// Whether the tool ran and succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    exclusive: Option<ExclusiveLock>,
}

/// Registry that holds all available tools
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    authorization: AuthorizationClient,
    locks: ExclusiveLocks,
    workspace_dir: PathBuf,
}

impl ToolRegistry {
    /// Create an empty registry that authorizes through `authorization`
    pub fn new(authorization: AuthorizationClient, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools: HashMap::new(),
            authorization,
            locks: ExclusiveLocks::new(),
            workspace_dir: workspace_dir.into(),
        }
    }

    /// Register a tool in the registry
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool, replacing any tool with the same name
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let exclusive = tool.exclusive_class().map(|class| self.locks.lock_for(class));
        tracing::info!(
            "[ToolRegistry] Registering tool: {} (exclusive: {})",
            name,
            tool.exclusive_class().unwrap_or("no")
        );
        self.tools.insert(name, RegisteredTool { tool, exclusive });
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.tool.clone())
    }

    /// Get all tool definitions, sorted by name
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self.tools.values().map(|e| e.tool.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Get information about a tool invocation
    pub fn get_tool_info(&self, name: &str, input: &Value) -> Option<ToolInfo> {
        self.tools.get(name).map(|e| e.tool.get_info(input))
    }

    /// Authorize and execute a tool
    ///
    /// Never fails: denials, errors and panics are reported in the result.
    pub async fn call(
        &self,
        name: &str,
        input: &Value,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let Some(entry) = self.tools.get(name) else {
            tracing::warn!("[ToolRegistry] Unknown tool: {}", name);
            return ToolCallResult::failure(GuardError::ToolNotFound(name.to_string()).to_string());
        };

        let _exclusive = acquire(entry.exclusive.as_ref()).await;

        let decision = match self.authorization.authorize(name, input, cancel).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!("[ToolRegistry] Authorization for {} failed: {}", name, e);
                return ToolCallResult::failure(format!("authorization failed: {}", e));
            }
        };
        if !decision.allowed {
            tracing::info!(
                "[ToolRegistry] {} denied (user input: {}): {}",
                name,
                decision.requires_user_input,
                decision.reason
            );
            return ToolCallResult::denied(name, decision);
        }

        tracing::info!("[ToolRegistry] Executing tool: {}", name);
        tracing::debug!("[ToolRegistry] Input: {}", input);

        let ctx = ToolContext::new(self.workspace_dir.clone(), cancel.clone());
        let outcome = AssertUnwindSafe(entry.tool.execute(input, &ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(
                    "[ToolRegistry] Tool {} completed. Is error: {}",
                    name,
                    result.is_error
                );
                ToolCallResult::success(result)
            }
            Ok(Err(e)) => {
                tracing::warn!("[ToolRegistry] Tool {} failed: {:#}", name, e);
                ToolCallResult::failure(format!("{:#}", e))
            }
            Err(_) => {
                tracing::error!("[ToolRegistry] Tool {} panicked", name);
                ToolCallResult::failure(format!("tool {} panicked", name))
            }
        }
    }

    /// The authorization client used for every call
    pub fn authorization(&self) -> &AuthorizationClient {
        &self.authorization
    }

    /// Get the list of tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{
        spawn_authorization_actor, AuthorizationOptions, EscalatingJudge, ReadTracker,
    };
    use crate::tools::exclusive::FILE_MUTATION;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct SleepTool {
        name: &'static str,
        class: Option<&'static str>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _input: &Value, _ctx: &ToolContext) -> Result<ToolResult> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ToolResult::success("slept"))
        }

        fn exclusive_class(&self) -> Option<&'static str> {
            self.class
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "panic"
        }

        fn description(&self) -> &str {
            "panics"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _input: &Value, _ctx: &ToolContext) -> Result<ToolResult> {
            panic!("boom");
        }

        fn exclusive_class(&self) -> Option<&'static str> {
            Some(FILE_MUTATION)
        }
    }

    fn registry(dir: &TempDir) -> ToolRegistry {
        let client = spawn_authorization_actor(
            &AuthorizationOptions::new(),
            dir.path().to_path_buf(),
            Arc::new(ReadTracker::new(dir.path())),
            Arc::new(EscalatingJudge),
            None,
        );
        ToolRegistry::new(client, dir.path())
    }

    fn sleeper(
        name: &'static str,
        class: Option<&'static str>,
        max_active: &Arc<AtomicUsize>,
    ) -> SleepTool {
        SleepTool {
            name,
            class,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: max_active.clone(),
        }
    }

    #[tokio::test]
    async fn test_exclusive_calls_never_overlap() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let max_active = Arc::new(AtomicUsize::new(0));
        let tool = SleepTool {
            name: "exclusive",
            class: Some(FILE_MUTATION),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: max_active.clone(),
        };
        registry.register(tool);
        let registry = Arc::new(registry);

        let cancel = CancellationToken::new();
        let calls = (0..4).map(|_| {
            let registry = registry.clone();
            let cancel = cancel.clone();
            async move { registry.call("exclusive", &json!({}), &cancel).await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_exclusive_calls_run_concurrently() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let max_active = Arc::new(AtomicUsize::new(0));
        registry.register(sleeper("free", None, &max_active));
        let registry = Arc::new(registry);

        let cancel = CancellationToken::new();
        let calls = (0..4).map(|_| {
            let registry = registry.clone();
            let cancel = cancel.clone();
            async move { registry.call("free", &json!({}), &cancel).await }
        });
        futures::future::join_all(calls).await;

        assert!(max_active.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_panic_releases_lock() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let max_active = Arc::new(AtomicUsize::new(0));
        registry.register(PanicTool);
        registry.register(sleeper("after", Some(FILE_MUTATION), &max_active));

        let cancel = CancellationToken::new();
        let result = registry.call("panic", &json!({}), &cancel).await;
        assert!(result.error.unwrap().contains("panicked"));

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            registry.call("after", &json!({}), &cancel),
        )
        .await
        .unwrap();
        assert_eq!(result.result, Some(json!("slept")));
    }

    #[tokio::test]
    async fn test_denial_is_reported_as_data() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let max_active = Arc::new(AtomicUsize::new(0));
        registry.register(sleeper("create_file", None, &max_active));

        let existing = dir.path().join("exists.txt");
        std::fs::write(&existing, "x").unwrap();

        let result = registry
            .call(
                "create_file",
                &json!({"path": existing.to_string_lossy()}),
                &CancellationToken::new(),
            )
            .await;

        assert!(!result.is_success());
        assert!(!result.requires_user_input);
        assert!(result.auth_reason.unwrap().contains("already exists"));
        assert_eq!(max_active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_escalation_carries_suggested_prefix() {
        let dir = TempDir::new().unwrap();
        let mut registry = registry(&dir);
        let max_active = Arc::new(AtomicUsize::new(0));
        registry.register(sleeper("shell", None, &max_active));

        let result = registry
            .call(
                "shell",
                &json!({"command": "git push origin main"}),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.requires_user_input);
        assert_eq!(result.suggested_command_prefix.as_deref(), Some("git push"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let result = registry
            .call("nope", &json!({}), &CancellationToken::new())
            .await;
        assert!(result.error.unwrap().contains("nope"));
    }
}
