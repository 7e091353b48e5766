//! `request_path_access` tool
//!
//! The authorization actor allows this call only for paths that are already
//! granted; anything else comes back as an escalation that the embedding
//! application resolves through `GuardRuntime::grant_path_access`. When the
//! call does run, the grant is made visible to the sandbox.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::tool::{Tool, ToolContext, ToolInfo, ToolResult};
use crate::authorization::rules::REQUEST_PATH_ACCESS;
use crate::permissions::ApprovalScope;
use crate::sandbox::{PathAccessRequest, Sandbox};

pub struct RequestPathAccessTool {
    sandbox: Arc<Sandbox>,
}

impl RequestPathAccessTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for RequestPathAccessTool {
    fn name(&self) -> &str {
        REQUEST_PATH_ACCESS
    }

    fn description(&self) -> &str {
        "Ask for access to a path outside the workspace. The user decides whether to grant \
         it for this session or for the workspace."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory or file to access"
                },
                "access": {
                    "type": "string",
                    "enum": ["read_only", "read_write"],
                    "description": "Access level (default read_only)"
                },
                "reason": {
                    "type": "string",
                    "description": "Why the access is needed"
                }
            },
            "required": ["path"]
        })
    }

    fn get_info(&self, input: &Value) -> ToolInfo {
        let path = input
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown path>");
        let access = input
            .get("access")
            .and_then(|v| v.as_str())
            .unwrap_or("read_only");
        ToolInfo {
            name: REQUEST_PATH_ACCESS.to_string(),
            action_description: format!("Grant {} access to {}", access, path),
            details: input
                .get("reason")
                .and_then(|v| v.as_str())
                .map(String::from),
        }
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let request = PathAccessRequest::from_params(input)?;
        let grant = request.approve(ApprovalScope::Session, ctx.workspace_dir());
        self.sandbox.grant(grant.allowed.clone());

        ToolResult::json(&json!({
            "path": grant.allowed.path,
            "access": grant.allowed.access,
            "granted": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_execute_registers_sandbox_grant() {
        let dir = tempfile::TempDir::new().unwrap();
        let sandbox = Arc::new(Sandbox::disabled(dir.path()));
        let tool = RequestPathAccessTool::new(sandbox.clone());
        let ctx = ToolContext::new(dir.path(), CancellationToken::new());

        let result = tool
            .execute(&json!({"path": "/srv/data", "access": "read_write"}), &ctx)
            .await
            .unwrap();

        assert_eq!(result.data.unwrap()["granted"], json!(true));
        let grants = sandbox.grants();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].path, Path::new("/srv/data"));
    }
}
