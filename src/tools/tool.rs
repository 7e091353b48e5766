//! Tool trait definition
//!
//! All tools implement this trait to provide a consistent interface.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Result of executing a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output of the tool
    pub output: String,
    /// Whether the tool execution resulted in an error
    pub is_error: bool,
    /// Structured output, when the tool produces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
            data: None,
        }
    }

    /// Create an error tool result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
            data: None,
        }
    }

    /// Create a successful result carrying a serializable report
    pub fn json<T: Serialize>(report: &T) -> Result<Self> {
        let data = serde_json::to_value(report)?;
        Ok(Self {
            output: serde_json::to_string_pretty(&data)?,
            is_error: false,
            data: Some(data),
        })
    }
}

/// Information about a tool for permission prompts
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool
    pub name: String,
    /// Human-readable description of what this invocation will do
    pub action_description: String,
    /// Additional details about the action (e.g., command to run, file to edit)
    pub details: Option<String>,
}

/// Definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Per-call context handed to [`Tool::execute`]
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Fires when the caller gives up on this call
    pub cancel: CancellationToken,
    /// Directory relative paths resolve against
    pub workspace_dir: PathBuf,
}

impl ToolContext {
    pub fn new(workspace_dir: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            workspace_dir: workspace_dir.into(),
        }
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }
}

/// Trait for tools that the agent can use
///
/// All tools must implement this trait to be usable by the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the name of this tool
    fn name(&self) -> &str;

    /// Get a description of this tool
    fn description(&self) -> &str;

    /// JSON schema of the tool's input
    fn input_schema(&self) -> Value;

    /// Get the tool definition for the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Get information about what this tool invocation will do
    ///
    /// This is used to display permission prompts to the user.
    fn get_info(&self, input: &Value) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            action_description: format!("Run {}", self.name()),
            details: Some(input.to_string()),
        }
    }

    /// Execute the tool with the given input
    ///
    /// The input is a JSON value that matches the tool's input schema.
    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult>;

    /// Exclusivity class, if invocations must not overlap
    ///
    /// Tools sharing a class are serialized against each other. Read once
    /// when the tool is registered.
    fn exclusive_class(&self) -> Option<&'static str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("output");
        assert_eq!(result.output, "output");
        assert!(!result.is_error);
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("error message");
        assert_eq!(result.output, "error message");
        assert!(result.is_error);
    }

    #[test]
    fn test_tool_result_json() {
        let result = ToolResult::json(&json!({"job_id": "abc"})).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.data, Some(json!({"job_id": "abc"})));
        assert!(result.output.contains("\"job_id\""));
    }
}
