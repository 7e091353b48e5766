//! Shell tool for executing commands
//!
//! Runs `sh -c` inside the sandbox, in its own process group. Foreground
//! calls wait for the command with a timeout; `run_in_background` registers
//! a job with the supervisor and returns its ID immediately.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::tool::{Tool, ToolContext, ToolInfo, ToolResult};
use crate::authorization::rules::SHELL;
use crate::jobs::{build_shell_command, exit_code_of, signal_process_group, JobSupervisor, StopSignal};
use crate::permissions::absolutize;

/// Default timeout in milliseconds (2 minutes)
const DEFAULT_TIMEOUT_MS: u64 = 120000;
/// Maximum timeout in milliseconds (10 minutes)
const MAX_TIMEOUT_MS: u64 = 600000;
/// Maximum output length in characters
const MAX_OUTPUT_LENGTH: usize = 30000;

/// Shell tool for executing commands
pub struct ShellTool {
    supervisor: JobSupervisor,
}

/// Input for the shell tool
#[derive(Debug, Deserialize)]
struct ShellInput {
    /// The command to execute (required)
    command: String,
    /// Optional timeout in milliseconds (max 600000)
    timeout: Option<u64>,
    /// Optional description of what this command does
    description: Option<String>,
    /// Directory to run in, relative to the workspace
    working_dir: Option<PathBuf>,
    /// Register a background job instead of waiting
    #[serde(default)]
    run_in_background: bool,
}

/// Outcome of a foreground run
enum Foreground {
    Exited { output: String, exit_code: i32 },
    TimedOut,
    Cancelled,
}

impl ShellTool {
    pub fn new(supervisor: JobSupervisor) -> Self {
        Self { supervisor }
    }

    /// Execute a command in the foreground with a timeout
    async fn run_command(
        &self,
        command: &str,
        working_dir: &std::path::Path,
        timeout_ms: u64,
        ctx: &ToolContext,
    ) -> Result<Foreground> {
        tracing::info!("Executing shell command: {}", command);
        tracing::debug!("Working directory: {}", working_dir.display());
        tracing::debug!("Timeout: {}ms", timeout_ms);

        let duration = Duration::from_millis(timeout_ms.min(MAX_TIMEOUT_MS));

        let mut cmd = build_shell_command(command, working_dir, self.supervisor.sandbox())?;
        cmd.kill_on_drop(true);
        let child = cmd.spawn()?;
        let pgid = child.id();

        let outcome = tokio::select! {
            output = child.wait_with_output() => {
                let output = output?;
                Foreground::Exited {
                    output: combine_output(&output.stdout, &output.stderr),
                    exit_code: exit_code_of(&output.status),
                }
            }
            _ = tokio::time::sleep(duration) => Foreground::TimedOut,
            _ = ctx.cancel.cancelled() => Foreground::Cancelled,
        };

        if !matches!(outcome, Foreground::Exited { .. }) {
            // The leader is killed on drop; the rest of its group is not.
            if let Some(pgid) = pgid {
                if let Err(e) = signal_process_group(pgid, StopSignal::Kill) {
                    tracing::warn!("[ShellTool] Failed to kill process group {}: {}", pgid, e);
                }
            }
        }

        Ok(outcome)
    }
}

/// Combine stdout and stderr, truncated to `MAX_OUTPUT_LENGTH`
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut result = String::new();
    if !stdout.is_empty() {
        result.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str("STDERR:\n");
        result.push_str(&stderr);
    }

    if result.len() > MAX_OUTPUT_LENGTH {
        let mut cut = MAX_OUTPUT_LENGTH;
        while !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
        result.push_str("\n... (output truncated)");
    }
    result
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        SHELL
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the workspace sandbox. Set run_in_background for \
         long-running commands and follow up with status_program, wait_program or stop_program."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Optional timeout in milliseconds (max 600000). Default is 120000ms (2 minutes)."
                },
                "description": {
                    "type": "string",
                    "description": "Clear, concise description of what this command does in 5-10 words, in active voice."
                },
                "working_dir": {
                    "type": "string",
                    "description": "Directory to run in, relative to the workspace"
                },
                "run_in_background": {
                    "type": "boolean",
                    "description": "Start as a background job and return its job_id"
                }
            },
            "required": ["command"]
        })
    }

    fn get_info(&self, input: &Value) -> ToolInfo {
        let command = input
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown command>");

        let description = input
            .get("description")
            .and_then(|v| v.as_str())
            .map(String::from);

        let action = description.unwrap_or_else(|| format!("Execute: {}", command));

        ToolInfo {
            name: SHELL.to_string(),
            action_description: action,
            details: Some(format!("Command: {}", command)),
        }
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let shell_input: ShellInput = serde_json::from_value(input.clone())
            .map_err(|e| anyhow::anyhow!("Invalid shell input: {}", e))?;

        if let Some(ref desc) = shell_input.description {
            tracing::info!("Command description: {}", desc);
        }

        let working_dir = match &shell_input.working_dir {
            Some(dir) => absolutize(dir, ctx.workspace_dir()),
            None => ctx.workspace_dir().to_path_buf(),
        };

        if shell_input.run_in_background {
            let job_id = self
                .supervisor
                .start_shell(&shell_input.command, &working_dir)
                .await?;
            return ToolResult::json(&json!({
                "job_id": job_id,
                "status": "started",
            }));
        }

        let timeout_ms = shell_input.timeout.unwrap_or(DEFAULT_TIMEOUT_MS);
        match self
            .run_command(&shell_input.command, &working_dir, timeout_ms, ctx)
            .await
        {
            Ok(Foreground::Exited { output, exit_code }) => {
                if exit_code == 0 {
                    if output.is_empty() {
                        Ok(ToolResult::success("Command completed successfully (no output)"))
                    } else {
                        Ok(ToolResult::success(output))
                    }
                } else {
                    Ok(ToolResult::error(format!(
                        "Command failed with exit code {}\n{}",
                        exit_code, output
                    )))
                }
            }
            Ok(Foreground::TimedOut) => Ok(ToolResult::error(format!(
                "Command timed out after {}ms",
                timeout_ms.min(MAX_TIMEOUT_MS)
            ))),
            Ok(Foreground::Cancelled) => Ok(ToolResult::error("Command cancelled")),
            Err(e) => Ok(ToolResult::error(format!("Failed to execute command: {}", e))),
        }
    }
}
