//! Job supervisor tools
//!
//! - `status_program` lists jobs or tails one job's output (never blocks)
//! - `wait_program` blocks until a job completes
//! - `stop_program` signals a job's process group and returns immediately

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::tool::{Tool, ToolContext, ToolInfo, ToolResult};
use crate::jobs::{JobSupervisor, StopSignal};

pub const STATUS_PROGRAM: &str = "status_program";
pub const WAIT_PROGRAM: &str = "wait_program";
pub const STOP_PROGRAM: &str = "stop_program";

#[derive(Debug, Deserialize)]
struct StatusInput {
    job_id: Option<String>,
    #[serde(default)]
    last_n_lines: usize,
}

#[derive(Debug, Deserialize)]
struct WaitInput {
    job_id: String,
    #[serde(default)]
    last_n_lines: usize,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StopInput {
    job_id: String,
    #[serde(default)]
    signal: StopSignal,
}

fn parse<T: serde::de::DeserializeOwned>(tool: &str, input: &Value) -> Result<T> {
    serde_json::from_value(input.clone())
        .map_err(|e| anyhow::anyhow!("Invalid {} input: {}", tool, e))
}

/// `status_program(job_id?, last_n_lines?)`
pub struct StatusProgramTool {
    supervisor: JobSupervisor,
}

impl StatusProgramTool {
    pub fn new(supervisor: JobSupervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for StatusProgramTool {
    fn name(&self) -> &str {
        STATUS_PROGRAM
    }

    fn description(&self) -> &str {
        "List background jobs, or show one job's state and the tail of its output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "job_id": {
                    "type": "string",
                    "description": "Job to inspect; omit to list all jobs"
                },
                "last_n_lines": {
                    "type": "integer",
                    "description": "Lines of output to return per stream (0 = all)"
                }
            }
        })
    }

    async fn execute(&self, input: &Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let input: StatusInput = parse(STATUS_PROGRAM, input)?;
        let report = self
            .supervisor
            .status(input.job_id.as_deref(), input.last_n_lines)
            .await?;
        ToolResult::json(&report)
    }
}

/// `wait_program(job_id, last_n_lines?, timeout_ms?)`
pub struct WaitProgramTool {
    supervisor: JobSupervisor,
}

impl WaitProgramTool {
    pub fn new(supervisor: JobSupervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for WaitProgramTool {
    fn name(&self) -> &str {
        WAIT_PROGRAM
    }

    fn description(&self) -> &str {
        "Wait for a background job to finish and return its exit code and output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "job_id": {
                    "type": "string",
                    "description": "Job to wait for"
                },
                "last_n_lines": {
                    "type": "integer",
                    "description": "Lines of output to return per stream (0 = all)"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Give up after this many milliseconds"
                }
            },
            "required": ["job_id"]
        })
    }

    fn get_info(&self, input: &Value) -> ToolInfo {
        let job_id = input
            .get("job_id")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown job>");
        ToolInfo {
            name: WAIT_PROGRAM.to_string(),
            action_description: format!("Wait for job {}", job_id),
            details: None,
        }
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: WaitInput = parse(WAIT_PROGRAM, input)?;
        let report = self
            .supervisor
            .wait(
                &input.job_id,
                input.last_n_lines,
                &ctx.cancel,
                input.timeout_ms.map(Duration::from_millis),
            )
            .await?;
        ToolResult::json(&report)
    }
}

/// `stop_program(job_id, signal?)`
pub struct StopProgramTool {
    supervisor: JobSupervisor,
}

impl StopProgramTool {
    pub fn new(supervisor: JobSupervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for StopProgramTool {
    fn name(&self) -> &str {
        STOP_PROGRAM
    }

    fn description(&self) -> &str {
        "Stop a background job. Sends SIGTERM by default (SIGKILL after a grace period); \
         pass SIGKILL to terminate immediately."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "job_id": {
                    "type": "string",
                    "description": "Job to stop"
                },
                "signal": {
                    "type": "string",
                    "enum": ["SIGTERM", "SIGKILL"],
                    "description": "Signal to send (default SIGTERM)"
                }
            },
            "required": ["job_id"]
        })
    }

    fn get_info(&self, input: &Value) -> ToolInfo {
        let job_id = input
            .get("job_id")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown job>");
        let signal = input
            .get("signal")
            .and_then(|v| v.as_str())
            .unwrap_or("SIGTERM");
        ToolInfo {
            name: STOP_PROGRAM.to_string(),
            action_description: format!("Send {} to job {}", signal, job_id),
            details: None,
        }
    }

    async fn execute(&self, input: &Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let input: StopInput = parse(STOP_PROGRAM, input)?;
        let report = self.supervisor.stop(&input.job_id, input.signal).await?;
        ToolResult::json(&report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::jobs::{JobRegistry, JobsConfig};
    use crate::sandbox::Sandbox;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn supervisor(dir: &TempDir) -> JobSupervisor {
        JobSupervisor::new(
            JobRegistry::new(),
            Arc::new(Sandbox::disabled(dir.path())),
            JobsConfig::new(),
        )
    }

    #[tokio::test]
    async fn test_status_wait_stop_flow() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);
        let ctx = ToolContext::new(dir.path(), CancellationToken::new());

        let job_id = supervisor
            .start_shell("echo before; sleep 60; echo after", dir.path())
            .await
            .unwrap();

        let status = StatusProgramTool::new(supervisor.clone());
        let listed = status.execute(&json!({}), &ctx).await.unwrap();
        let jobs = listed.data.unwrap()["jobs"].clone();
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["job_id"], json!(job_id));
        assert_eq!(jobs[0]["type"], json!("shell"));
        assert_eq!(jobs[0]["completed"], json!(false));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let stop = StopProgramTool::new(supervisor.clone());
        let stopped = stop.execute(&json!({"job_id": job_id}), &ctx).await.unwrap();
        assert_eq!(stopped.data.unwrap()["signal"], json!("SIGTERM"));

        let wait = WaitProgramTool::new(supervisor.clone());
        let waited = wait
            .execute(&json!({"job_id": job_id, "timeout_ms": 10_000}), &ctx)
            .await
            .unwrap();
        let report = waited.data.unwrap();
        assert_eq!(report["completed"], json!(true));
        assert_eq!(report["stop_requested"], json!(true));
        let stdout = report["stdout"].as_str().unwrap();
        assert!(stdout.contains("before"));
        assert!(!stdout.contains("after"));
    }

    #[tokio::test]
    async fn test_unknown_job_is_an_error() {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(dir.path(), CancellationToken::new());
        let wait = WaitProgramTool::new(supervisor(&dir));

        let err = wait
            .execute(&json!({"job_id": "missing"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_invalid_signal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(dir.path(), CancellationToken::new());
        let stop = StopProgramTool::new(supervisor(&dir));

        assert!(stop
            .execute(&json!({"job_id": "x", "signal": "SIGHUP"}), &ctx)
            .await
            .is_err());
    }
}
