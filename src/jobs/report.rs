//! Serializable job reports returned by the supervisor tools

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobKind, JobState};

/// One row of the job list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub command: String,
    pub state: JobState,
    pub completed: bool,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
    pub stop_requested: bool,
    pub last_signal: Option<String>,
    pub start_time: DateTime<Utc>,
}

/// A single job with output tails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub job_id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub command: String,
    pub working_dir: PathBuf,
    pub state: JobState,
    pub completed: bool,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
    pub pgid: Option<u32>,
    pub stop_requested: bool,
    pub last_signal: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub stdout: String,
    pub stderr: String,
    /// Lines discarded by the retention bound
    pub stdout_lines_dropped: usize,
    pub stderr_lines_dropped: usize,
}

/// Answer to `status_program`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusReport {
    /// No job ID given: every known job, oldest first
    List { jobs: Vec<JobSummary> },
    /// A specific job
    Detail(Box<JobDetail>),
}

/// Answer to `wait_program`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitReport {
    pub job_id: String,
    pub completed: bool,
    /// `true` when the job's completion was observed (immediately or after blocking)
    pub waited: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stop_requested: bool,
    pub last_signal: Option<String>,
}

/// Answer to `stop_program`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopReport {
    pub job_id: String,
    pub signal: String,
    pub completed: bool,
    /// The job had finished before the stop request arrived
    pub already_completed: bool,
    pub message: String,
}
