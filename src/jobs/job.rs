//! Background job record
//!
//! A `BackgroundJob` is created when a tool starts asynchronous execution and
//! is mutated only by the worker that owns it. Readers take short snapshots
//! under the per-job lock; the `done` signal is the point after which the
//! snapshot is final.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use super::process::StopSignal;
use super::report::{JobDetail, JobSummary, WaitReport};

/// Default number of lines retained per output stream
pub const DEFAULT_MAX_OUTPUT_LINES: usize = 10_000;

/// What kind of execution a job supervises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// A spawned shell command
    Shell,
    /// A sandboxed program run in-process
    Sandbox,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Shell => write!(f, "shell"),
            JobKind::Sandbox => write!(f, "sandbox"),
        }
    }
}

/// Lifecycle state (`pending -> running -> completed`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
}

/// Append-only line buffer with a retention bound
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    max_lines: usize,
    dropped: usize,
}

impl OutputBuffer {
    /// Create a buffer keeping at most `max_lines` lines (0 = unbounded)
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines,
            dropped: 0,
        }
    }

    /// Append a line, dropping the oldest when full
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        if self.max_lines > 0 && self.lines.len() > self.max_lines {
            self.lines.pop_front();
            self.dropped += 1;
        }
    }

    /// The last `n` lines joined with newlines (`n == 0` means all)
    pub fn tail(&self, n: usize) -> String {
        let skip = if n == 0 {
            0
        } else {
            self.lines.len().saturating_sub(n)
        };
        self.lines
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of retained lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines dropped by the retention bound
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[derive(Debug)]
struct JobInner {
    state: JobState,
    exit_code: Option<i32>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    pid: Option<u32>,
    pgid: Option<u32>,
    stop_requested: bool,
    last_signal: Option<StopSignal>,
    end_time: Option<DateTime<Utc>>,
}

/// A tracked asynchronous execution
#[derive(Debug)]
pub struct BackgroundJob {
    id: String,
    kind: JobKind,
    command: String,
    working_dir: PathBuf,
    start_time: DateTime<Utc>,
    inner: Mutex<JobInner>,
    done: watch::Sender<bool>,
    stop: watch::Sender<Option<StopSignal>>,
}

impl BackgroundJob {
    /// Create a pending job with a fresh time-ordered ID
    pub fn new(
        kind: JobKind,
        command: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        max_output_lines: usize,
    ) -> Self {
        let (done, _) = watch::channel(false);
        let (stop, _) = watch::channel(None);
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            command: command.into(),
            working_dir: working_dir.into(),
            start_time: Utc::now(),
            inner: Mutex::new(JobInner {
                state: JobState::Pending,
                exit_code: None,
                stdout: OutputBuffer::new(max_output_lines),
                stderr: OutputBuffer::new(max_output_lines),
                pid: None,
                pgid: None,
                stop_requested: false,
                last_signal: None,
                end_time: None,
            }),
            done,
            stop,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Worker-side mutation
    // =========================================================================

    /// Record that execution started
    pub fn mark_running(&self, pid: Option<u32>, pgid: Option<u32>) {
        let mut inner = self.lock();
        if inner.state == JobState::Pending {
            inner.state = JobState::Running;
        }
        inner.pid = pid;
        inner.pgid = pgid;
    }

    /// Append a stdout line (ignored once completed)
    pub fn push_stdout(&self, line: impl Into<String>) {
        let mut inner = self.lock();
        if inner.state != JobState::Completed {
            inner.stdout.push(line);
        }
    }

    /// Append a stderr line (ignored once completed)
    pub fn push_stderr(&self, line: impl Into<String>) {
        let mut inner = self.lock();
        if inner.state != JobState::Completed {
            inner.stderr.push(line);
        }
    }

    /// Mark the job completed and fire the done signal
    ///
    /// Returns `false` if the job had already completed; the first exit code wins.
    pub fn complete(&self, exit_code: i32) -> bool {
        {
            let mut inner = self.lock();
            if inner.state == JobState::Completed {
                return false;
            }
            inner.state = JobState::Completed;
            inner.exit_code = Some(exit_code);
            inner.end_time = Some(Utc::now());
        }
        self.done.send_replace(true);
        true
    }

    // =========================================================================
    // Reader-side queries
    // =========================================================================

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    pub fn is_completed(&self) -> bool {
        self.state() == JobState::Completed
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.lock().exit_code
    }

    pub fn pgid(&self) -> Option<u32> {
        self.lock().pgid
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    pub fn last_signal(&self) -> Option<StopSignal> {
        self.lock().last_signal
    }

    /// Wait until the job completes
    pub async fn wait_done(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives as long as `self`, so this only returns once done.
        let _ = rx.wait_for(|done| *done).await;
    }

    // =========================================================================
    // Stop
    // =========================================================================

    /// Record a stop request and notify the worker
    ///
    /// Returns `false` (and does nothing) if the job already completed.
    pub fn request_stop(&self, signal: StopSignal) -> bool {
        {
            let mut inner = self.lock();
            if inner.state == JobState::Completed {
                return false;
            }
            inner.stop_requested = true;
            inner.last_signal = Some(signal);
        }
        self.stop.send_replace(Some(signal));
        true
    }

    /// Record a signal the worker escalated to on its own
    pub(crate) fn record_signal(&self, signal: StopSignal) {
        let mut inner = self.lock();
        if inner.state != JobState::Completed {
            inner.last_signal = Some(signal);
        }
    }

    /// Receiver for stop requests (used by the owning worker)
    pub fn stop_receiver(&self) -> watch::Receiver<Option<StopSignal>> {
        self.stop.subscribe()
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Summary row for `status_program` without a job ID
    pub fn summary(&self) -> JobSummary {
        let inner = self.lock();
        JobSummary {
            job_id: self.id.clone(),
            kind: self.kind,
            command: self.command.clone(),
            state: inner.state,
            completed: inner.state == JobState::Completed,
            exit_code: inner.exit_code,
            pid: inner.pid,
            stop_requested: inner.stop_requested,
            last_signal: inner.last_signal.map(String::from),
            start_time: self.start_time,
        }
    }

    /// Detail with output tails (`last_n == 0` means all output)
    pub fn detail(&self, last_n: usize) -> JobDetail {
        let inner = self.lock();
        JobDetail {
            job_id: self.id.clone(),
            kind: self.kind,
            command: self.command.clone(),
            working_dir: self.working_dir.clone(),
            state: inner.state,
            completed: inner.state == JobState::Completed,
            exit_code: inner.exit_code,
            pid: inner.pid,
            pgid: inner.pgid,
            stop_requested: inner.stop_requested,
            last_signal: inner.last_signal.map(String::from),
            start_time: self.start_time,
            end_time: inner.end_time,
            stdout: inner.stdout.tail(last_n),
            stderr: inner.stderr.tail(last_n),
            stdout_lines_dropped: inner.stdout.dropped(),
            stderr_lines_dropped: inner.stderr.dropped(),
        }
    }

    /// Report for `wait_program`
    pub fn wait_report(&self, last_n: usize, waited: bool) -> WaitReport {
        let inner = self.lock();
        WaitReport {
            job_id: self.id.clone(),
            completed: inner.state == JobState::Completed,
            waited,
            exit_code: inner.exit_code,
            stdout: inner.stdout.tail(last_n),
            stderr: inner.stderr.tail(last_n),
            stop_requested: inner.stop_requested,
            last_signal: inner.last_signal.map(String::from),
        }
    }
}
