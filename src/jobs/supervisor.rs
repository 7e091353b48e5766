//! Job supervisor operations
//!
//! `start_*` registers a job and returns its ID before the work finishes.
//! Each job then runs on its own task, which is the only writer of that job.
//! `status` and `stop` never block; `wait` blocks until the job's done signal
//! fires, the caller cancels, or the timeout passes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::JobsConfig;
use super::job::{BackgroundJob, JobKind};
use super::process::{exit_code_of, set_process_group, signal_process_group, StopSignal};
use super::registry::JobRegistry;
use super::report::{StatusReport, StopReport, WaitReport};
use crate::core::{race_cancellation, GuardResult};
use crate::sandbox::Sandbox;

/// How long to keep reading pipes after the process exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Build a `sh -c` command in its own process group with the sandbox applied
#[allow(unsafe_code)]
pub fn build_shell_command(
    command: &str,
    working_dir: &Path,
    sandbox: &Sandbox,
) -> GuardResult<Command> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    // SAFETY: setpgid is async-signal-safe.
    unsafe {
        cmd.pre_exec(set_process_group);
    }

    sandbox.apply(&mut cmd)?;
    Ok(cmd)
}

/// Output sink handed to sandbox-kind tasks
#[derive(Debug, Clone)]
pub struct JobOutput {
    job: Arc<BackgroundJob>,
    cancel: CancellationToken,
}

impl JobOutput {
    pub fn job_id(&self) -> &str {
        self.job.id()
    }

    /// Append a stdout line
    pub fn stdout(&self, line: impl Into<String>) {
        self.job.push_stdout(line);
    }

    /// Append a stderr line
    pub fn stderr(&self, line: impl Into<String>) {
        self.job.push_stderr(line);
    }

    /// Cancelled when the job is asked to stop
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Starts, inspects, waits for and stops background jobs
#[derive(Debug, Clone)]
pub struct JobSupervisor {
    registry: JobRegistry,
    sandbox: Arc<Sandbox>,
    config: JobsConfig,
}

impl JobSupervisor {
    pub fn new(registry: JobRegistry, sandbox: Arc<Sandbox>, config: JobsConfig) -> Self {
        Self {
            registry,
            sandbox,
            config,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    // =========================================================================
    // Start
    // =========================================================================

    /// Spawn `command` under `sh -c` and return the job ID immediately
    ///
    /// Fails without registering a job when the process cannot be spawned
    /// (including strict-mode sandbox failures).
    pub async fn start_shell(
        &self,
        command: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> GuardResult<String> {
        let command = command.into();
        let working_dir = working_dir.into();

        let mut cmd = build_shell_command(&command, &working_dir, &self.sandbox)?;
        let child = cmd.spawn()?;

        let job = BackgroundJob::new(
            JobKind::Shell,
            command,
            working_dir,
            self.config.max_output_lines,
        );
        // The child leads its own group, so its PID is the group ID.
        let pid = child.id();
        job.mark_running(pid, pid);

        let job = self.registry.register(job).await;
        tracing::info!(
            job_id = %job.id(),
            "[JobSupervisor] Started shell job (pid {:?}): {}",
            pid,
            job.command()
        );

        tokio::spawn(supervise_child(job.clone(), child, self.config.kill_grace()));
        Ok(job.id().to_string())
    }

    /// Run a sandboxed program as a background job
    ///
    /// `task` receives a [`JobOutput`] for its output lines and stop requests
    /// and resolves to the program's exit code.
    pub async fn start_task<F, Fut>(
        &self,
        label: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        task: F,
    ) -> String
    where
        F: FnOnce(JobOutput) -> Fut,
        Fut: Future<Output = i32> + Send + 'static,
    {
        let job = self
            .registry
            .register(BackgroundJob::new(
                JobKind::Sandbox,
                label,
                working_dir,
                self.config.max_output_lines,
            ))
            .await;
        job.mark_running(None, None);

        let cancel = CancellationToken::new();
        let future = task(JobOutput {
            job: job.clone(),
            cancel: cancel.clone(),
        });

        tracing::info!(
            job_id = %job.id(),
            "[JobSupervisor] Started sandbox job: {}",
            job.command()
        );

        tokio::spawn(supervise_task(
            job.clone(),
            future,
            cancel,
            self.config.kill_grace(),
        ));
        job.id().to_string()
    }

    // =========================================================================
    // Status / Wait / Stop
    // =========================================================================

    /// List every job, or detail one job with its last `last_n` lines (0 = all)
    pub async fn status(&self, job_id: Option<&str>, last_n: usize) -> GuardResult<StatusReport> {
        match job_id {
            None => Ok(StatusReport::List {
                jobs: self.registry.summaries().await,
            }),
            Some(id) => {
                let job = self.registry.get(id).await?;
                Ok(StatusReport::Detail(Box::new(job.detail(last_n))))
            }
        }
    }

    /// Block until the job completes, `cancel` fires, or `timeout` passes
    ///
    /// If completion and the timeout are ready together, completion wins.
    pub async fn wait(
        &self,
        job_id: &str,
        last_n: usize,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> GuardResult<WaitReport> {
        let job = self.registry.get(job_id).await?;
        if job.is_completed() {
            return Ok(job.wait_report(last_n, true));
        }

        let timeout = timeout.or_else(|| self.config.default_wait_timeout());
        tracing::debug!(
            job_id = %job_id,
            "[JobSupervisor] Waiting (timeout {:?})",
            timeout
        );

        let request = CancellationToken::new();
        race_cancellation(cancel, &request, timeout, job.wait_done()).await?;
        Ok(job.wait_report(last_n, true))
    }

    /// Ask the job to stop and return without waiting for it
    pub async fn stop(&self, job_id: &str, signal: StopSignal) -> GuardResult<StopReport> {
        let job = self.registry.get(job_id).await?;

        if !job.request_stop(signal) {
            tracing::debug!(job_id = %job_id, "[JobSupervisor] Stop ignored: already completed");
            return Ok(StopReport {
                job_id: job_id.to_string(),
                signal: signal.to_string(),
                completed: true,
                already_completed: true,
                message: "Job already completed".to_string(),
            });
        }

        tracing::info!(job_id = %job_id, "[JobSupervisor] Stop requested ({})", signal);
        Ok(StopReport {
            job_id: job_id.to_string(),
            signal: signal.to_string(),
            completed: job.is_completed(),
            already_completed: false,
            message: format!("{} sent; use wait_program to observe completion", signal),
        })
    }

    /// SIGKILL every running job (session teardown)
    ///
    /// Returns the number of jobs signalled.
    pub async fn shutdown_all(&self) -> usize {
        let mut stopped = 0;
        for job in self.registry.running().await {
            if job.request_stop(StopSignal::Kill) {
                stopped += 1;
            }
        }
        if stopped > 0 {
            tracing::info!("[JobSupervisor] Killed {} running job(s)", stopped);
        }
        stopped
    }
}

// ============================================================================
// Workers
// ============================================================================

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Subscribe to stop requests, replaying one made before the worker started
fn subscribe_stop(job: &BackgroundJob) -> watch::Receiver<Option<StopSignal>> {
    let mut rx = job.stop_receiver();
    if rx.borrow().is_some() {
        rx.mark_changed();
    }
    rx
}

fn deliver(job: &BackgroundJob, signal: StopSignal) {
    let Some(pgid) = job.pgid() else {
        return;
    };
    if let Err(e) = signal_process_group(pgid, signal) {
        tracing::warn!(
            job_id = %job.id(),
            "[JobSupervisor] Failed to send {} to group {}: {}",
            signal,
            pgid,
            e
        );
    }
}

async fn pump_lines<R>(reader: R, job: Arc<BackgroundJob>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if is_stderr {
                    job.push_stderr(line);
                } else {
                    job.push_stdout(line);
                }
            }
            Err(e) => {
                tracing::debug!(job_id = %job.id(), "[JobSupervisor] Output read error: {}", e);
                break;
            }
        }
    }
}

/// Owns a shell job until its process exits
async fn supervise_child(job: Arc<BackgroundJob>, mut child: Child, grace: Duration) {
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump_lines(stdout, job.clone(), false)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump_lines(stderr, job.clone(), true)));
    }

    let mut stop_rx = subscribe_stop(&job);
    let mut kill_deadline: Option<Instant> = None;

    let status = loop {
        tokio::select! {
            biased;
            status = child.wait() => break status,
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    // Job dropped its sender; nothing can request a stop anymore.
                    break child.wait().await;
                }
                let requested = *stop_rx.borrow_and_update();
                if let Some(signal) = requested {
                    deliver(&job, signal);
                    kill_deadline = match signal {
                        StopSignal::Term => Some(Instant::now() + grace),
                        StopSignal::Kill => None,
                    };
                }
            }
            _ = sleep_until_deadline(kill_deadline) => {
                tracing::info!(
                    job_id = %job.id(),
                    "[JobSupervisor] Grace period elapsed; escalating to SIGKILL"
                );
                job.record_signal(StopSignal::Kill);
                deliver(&job, StopSignal::Kill);
                kill_deadline = None;
            }
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            // A background grandchild still holds the pipe open.
            reader.abort();
        }
    }

    let exit_code = match status {
        Ok(status) => exit_code_of(&status),
        Err(e) => {
            job.push_stderr(format!("failed to wait for process: {}", e));
            -1
        }
    };

    job.complete(exit_code);
    tracing::info!(
        job_id = %job.id(),
        "[JobSupervisor] Shell job finished with exit code {}",
        exit_code
    );
}

/// Owns a sandbox job until its future resolves or is killed
async fn supervise_task<Fut>(
    job: Arc<BackgroundJob>,
    future: Fut,
    cancel: CancellationToken,
    grace: Duration,
) where
    Fut: Future<Output = i32> + Send + 'static,
{
    tokio::pin!(future);
    let mut stop_rx = subscribe_stop(&job);
    let mut stop_open = true;
    let mut kill_deadline: Option<Instant> = None;

    let killed_code = 128 + 9;
    let exit_code = loop {
        tokio::select! {
            biased;
            code = &mut future => break code,
            changed = stop_rx.changed(), if stop_open => {
                if changed.is_err() {
                    stop_open = false;
                    continue;
                }
                let requested = *stop_rx.borrow_and_update();
                match requested {
                    Some(StopSignal::Term) => {
                        cancel.cancel();
                        kill_deadline.get_or_insert(Instant::now() + grace);
                    }
                    Some(StopSignal::Kill) => {
                        cancel.cancel();
                        break killed_code;
                    }
                    None => {}
                }
            }
            _ = sleep_until_deadline(kill_deadline) => {
                job.record_signal(StopSignal::Kill);
                break killed_code;
            }
        }
    };

    job.complete(exit_code);
    tracing::info!(
        job_id = %job.id(),
        "[JobSupervisor] Sandbox job finished with exit code {}",
        exit_code
    );
}
