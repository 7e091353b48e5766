//! Background job registry and supervisor
//!
//! A job is a shell command (`sh -c`, own process group) or a sandboxed
//! program run asynchronously. The registry owns every job for the session;
//! the supervisor starts jobs and answers status, wait and stop calls.

mod config;
mod job;
mod process;
mod registry;
mod report;
mod supervisor;

pub use config::JobsConfig;
pub use job::{BackgroundJob, JobKind, JobState, OutputBuffer, DEFAULT_MAX_OUTPUT_LINES};
pub use process::{exit_code_of, signal_process_group, StopSignal, DEFAULT_KILL_GRACE_MS};
pub use registry::JobRegistry;
pub use report::{JobDetail, JobSummary, StatusReport, StopReport, WaitReport};
pub use supervisor::{build_shell_command, JobOutput, JobSupervisor};
