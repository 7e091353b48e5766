//! Job supervisor configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::job::DEFAULT_MAX_OUTPUT_LINES;
use super::process::DEFAULT_KILL_GRACE_MS;

/// Configuration for background jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Lines retained per output stream (0 = unbounded)
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,

    /// Time between SIGTERM and the automatic SIGKILL, in milliseconds
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Upper bound for `wait_program` when the caller gives none, in milliseconds
    #[serde(default)]
    pub default_wait_timeout_ms: Option<u64>,
}

fn default_max_output_lines() -> usize {
    DEFAULT_MAX_OUTPUT_LINES
}

fn default_kill_grace_ms() -> u64 {
    DEFAULT_KILL_GRACE_MS
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
            kill_grace_ms: DEFAULT_KILL_GRACE_MS,
            default_wait_timeout_ms: None,
        }
    }
}

impl JobsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_output_lines(mut self, lines: usize) -> Self {
        self.max_output_lines = lines;
        self
    }

    pub fn with_kill_grace(mut self, grace_ms: u64) -> Self {
        self.kill_grace_ms = grace_ms;
        self
    }

    pub fn with_default_wait_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_wait_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn default_wait_timeout(&self) -> Option<Duration> {
        self.default_wait_timeout_ms.map(Duration::from_millis)
    }
}
