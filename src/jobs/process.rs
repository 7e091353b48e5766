//! Process-group helpers for supervised shell jobs
//!
//! - `set_process_group` runs in `pre_exec` so the child leads its own group.
//! - `signal_process_group` delivers a signal to the whole group, so
//!   grandchildren spawned by `sh -c` are reached too.
//!
//! On non-Unix platforms these helpers are no-ops.

use std::io;
use std::process::ExitStatus;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::GuardError;

/// Grace period between SIGTERM and the automatic SIGKILL (milliseconds)
pub const DEFAULT_KILL_GRACE_MS: u64 = 2_000;

/// Signal accepted by `stop_program`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StopSignal {
    /// SIGTERM - graceful shutdown
    #[default]
    Term,
    /// SIGKILL - immediate termination
    Kill,
}

impl StopSignal {
    /// Signal name as reported to callers
    pub fn as_str(self) -> &'static str {
        match self {
            StopSignal::Term => "SIGTERM",
            StopSignal::Kill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn as_libc_signal(self) -> libc::c_int {
        match self {
            StopSignal::Term => libc::SIGTERM,
            StopSignal::Kill => libc::SIGKILL,
        }
    }
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopSignal {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("SIG").unwrap_or(&upper) {
            "TERM" | "15" => Ok(StopSignal::Term),
            "KILL" | "9" => Ok(StopSignal::Kill),
            _ => Err(GuardError::invalid_input(format!(
                "unsupported signal '{}' (expected SIGTERM or SIGKILL)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for StopSignal {
    type Error = GuardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StopSignal> for String {
    fn from(signal: StopSignal) -> Self {
        signal.as_str().to_string()
    }
}

/// Put the calling process into its own process group
///
/// Intended for use in `pre_exec` so the child becomes the group leader.
#[cfg(unix)]
pub fn set_process_group() -> io::Result<()> {
    let result = unsafe { libc::setpgid(0, 0) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn set_process_group() -> io::Result<()> {
    Ok(())
}

/// Send `signal` to every process in group `pgid`
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_process_group(pgid: u32, signal: StopSignal) -> io::Result<()> {
    let result = unsafe { libc::killpg(pgid as libc::pid_t, signal.as_libc_signal()) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn signal_process_group(_pgid: u32, _signal: StopSignal) -> io::Result<()> {
    Ok(())
}

/// Exit code for a finished process
///
/// Processes killed by a signal report `128 + signal`, as shells do.
pub fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
