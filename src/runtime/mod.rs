//! Session runtime
//!
//! `GuardRuntime` owns one session's authorization actor, sandbox, job
//! supervisor and tool registry, and applies user approvals to all of them.

#[allow(clippy::module_inception)]
mod runtime;

pub use runtime::GuardRuntime;
