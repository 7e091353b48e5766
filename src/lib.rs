//! Authorization, job supervision and sandboxing for agent tool calls
//!
//! - `authorization` - Single-owner actor that decides whether a tool call may run
//! - `jobs` - Background job registry and supervisor (start/status/wait/stop)
//! - `sandbox` - Landlock filesystem restriction for supervised processes
//! - `tools` - Tool trait, exclusive-execution gate and built-in tools
//! - `runtime` - `GuardRuntime`, which wires everything for one session

pub mod authorization;
pub mod config;
pub mod core;
pub mod jobs;
pub mod logging;
pub mod permissions;
pub mod runtime;
pub mod sandbox;
pub mod tools;

pub use authorization::{AuthorizationClient, AuthorizationDecision, AuthorizationOptions};
pub use config::GuardConfig;
pub use core::{GuardError, GuardResult};
pub use runtime::GuardRuntime;
pub use tools::{Tool, ToolCallResult, ToolRegistry};
