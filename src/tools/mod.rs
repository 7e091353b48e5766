//! Tool system for the guard
//!
//! This module provides:
//! - `Tool` trait - Interface for implementing tools
//! - `ToolResult` / `ToolCallResult` - Execution output and the model-facing call outcome
//! - `ToolRegistry` - Exclusive gate, authorization and execution for every call
//! - `ExclusiveLocks` - One lock per exclusivity class
//! - Built-in tools: `shell`, `status_program`, `wait_program`, `stop_program`,
//!   `request_path_access`

mod exclusive;
mod jobs;
mod path_access;
mod registry;
mod shell;
mod tool;

pub use exclusive::{ExclusiveLock, ExclusiveLocks, FILE_MUTATION};
pub use jobs::{
    StatusProgramTool, StopProgramTool, WaitProgramTool, STATUS_PROGRAM, STOP_PROGRAM,
    WAIT_PROGRAM,
};
pub use path_access::RequestPathAccessTool;
pub use registry::{ToolCallResult, ToolRegistry};
pub use shell::ShellTool;
pub use tool::{Tool, ToolContext, ToolDefinition, ToolInfo, ToolResult};
