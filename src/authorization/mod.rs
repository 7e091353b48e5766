//! Authorization actor and client facade
//!
//! Every sensitive tool call is evaluated here before it executes:
//! - `AuthorizationActor` - Single-owner worker holding the policy state
//! - `AuthorizationClient` - Cloneable facade; the only way to reach the actor
//! - `Policy` - Per-tool rules (`write_file_diff`, `create_file`, `shell`, ...)
//! - `SafetyJudge` - Verdicts for commands and domains the allow-lists miss
//!
//! ## Example
//!
//! ```rust,ignore
//! use shadow_agent_guard::authorization::*;
//!
//! let client = spawn_authorization_actor(
//!     &AuthorizationOptions::new().allow_command_prefix("cargo test"),
//!     "/work/project",
//!     Arc::new(ReadTracker::new("/work/project")),
//!     Arc::new(EscalatingJudge),
//!     None,
//! );
//!
//! let decision = client
//!     .authorize("shell", &json!({"command": "cargo test"}), &cancel)
//!     .await?;
//! if decision.is_pending_escalation() {
//!     // ask the user
//! }
//! ```

mod actor;
mod channels;
mod client;
mod decision;
mod judge;
mod options;
mod read_tracker;
pub mod rules;

pub use actor::{spawn_authorization_actor, AuthorizationActor};
pub use channels::{
    create_auth_channel, AuthCommand, AuthInbox, AuthInboxReceiver, AuthRequest,
    PreAuthSnapshot, AUTH_INBOX_SIZE,
};
pub use client::AuthorizationClient;
pub use decision::AuthorizationDecision;
pub use judge::{EscalatingJudge, LlmSafetyJudge, SafetyJudge, TextCompleter};
pub use options::AuthorizationOptions;
pub use read_tracker::ReadTracker;
pub use rules::Policy;
