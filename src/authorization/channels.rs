//! Message and channel definitions for the authorization actor
//!
//! The actor is reachable only through its inbox:
//! - **Inbox** (mpsc, bounded): commands from any number of clients
//! - **Reply** (oneshot): one per command, carries exactly one answer
//!
//! A full inbox makes senders wait; requests are never dropped.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::decision::AuthorizationDecision;
use crate::core::GuardResult;
use crate::permissions::{AllowedPath, DomainPattern};

/// Default buffer size for the actor inbox
pub const AUTH_INBOX_SIZE: usize = 64;

/// A single authorization request
#[derive(Debug)]
pub struct AuthRequest {
    /// Name of the tool being invoked
    pub tool_name: String,

    /// Tool parameters as received from the model
    pub parameters: Value,

    /// The request's own cancellation token
    ///
    /// Cancelled when the caller gives up, so the actor can skip stale work.
    pub cancel: CancellationToken,

    /// Single-slot reply channel
    pub reply: oneshot::Sender<GuardResult<AuthorizationDecision>>,
}

/// Current pre-authorization state of the actor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreAuthSnapshot {
    pub dangerously_allow_all: bool,
    pub allow_all_network: bool,
    pub paths: Vec<AllowedPath>,
    pub domains: Vec<DomainPattern>,
    pub command_prefixes: Vec<String>,
    pub approved_commands: Vec<String>,
    pub workspace_dir: PathBuf,
}

/// Commands accepted by the authorization actor
#[derive(Debug)]
pub enum AuthCommand {
    /// Evaluate a tool invocation
    Authorize(AuthRequest),

    /// Add a command prefix to the session allow-list
    ///
    /// Replies `true` if the prefix was new.
    ApproveCommand {
        prefix: String,
        reply: oneshot::Sender<bool>,
    },

    /// Add a path to the session allow-list
    ApprovePath {
        path: AllowedPath,
        reply: oneshot::Sender<bool>,
    },

    /// Add a domain pattern to the session allow-list
    ApproveDomain {
        pattern: DomainPattern,
        reply: oneshot::Sender<bool>,
    },

    /// Read the current pre-authorization state
    Snapshot {
        reply: oneshot::Sender<PreAuthSnapshot>,
    },
}

impl AuthCommand {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthCommand::Authorize(_) => "authorize",
            AuthCommand::ApproveCommand { .. } => "approve_command",
            AuthCommand::ApprovePath { .. } => "approve_path",
            AuthCommand::ApproveDomain { .. } => "approve_domain",
            AuthCommand::Snapshot { .. } => "snapshot",
        }
    }
}

// ============================================================================
// Channel Type Aliases
// ============================================================================

/// Sender half of the inbox (held by `AuthorizationClient`)
pub type AuthInbox = mpsc::Sender<AuthCommand>;

/// Receiver half of the inbox (owned by the actor loop)
pub type AuthInboxReceiver = mpsc::Receiver<AuthCommand>;

/// Create a new inbox channel pair
pub fn create_auth_channel() -> (AuthInbox, AuthInboxReceiver) {
    mpsc::channel(AUTH_INBOX_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inbox_round_trip() {
        let (tx, mut rx) = create_auth_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(AuthCommand::ApproveCommand {
            prefix: "git status".into(),
            reply: reply_tx,
        })
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            AuthCommand::ApproveCommand { prefix, reply } => {
                assert_eq!(prefix, "git status");
                reply.send(true).unwrap();
            }
            other => panic!("unexpected command: {}", other.kind()),
        }
        assert!(reply_rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_inbox_close() {
        let (tx, mut rx) = create_auth_channel();
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
