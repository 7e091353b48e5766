//! Authorization actor worker loop
//!
//! The actor owns the [`Policy`] and processes one command at a time from its
//! inbox. Because nothing else can reach the policy, approvals and decisions
//! are serialized without locks.

use std::path::PathBuf;
use std::sync::Arc;

use super::channels::{create_auth_channel, AuthCommand, AuthInboxReceiver, AuthRequest};
use super::client::AuthorizationClient;
use super::judge::SafetyJudge;
use super::options::AuthorizationOptions;
use super::read_tracker::ReadTracker;
use super::rules::Policy;
use crate::permissions::PersistedApprovals;

/// Single-owner authorization worker
pub struct AuthorizationActor {
    policy: Policy,
    inbox: AuthInboxReceiver,
}

impl AuthorizationActor {
    /// Create an actor over an existing inbox
    pub fn new(policy: Policy, inbox: AuthInboxReceiver) -> Self {
        Self { policy, inbox }
    }

    /// Process commands until every client is dropped
    pub async fn run(mut self) {
        tracing::info!("[AuthActor] Started");

        while let Some(command) = self.inbox.recv().await {
            tracing::debug!("[AuthActor] Received {}", command.kind());
            self.handle(command).await;
        }

        tracing::info!("[AuthActor] Inbox closed, stopping");
    }

    async fn handle(&mut self, command: AuthCommand) {
        match command {
            AuthCommand::Authorize(request) => self.authorize(request).await,
            AuthCommand::ApproveCommand { prefix, reply } => {
                let added = self.policy.approve_command_prefix(&prefix);
                if added {
                    tracing::info!("[AuthActor] Approved command prefix: {}", prefix);
                }
                let _ = reply.send(added);
            }
            AuthCommand::ApprovePath { path, reply } => {
                let added = self.policy.approve_path(&path);
                if added {
                    tracing::info!(
                        "[AuthActor] Approved path: {} ({})",
                        path.path.display(),
                        path.access
                    );
                }
                let _ = reply.send(added);
            }
            AuthCommand::ApproveDomain { pattern, reply } => {
                tracing::info!("[AuthActor] Approving domain: {}", pattern);
                let _ = reply.send(self.policy.approve_domain(pattern));
            }
            AuthCommand::Snapshot { reply } => {
                let _ = reply.send(self.policy.snapshot());
            }
        }
    }

    async fn authorize(&mut self, request: AuthRequest) {
        let AuthRequest {
            tool_name,
            parameters,
            cancel,
            reply,
        } = request;

        if cancel.is_cancelled() || reply.is_closed() {
            tracing::debug!("[AuthActor] Skipping abandoned request for {}", tool_name);
            return;
        }

        tracing::debug!("[AuthActor] Evaluating {}: {}", tool_name, parameters);

        // Runs to completion even if the caller gives up meanwhile.
        let result = self.policy.evaluate(&tool_name, &parameters).await;

        match &result {
            Ok(decision) => tracing::info!(
                "[AuthActor] {} -> allowed={} escalate={} ({})",
                tool_name,
                decision.allowed,
                decision.requires_user_input,
                decision.reason
            ),
            Err(e) => tracing::warn!("[AuthActor] {} -> evaluation failed: {}", tool_name, e),
        }

        if cancel.is_cancelled() || reply.send(result).is_err() {
            tracing::debug!(
                "[AuthActor] Caller for {} went away; discarding decision",
                tool_name
            );
        }
    }
}

/// Spawn the actor on the current runtime and return a client for it
pub fn spawn_authorization_actor(
    options: &AuthorizationOptions,
    workspace_dir: impl Into<PathBuf>,
    read_tracker: Arc<ReadTracker>,
    judge: Arc<dyn SafetyJudge>,
    persisted: Option<&PersistedApprovals>,
) -> AuthorizationClient {
    let mut policy = Policy::new(options, workspace_dir, read_tracker, judge);
    if let Some(approvals) = persisted {
        policy.apply_persisted(approvals);
    }

    let (inbox_tx, inbox_rx) = create_auth_channel();
    tokio::spawn(AuthorizationActor::new(policy, inbox_rx).run());

    AuthorizationClient::new(inbox_tx, options.request_timeout())
}
