//! Authorization client facade
//!
//! The only way other components reach the actor. `authorize` looks like a
//! plain async call: it sends the request, then waits for whichever comes
//! first of the caller's cancellation, the request's own cancellation, the
//! optional timeout, or the reply.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::channels::{AuthCommand, AuthInbox, AuthRequest, PreAuthSnapshot};
use super::decision::AuthorizationDecision;
use crate::core::{race_cancellation, GuardError, GuardResult};
use crate::permissions::{AllowedPath, DomainPattern};

/// Cloneable handle to the authorization actor
#[derive(Debug, Clone)]
pub struct AuthorizationClient {
    inbox: AuthInbox,
    request_timeout: Option<Duration>,
}

impl AuthorizationClient {
    /// Create a client over an actor inbox
    pub fn new(inbox: AuthInbox, request_timeout: Option<Duration>) -> Self {
        Self {
            inbox,
            request_timeout,
        }
    }

    /// Override the maximum time `authorize` waits for a decision
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Ask the actor whether `tool_name` may run with `parameters`
    ///
    /// Denials come back as `Ok` decisions. `Err` means the request could not
    /// be evaluated, was cancelled, or timed out.
    pub async fn authorize(
        &self,
        tool_name: &str,
        parameters: &Value,
        cancel: &CancellationToken,
    ) -> GuardResult<AuthorizationDecision> {
        // Cancelled when this call returns, so the actor can skip or discard stale work.
        let request_token = cancel.child_token();
        let _guard = request_token.clone().drop_guard();

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = AuthCommand::Authorize(AuthRequest {
            tool_name: tool_name.to_string(),
            parameters: parameters.clone(),
            cancel: request_token.clone(),
            reply: reply_tx,
        });

        let exchange = async {
            self.inbox
                .send(command)
                .await
                .map_err(|_| GuardError::ChannelClosed)?;
            reply_rx.await.map_err(|_| GuardError::ChannelClosed)?
        };

        let result =
            race_cancellation(cancel, &request_token, self.request_timeout, exchange).await?;

        if let Err(e) = &result {
            tracing::debug!("[AuthClient] {} not evaluated: {}", tool_name, e);
        }
        result
    }

    /// Add a command prefix to the session allow-list
    pub async fn approve_command(&self, prefix: impl Into<String>) -> GuardResult<bool> {
        let prefix = prefix.into();
        self.call(|reply| AuthCommand::ApproveCommand { prefix, reply })
            .await
    }

    /// Add a path to the session allow-list
    pub async fn approve_path(&self, path: AllowedPath) -> GuardResult<bool> {
        self.call(|reply| AuthCommand::ApprovePath { path, reply })
            .await
    }

    /// Add a domain pattern to the session allow-list
    pub async fn approve_domain(&self, pattern: DomainPattern) -> GuardResult<bool> {
        self.call(|reply| AuthCommand::ApproveDomain { pattern, reply })
            .await
    }

    /// Read the actor's current pre-authorization state
    pub async fn snapshot(&self) -> GuardResult<PreAuthSnapshot> {
        self.call(|reply| AuthCommand::Snapshot { reply }).await
    }

    /// Check if the actor is still running
    pub fn is_connected(&self) -> bool {
        !self.inbox.is_closed()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> AuthCommand,
    ) -> GuardResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(build(reply_tx))
            .await
            .map_err(|_| GuardError::ChannelClosed)?;
        reply_rx.await.map_err(|_| GuardError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::actor::spawn_authorization_actor;
    use crate::authorization::channels::create_auth_channel;
    use crate::authorization::judge::{EscalatingJudge, SafetyJudge};
    use crate::authorization::options::AuthorizationOptions;
    use crate::authorization::read_tracker::ReadTracker;
    use crate::authorization::rules::{CREATE_FILE, GO_SANDBOX_DOMAIN, SHELL};
    use crate::permissions::PathAccess;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct SlowJudge {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SafetyJudge for SlowJudge {
        async fn judge_command(
            &self,
            _command: &str,
            _working_dir: &Path,
        ) -> anyhow::Result<AuthorizationDecision> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(AuthorizationDecision::allow("slow but fine"))
        }

        async fn judge_domain(&self, _domain: &str) -> anyhow::Result<AuthorizationDecision> {
            Ok(AuthorizationDecision::allow("fine"))
        }
    }

    fn client(dir: &TempDir, options: AuthorizationOptions) -> AuthorizationClient {
        spawn_authorization_actor(
            &options,
            dir.path(),
            Arc::new(ReadTracker::new(dir.path())),
            Arc::new(EscalatingJudge),
            None,
        )
    }

    #[tokio::test]
    async fn test_authorize_round_trip() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("exists.txt"), "x").unwrap();
        let client = client(&dir, AuthorizationOptions::new());
        let cancel = CancellationToken::new();

        let decision = client
            .authorize(CREATE_FILE, &json!({"path": "exists.txt"}), &cancel)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("already exists"));
    }

    #[tokio::test]
    async fn test_session_approvals() {
        let dir = TempDir::new().unwrap();
        let client = client(&dir, AuthorizationOptions::new());
        let cancel = CancellationToken::new();

        let params = json!({"command": "npm install"});
        let decision = client.authorize(SHELL, &params, &cancel).await.unwrap();
        assert!(decision.is_pending_escalation());
        assert_eq!(decision.suggested_command_prefix, "npm install");

        assert!(client.approve_command("npm install").await.unwrap());
        assert!(!client.approve_command("npm   install").await.unwrap());
        let decision = client.authorize(SHELL, &params, &cancel).await.unwrap();
        assert!(decision.allowed);

        client
            .approve_domain(DomainPattern::parse("*.npmjs.org").unwrap())
            .await
            .unwrap();
        let decision = client
            .authorize(GO_SANDBOX_DOMAIN, &json!({"domain": "registry.npmjs.org"}), &cancel)
            .await
            .unwrap();
        assert!(decision.allowed);

        client
            .approve_path(AllowedPath::new("/srv/data", PathAccess::ReadOnly, dir.path()))
            .await
            .unwrap();
        let snapshot = client.snapshot().await.unwrap();
        assert_eq!(snapshot.paths.len(), 1);
        assert_eq!(snapshot.command_prefixes, vec!["npm install".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_caller_returns_promptly() {
        let dir = TempDir::new().unwrap();
        let finished = Arc::new(AtomicBool::new(false));
        let client = spawn_authorization_actor(
            &AuthorizationOptions::new(),
            dir.path(),
            Arc::new(ReadTracker::new(dir.path())),
            Arc::new(SlowJudge {
                finished: finished.clone(),
            }),
            None,
        );

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = client
            .authorize(SHELL, &json!({"command": "make"}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(250));

        // The judgment is not interrupted; the actor finishes it and moves on.
        let fresh = CancellationToken::new();
        let decision = client
            .authorize(SHELL, &json!({"command": "make"}), &fresh)
            .await
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let dir = TempDir::new().unwrap();
        let client = spawn_authorization_actor(
            &AuthorizationOptions::new().with_request_timeout(20),
            dir.path(),
            Arc::new(ReadTracker::new(dir.path())),
            Arc::new(SlowJudge {
                finished: Arc::new(AtomicBool::new(false)),
            }),
            None,
        );

        let err = client
            .authorize(SHELL, &json!({"command": "make"}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Timeout(_)));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_closed_actor() {
        let (tx, rx) = create_auth_channel();
        drop(rx);
        let client = AuthorizationClient::new(tx, None);

        assert!(!client.is_connected());
        let err = client
            .authorize("anything", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ChannelClosed));
    }
}
