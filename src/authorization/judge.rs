//! Safety judges for requests the allow-lists do not cover
//!
//! When a shell command or network domain is not pre-authorized, the actor
//! asks a [`SafetyJudge`] for a verdict. [`LlmSafetyJudge`] asks a language
//! model through the minimal [`TextCompleter`] interface and parses a JSON
//! verdict; [`EscalatingJudge`] hands every such request to the user.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::decision::AuthorizationDecision;
use crate::permissions::suggest_command_prefix;

/// Judges the safety of requests the allow-lists do not cover
#[async_trait]
pub trait SafetyJudge: Send + Sync {
    /// Judge whether a shell command is safe to run in `working_dir`
    async fn judge_command(&self, command: &str, working_dir: &Path)
        -> Result<AuthorizationDecision>;

    /// Judge whether sandboxed code may contact `domain`
    async fn judge_domain(&self, domain: &str) -> Result<AuthorizationDecision>;
}

/// Judge that escalates every request to the user
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalatingJudge;

#[async_trait]
impl SafetyJudge for EscalatingJudge {
    async fn judge_command(
        &self,
        command: &str,
        _working_dir: &Path,
    ) -> Result<AuthorizationDecision> {
        Ok(AuthorizationDecision::escalate(format!(
            "Command requires approval: {}",
            command
        ))
        .with_suggested_prefix(suggest_command_prefix(command)))
    }

    async fn judge_domain(&self, domain: &str) -> Result<AuthorizationDecision> {
        Ok(AuthorizationDecision::escalate(format!(
            "Network access to {} requires approval",
            domain
        )))
    }
}

/// Minimal text-completion interface used by [`LlmSafetyJudge`]
///
/// Implement this on top of whichever LLM client the application uses.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    /// Send `prompt` with `system` instructions and return the text reply
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// System prompt for command judgments
const COMMAND_SYSTEM_PROMPT: &str = r#"You are a security reviewer for an autonomous coding agent. You decide whether a shell command proposed by the agent is safe to run on the user's machine without asking the user.

Safe: read-only inspection, builds, tests, linters, formatters, package installs into the project, version control operations that do not rewrite or publish history.
Unsafe: deleting or overwriting files outside the project, privilege escalation, exfiltrating secrets or credentials, modifying system configuration, publishing or force-pushing, downloading and executing remote scripts.

Respond with ONLY a JSON object:
{"allowed": true|false, "reason": "<one sentence>", "requires_user_input": true|false, "suggested_prefix": "<reusable command prefix or empty>"}

Set requires_user_input to true when a human could reasonably approve the command, false only for commands that must never run."#;

/// System prompt for domain judgments
const DOMAIN_SYSTEM_PROMPT: &str = r#"You are a security reviewer for an autonomous coding agent. Sandboxed code written by the agent wants to make network requests to a domain. Decide whether the domain is a well-known, trustworthy service (package registries, documentation sites, major API providers, source hosting).

Respond with ONLY a JSON object:
{"allowed": true|false, "reason": "<one sentence>", "requires_user_input": true|false}

Set requires_user_input to true when a human could reasonably approve the domain."#;

/// Verdict shape expected from the model
#[derive(Debug, Deserialize)]
struct Verdict {
    allowed: bool,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    requires_user_input: Option<bool>,
    #[serde(default)]
    suggested_prefix: Option<String>,
}

/// Safety judge backed by a language model
pub struct LlmSafetyJudge<C> {
    completer: C,
}

impl<C: TextCompleter> LlmSafetyJudge<C> {
    /// Create a judge using the given completer
    pub fn new(completer: C) -> Self {
        Self { completer }
    }

    /// Parse a model reply into a decision
    ///
    /// Unreadable replies become escalations so the user gets the final say.
    pub fn parse_verdict(reply: &str) -> AuthorizationDecision {
        let json = match (reply.find('{'), reply.rfind('}')) {
            (Some(start), Some(end)) if start < end => &reply[start..=end],
            _ => reply,
        };

        match serde_json::from_str::<Verdict>(json) {
            Ok(verdict) => {
                let reason = if verdict.reason.trim().is_empty() {
                    if verdict.allowed {
                        "Approved by safety review".to_string()
                    } else {
                        "Rejected by safety review".to_string()
                    }
                } else {
                    verdict.reason.trim().to_string()
                };

                let mut decision = if verdict.allowed {
                    AuthorizationDecision::allow(reason)
                } else if verdict.requires_user_input.unwrap_or(true) {
                    AuthorizationDecision::escalate(reason)
                } else {
                    AuthorizationDecision::deny(reason)
                };
                if let Some(prefix) = verdict.suggested_prefix {
                    decision.suggested_command_prefix = prefix.trim().to_string();
                }
                decision
            }
            Err(e) => {
                tracing::warn!("[SafetyJudge] Unreadable verdict ({}): {}", e, reply);
                AuthorizationDecision::escalate("Safety review returned an unreadable verdict")
            }
        }
    }
}

#[async_trait]
impl<C: TextCompleter> SafetyJudge for LlmSafetyJudge<C> {
    async fn judge_command(
        &self,
        command: &str,
        working_dir: &Path,
    ) -> Result<AuthorizationDecision> {
        let prompt = format!(
            "Working directory: {}\nCommand:\n{}",
            working_dir.display(),
            command
        );

        tracing::debug!("[SafetyJudge] Judging command: {}", command);
        let reply = self.completer.complete(COMMAND_SYSTEM_PROMPT, &prompt).await?;

        let mut decision = Self::parse_verdict(&reply);
        if decision.suggested_command_prefix.is_empty() {
            decision.suggested_command_prefix = suggest_command_prefix(command);
        }

        tracing::info!(
            "[SafetyJudge] Command verdict: allowed={} escalate={} ({})",
            decision.allowed,
            decision.requires_user_input,
            decision.reason
        );
        Ok(decision)
    }

    async fn judge_domain(&self, domain: &str) -> Result<AuthorizationDecision> {
        let prompt = format!("Domain: {}", domain);

        tracing::debug!("[SafetyJudge] Judging domain: {}", domain);
        let reply = self.completer.complete(DOMAIN_SYSTEM_PROMPT, &prompt).await?;

        let mut decision = Self::parse_verdict(&reply);
        decision.suggested_command_prefix.clear();

        tracing::info!(
            "[SafetyJudge] Domain verdict for {}: allowed={} ({})",
            domain,
            decision.allowed,
            decision.reason
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedCompleter(&'static str);

    #[async_trait]
    impl TextCompleter for CannedCompleter {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_parse_verdict_with_surrounding_text() {
        let decision = LlmSafetyJudge::<CannedCompleter>::parse_verdict(
            "Sure.\n```json\n{\"allowed\": true, \"reason\": \"runs tests\"}\n```",
        );
        assert!(decision.allowed);
        assert_eq!(decision.reason, "runs tests");
    }

    #[test]
    fn test_parse_verdict_hard_denial() {
        let decision = LlmSafetyJudge::<CannedCompleter>::parse_verdict(
            r#"{"allowed": false, "reason": "wipes home", "requires_user_input": false}"#,
        );
        assert!(!decision.allowed);
        assert!(!decision.requires_user_input);
    }

    #[test]
    fn test_parse_verdict_defaults_to_escalation() {
        let decision = LlmSafetyJudge::<CannedCompleter>::parse_verdict(
            r#"{"allowed": false, "reason": "pushes to remote"}"#,
        );
        assert!(decision.is_pending_escalation());

        let decision = LlmSafetyJudge::<CannedCompleter>::parse_verdict("I cannot decide");
        assert!(decision.is_pending_escalation());
    }

    #[tokio::test]
    async fn test_command_judgment_suggests_prefix() {
        let judge = LlmSafetyJudge::new(CannedCompleter(
            r#"{"allowed": false, "reason": "publishes a crate"}"#,
        ));
        let decision = judge
            .judge_command("cargo publish --dry-run", Path::new("/work"))
            .await
            .unwrap();
        assert!(decision.is_pending_escalation());
        assert_eq!(decision.suggested_command_prefix, "cargo publish");
    }

    #[tokio::test]
    async fn test_escalating_judge() {
        let decision = EscalatingJudge.judge_domain("example.org").await.unwrap();
        assert!(decision.is_pending_escalation());
        assert!(decision.reason.contains("example.org"));
    }
}
