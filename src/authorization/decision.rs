//! Authorization decision type

use serde::{Deserialize, Serialize};

/// Verdict for a single tool invocation
///
/// A decision with `allowed == false` and `requires_user_input == true` is a
/// pending escalation: a human (or higher-level policy) may still approve it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    /// Whether the tool may run
    pub allowed: bool,

    /// Human-readable explanation
    #[serde(default)]
    pub reason: String,

    /// Whether a denial invites user approval rather than being final
    #[serde(default)]
    pub requires_user_input: bool,

    /// Prefix the user can approve to avoid future prompts (shell only)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suggested_command_prefix: String,
}

impl AuthorizationDecision {
    /// Allow the invocation
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            ..Default::default()
        }
    }

    /// Deny the invocation outright
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            ..Default::default()
        }
    }

    /// Deny pending user approval
    pub fn escalate(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_user_input: true,
            ..Default::default()
        }
    }

    /// Attach a suggested command prefix
    pub fn with_suggested_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.suggested_command_prefix = prefix.into();
        self
    }

    /// Whether this is a denial awaiting user approval
    pub fn is_pending_escalation(&self) -> bool {
        !self.allowed && self.requires_user_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let d = AuthorizationDecision::allow("ok");
        assert!(d.allowed);
        assert!(!d.is_pending_escalation());

        let d = AuthorizationDecision::deny("no");
        assert!(!d.allowed);
        assert!(!d.requires_user_input);
        assert!(!d.is_pending_escalation());

        let d = AuthorizationDecision::escalate("ask").with_suggested_prefix("git push");
        assert!(d.is_pending_escalation());
        assert_eq!(d.suggested_command_prefix, "git push");
    }

    #[test]
    fn test_serialization_skips_empty_prefix() {
        let json = serde_json::to_value(AuthorizationDecision::allow("ok")).unwrap();
        assert!(json.get("suggested_command_prefix").is_none());
        assert_eq!(json["allowed"], true);
    }
}
