//! Runtime path-access requests
//!
//! The model asks for a path through the `request_path_access` tool. The
//! authorization actor escalates unknown paths; once the user approves, a
//! [`PathGrant`] updates the actor, the sandbox and (for workspace scope) the
//! approval store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{GuardError, GuardResult};
use crate::permissions::{AllowedPath, ApprovalScope, PathAccess};

/// Parameters of a `request_path_access` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathAccessRequest {
    /// Path (or glob) being requested
    pub path: PathBuf,

    /// Requested access; defaults to read-only
    #[serde(default = "default_access", deserialize_with = "deserialize_access")]
    pub access: PathAccess,

    /// Why the model needs it
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_access() -> PathAccess {
    PathAccess::ReadOnly
}

fn deserialize_access<'de, D>(deserializer: D) -> Result<PathAccess, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let label = String::deserialize(deserializer)?;
    PathAccess::parse(&label)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown access level: {}", label)))
}

impl PathAccessRequest {
    /// Parse the tool parameters
    pub fn from_params(params: &serde_json::Value) -> GuardResult<Self> {
        serde_json::from_value(params.clone())
            .map_err(|e| GuardError::invalid_input(format!("invalid path access request: {}", e)))
    }

    /// Turn an approved request into a grant
    pub fn approve(&self, scope: ApprovalScope, base: &Path) -> PathGrant {
        PathGrant::new(&self.path, self.access, scope, base)
    }
}

/// An approved path grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathGrant {
    pub allowed: AllowedPath,
    pub scope: ApprovalScope,
}

impl PathGrant {
    /// Resolve `path` against `base` and build a grant
    pub fn new(
        path: impl AsRef<Path>,
        access: PathAccess,
        scope: ApprovalScope,
        base: &Path,
    ) -> Self {
        Self {
            allowed: AllowedPath::new(path, access, base),
            scope,
        }
    }

    /// Whether the grant outlives the session
    pub fn is_persistent(&self) -> bool {
        self.scope == ApprovalScope::Workspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let request = PathAccessRequest::from_params(&json!({
            "path": "/srv/data",
            "access": "rw",
            "reason": "fixtures live there"
        }))
        .unwrap();
        assert_eq!(request.access, PathAccess::ReadWrite);

        let request = PathAccessRequest::from_params(&json!({"path": "/srv/data"})).unwrap();
        assert_eq!(request.access, PathAccess::ReadOnly);

        assert!(PathAccessRequest::from_params(&json!({"path": "/x", "access": "all"})).is_err());
        assert!(PathAccessRequest::from_params(&json!({})).is_err());
    }

    #[test]
    fn test_approve_resolves_relative_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let request = PathAccessRequest::from_params(&json!({"path": "sub/dir"})).unwrap();

        let grant = request.approve(ApprovalScope::Workspace, &base);
        assert_eq!(grant.allowed.path, base.join("sub/dir"));
        assert!(grant.is_persistent());
    }
}
