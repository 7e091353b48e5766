//! Allow-lists backing the authorization policy
//!
//! This module provides:
//! - `AllowedPathRegistry` - Paths and globs with read-only / read-write access
//! - Domain matchers - Exact and wildcard (`*.example.com`) domains
//! - Command matchers - Token-boundary prefix matching for shell commands
//! - `ApprovalStore` - Approvals persisted for a workspace
//!
//! ## Example
//!
//! ```rust,ignore
//! use shadow_agent_guard::permissions::{is_domain_authorized, DomainPattern};
//!
//! let patterns = vec![DomainPattern::parse("*.foo.com")?];
//! assert!(is_domain_authorized("api.foo.com", &patterns));
//! assert!(!is_domain_authorized("foo.com.evil.com", &patterns));
//! ```

mod matchers;
mod paths;
mod store;

pub use matchers::{
    is_command_authorized, is_domain_authorized, normalize_command, normalize_domain,
    split_command_segments, suggest_command_prefix, DomainPattern,
};
pub(crate) use paths::resolve_root_or_keep;
pub use paths::{
    absolutize, resolve_path, resolve_root, AllowedPath, AllowedPathRegistry, PathAccess,
};
pub use store::{ApprovalScope, ApprovalStore, PersistedApprovals};
