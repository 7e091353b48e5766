//! Landlock enforcement (Linux only)
//!
//! Enforcement happens in two phases around `fork()`:
//! 1. In the parent, [`prepare`] opens a `PathFd` for every rule. Allocation
//!    and filesystem access are fine here.
//! 2. In the child, inside `pre_exec`, [`enforce`] only issues the Landlock
//!    syscalls over the pre-opened descriptors and restricts itself.

use landlock::{
    Access, AccessFs, BitFlags, CompatLevel, Compatible, PathBeneath, PathFd, Ruleset,
    RulesetAttr, RulesetCreatedAttr, RulesetStatus, ABI,
};

use super::config::EnforcementMode;
use super::rules::SandboxRule;
use crate::permissions::PathAccess;

/// Highest ABI requested; older kernels get the subset they support
const TARGET_ABI: ABI = ABI::V5;

/// Whether the running kernel supports Landlock at all
pub fn is_supported() -> bool {
    Ruleset::default()
        .set_compatibility(CompatLevel::HardRequirement)
        .handle_access(AccessFs::from_all(ABI::V1))
        .and_then(|ruleset| ruleset.create())
        .is_ok()
}

/// Rules with descriptors opened in the parent process
pub struct PreparedRules {
    rules: Vec<(PathFd, BitFlags<AccessFs>)>,
    mode: EnforcementMode,
}

impl PreparedRules {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn access_flags(access: PathAccess, is_dir: bool) -> BitFlags<AccessFs> {
    let flags = match access {
        PathAccess::ReadOnly => AccessFs::from_read(TARGET_ABI),
        PathAccess::ReadWrite => AccessFs::from_all(TARGET_ABI),
    };
    if is_dir {
        flags
    } else {
        flags & AccessFs::from_file(TARGET_ABI)
    }
}

/// Phase 1 (parent): open descriptors for every rule
///
/// Paths that cannot be opened (usually because they do not exist) are skipped.
pub fn prepare(rules: &[SandboxRule], mode: EnforcementMode) -> PreparedRules {
    let mut prepared = Vec::with_capacity(rules.len());

    for rule in rules {
        let is_dir = rule.path.is_dir();
        match PathFd::new(&rule.path) {
            Ok(fd) => prepared.push((fd, access_flags(rule.access, is_dir))),
            Err(e) => tracing::debug!(
                "[Sandbox] Skipping {} ({}): {}",
                rule.path.display(),
                rule.access,
                e
            ),
        }
    }

    PreparedRules {
        rules: prepared,
        mode,
    }
}

/// Phase 2 (child, inside `pre_exec`): create the ruleset and restrict self
///
/// In strict mode a ruleset the kernel did not enforce is an error.
pub fn enforce(prepared: PreparedRules) -> Result<(), String> {
    let mut ruleset = Ruleset::default()
        .set_compatibility(CompatLevel::BestEffort)
        .handle_access(AccessFs::from_all(TARGET_ABI))
        .map_err(|e| format!("failed to create Landlock ruleset: {e}"))?
        .create()
        .map_err(|e| format!("failed to create Landlock ruleset: {e}"))?;

    for (fd, access) in prepared.rules {
        ruleset = ruleset
            .add_rule(PathBeneath::new(fd, access))
            .map_err(|e| format!("failed to add Landlock rule: {e}"))?;
    }

    let status = ruleset
        .restrict_self()
        .map_err(|e| format!("failed to enforce Landlock ruleset: {e}"))?;

    match (status.ruleset, prepared.mode) {
        (RulesetStatus::NotEnforced, EnforcementMode::Strict) => {
            Err("Landlock ruleset was not enforced".to_string())
        }
        _ => Ok(()),
    }
}
