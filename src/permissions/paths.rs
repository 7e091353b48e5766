//! Allowed path registry
//!
//! Paths are normalized to an absolute, cleaned form when they are inserted.
//! A path is authorized when it equals an allowed path or lies beneath one
//! (component-wise, so `/work/app` does not cover `/work/application`).
//! Entries containing glob metacharacters are matched with `glob::Pattern`.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

/// Access level granted to an allowed path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathAccess {
    /// Reads only
    ReadOnly,
    /// Reads and writes
    ReadWrite,
}

impl PathAccess {
    /// Whether a grant at this level satisfies a request for `requested`
    pub fn permits(self, requested: PathAccess) -> bool {
        match (self, requested) {
            (PathAccess::ReadWrite, _) => true,
            (PathAccess::ReadOnly, PathAccess::ReadOnly) => true,
            (PathAccess::ReadOnly, PathAccess::ReadWrite) => false,
        }
    }

    /// Parse a user/LLM supplied access label
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read_only" | "readonly" | "read-only" | "ro" | "read" => Some(PathAccess::ReadOnly),
            "read_write" | "readwrite" | "read-write" | "rw" | "write" => {
                Some(PathAccess::ReadWrite)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for PathAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathAccess::ReadOnly => write!(f, "read-only"),
            PathAccess::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// A single allow-listed path with its access level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedPath {
    /// Absolute, cleaned path (or glob pattern)
    pub path: PathBuf,
    /// Access level
    pub access: PathAccess,
}

impl AllowedPath {
    /// Create an allowed path, resolving it against `base` when relative
    pub fn new(path: impl AsRef<Path>, access: PathAccess, base: &Path) -> Self {
        Self {
            path: resolve_path(path.as_ref(), base),
            access,
        }
    }

    /// Whether this entry is a glob pattern rather than a literal path
    pub fn is_glob(&self) -> bool {
        is_glob(&self.path.to_string_lossy())
    }
}

enum Matcher {
    Prefix(PathBuf),
    Glob(Pattern),
}

struct Entry {
    allowed: AllowedPath,
    matcher: Matcher,
}

impl Entry {
    fn matches(&self, candidate: &Path) -> bool {
        match &self.matcher {
            Matcher::Prefix(prefix) => candidate.starts_with(prefix),
            Matcher::Glob(pattern) => {
                let options = MatchOptions {
                    case_sensitive: true,
                    require_literal_separator: true,
                    require_literal_leading_dot: false,
                };
                candidate
                    .ancestors()
                    .any(|ancestor| pattern.matches_path_with(ancestor, options))
            }
        }
    }
}

/// Registry of allow-listed paths
pub struct AllowedPathRegistry {
    base_dir: PathBuf,
    entries: Vec<Entry>,
}

impl AllowedPathRegistry {
    /// Create an empty registry that resolves relative paths against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            base_dir: resolve_root_or_keep(&base_dir),
            entries: Vec::new(),
        }
    }

    /// The directory relative paths are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Add a path or glob
    ///
    /// Returns `false` if an identical entry already exists or the glob is invalid.
    pub fn add(&mut self, path: impl AsRef<Path>, access: PathAccess) -> bool {
        let raw = path.as_ref();
        let allowed = if is_glob(&raw.to_string_lossy()) {
            AllowedPath {
                path: absolutize(raw, &self.base_dir),
                access,
            }
        } else {
            AllowedPath::new(raw, access, &self.base_dir)
        };

        if self.entries.iter().any(|e| e.allowed == allowed) {
            return false;
        }

        let matcher = if allowed.is_glob() {
            match Pattern::new(&allowed.path.to_string_lossy()) {
                Ok(pattern) => Matcher::Glob(pattern),
                Err(e) => {
                    tracing::warn!(
                        "[AllowedPaths] Ignoring invalid glob {}: {}",
                        allowed.path.display(),
                        e
                    );
                    return false;
                }
            }
        } else {
            Matcher::Prefix(allowed.path.clone())
        };

        tracing::debug!(
            "[AllowedPaths] Allowing {} ({})",
            allowed.path.display(),
            allowed.access
        );
        self.entries.push(Entry { allowed, matcher });
        true
    }

    /// Add an already constructed entry
    pub fn add_allowed(&mut self, allowed: &AllowedPath) -> bool {
        self.add(&allowed.path, allowed.access)
    }

    /// Whether `path` is covered by an entry granting at least `access`
    pub fn is_allowed(&self, path: impl AsRef<Path>, access: PathAccess) -> bool {
        self.access_for(path)
            .map(|granted| granted.permits(access))
            .unwrap_or(false)
    }

    /// The strongest access level any matching entry grants for `path`
    pub fn access_for(&self, path: impl AsRef<Path>) -> Option<PathAccess> {
        let candidate = resolve_path(path.as_ref(), &self.base_dir);
        let mut best = None;
        for entry in self.entries.iter().filter(|e| e.matches(&candidate)) {
            match entry.allowed.access {
                PathAccess::ReadWrite => return Some(PathAccess::ReadWrite),
                PathAccess::ReadOnly => best = Some(PathAccess::ReadOnly),
            }
        }
        best
    }

    /// All entries, in insertion order
    pub fn entries(&self) -> Vec<AllowedPath> {
        self.entries.iter().map(|e| e.allowed.clone()).collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AllowedPathRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowedPathRegistry")
            .field("base_dir", &self.base_dir)
            .field("entries", &self.entries())
            .finish()
    }
}

fn is_glob(value: &str) -> bool {
    value.contains(['*', '?', '['])
}

/// Expand `~`, join relative paths onto `base` and clean `.`/`..` lexically
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let expanded = expand_home(path);
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push("/");
    }
    cleaned
}

/// Resolve a root directory (workspace, tracker base) to an absolute path
///
/// Relative roots are joined onto the current directory, never onto `/`.
pub fn resolve_root(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(resolve_path(path, path));
    }
    let cwd = std::env::current_dir()?;
    Ok(resolve_path(path, &cwd))
}

/// Like [`resolve_root`], keeping `path` unchanged if the current directory is unavailable
pub(crate) fn resolve_root_or_keep(path: &Path) -> PathBuf {
    resolve_root(path).unwrap_or_else(|e| {
        tracing::warn!(
            "[Permissions] Cannot resolve {} against the current directory: {}",
            path.display(),
            e
        );
        path.to_path_buf()
    })
}

/// Resolve a path to its absolute, cleaned and symlink-resolved form
///
/// The longest existing ancestor is canonicalized and the non-existent
/// remainder is appended, so paths that do not exist yet (files about to be
/// created) resolve consistently with existing ones.
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    let cleaned = absolutize(path, base);

    let mut existing = cleaned.as_path();
    let mut remainder = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in remainder.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => return cleaned,
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absolutize_cleans_components() {
        let base = Path::new("/work/project");
        assert_eq!(
            absolutize(Path::new("src/../lib/./mod.rs"), base),
            PathBuf::from("/work/project/lib/mod.rs")
        );
        assert_eq!(absolutize(Path::new("/a/b/../../.."), base), PathBuf::from("/"));
    }

    #[test]
    fn test_prefix_matching_is_per_segment() {
        let dir = TempDir::new().unwrap();
        let mut registry = AllowedPathRegistry::new(dir.path());
        registry.add(dir.path().join("app"), PathAccess::ReadWrite);

        assert!(registry.is_allowed(dir.path().join("app"), PathAccess::ReadWrite));
        assert!(registry.is_allowed(dir.path().join("app/src/main.rs"), PathAccess::ReadWrite));
        assert!(!registry.is_allowed(dir.path().join("application"), PathAccess::ReadOnly));
        assert!(!registry.is_allowed(dir.path().join("app/../secret"), PathAccess::ReadOnly));
    }

    #[test]
    fn test_access_levels() {
        let dir = TempDir::new().unwrap();
        let mut registry = AllowedPathRegistry::new(dir.path());
        registry.add("docs", PathAccess::ReadOnly);

        assert!(registry.is_allowed("docs/readme.md", PathAccess::ReadOnly));
        assert!(!registry.is_allowed("docs/readme.md", PathAccess::ReadWrite));

        registry.add("docs/drafts", PathAccess::ReadWrite);
        assert_eq!(
            registry.access_for("docs/drafts/a.md"),
            Some(PathAccess::ReadWrite)
        );
        assert_eq!(registry.access_for("other"), None);
    }

    #[test]
    fn test_duplicates_rejected() {
        let dir = TempDir::new().unwrap();
        let mut registry = AllowedPathRegistry::new(dir.path());
        assert!(registry.add("data", PathAccess::ReadOnly));
        assert!(!registry.add("./data", PathAccess::ReadOnly));
        assert!(registry.add("data", PathAccess::ReadWrite));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_glob_entries() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut registry = AllowedPathRegistry::new(&root);
        registry.add(root.join("*.log"), PathAccess::ReadWrite);

        assert!(registry.is_allowed(root.join("build.log"), PathAccess::ReadWrite));
        assert!(!registry.is_allowed(root.join("build.txt"), PathAccess::ReadOnly));
    }

    #[test]
    fn test_resolve_nonexistent_under_existing() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve_path(Path::new("new/file.txt"), dir.path());
        let canonical_dir = dir.path().canonicalize().unwrap();
        assert_eq!(resolved, canonical_dir.join("new/file.txt"));
    }

    #[test]
    fn test_resolve_root_uses_current_dir() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        assert_eq!(resolve_root(Path::new(".")).unwrap(), cwd);
        assert_eq!(resolve_root(Path::new("src")).unwrap(), cwd.join("src"));

        let registry = AllowedPathRegistry::new(".");
        assert_eq!(registry.base_dir(), cwd.as_path());
    }

    #[test]
    fn test_parse_access() {
        assert_eq!(PathAccess::parse("read_only"), Some(PathAccess::ReadOnly));
        assert_eq!(PathAccess::parse("RW"), Some(PathAccess::ReadWrite));
        assert_eq!(PathAccess::parse("execute"), None);
    }
}
