//! Domain and command matchers
//!
//! Domains are normalized (scheme, credentials, port and path stripped,
//! lowercased) before comparison. `*.example.com` matches any subdomain of
//! `example.com` but not `example.com` itself.
//!
//! Command prefixes match on whole tokens. Compound commands are split on
//! shell control operators and every segment must match a prefix; commands
//! containing substitutions are never prefix-approved.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{GuardError, GuardResult};

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$")
        .expect("domain regex is valid")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Tools whose second token is a subcommand worth including in a suggested prefix
const SUBCOMMAND_TOOLS: &[&str] = &[
    "cargo", "git", "go", "npm", "pnpm", "yarn", "docker", "kubectl", "pip", "pip3", "uv",
    "poetry", "make", "bun", "deno", "dotnet", "gradle", "mvn", "rustup",
];

// ============================================================================
// Domains
// ============================================================================

/// Normalize a domain or URL to a bare lowercase host name
pub fn normalize_domain(input: &str) -> String {
    let mut host = input.trim().to_ascii_lowercase();

    if let Some(idx) = host.find("://") {
        host = host[idx + 3..].to_string();
    }
    if let Some(idx) = host.find(['/', '?', '#']) {
        host.truncate(idx);
    }
    if let Some(idx) = host.rfind('@') {
        host = host[idx + 1..].to_string();
    }
    if let Some(idx) = host.rfind(':') {
        if host[idx + 1..].chars().all(|c| c.is_ascii_digit()) {
            host.truncate(idx);
        }
    }

    host.trim_end_matches('.').to_string()
}

/// An allow-listed domain entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DomainPattern {
    /// Matches exactly this host
    Exact(String),
    /// `*.suffix`: matches any strict subdomain of `suffix`
    Wildcard(String),
}

impl DomainPattern {
    /// Parse `example.com` or `*.example.com`
    pub fn parse(pattern: &str) -> GuardResult<Self> {
        let trimmed = pattern.trim();
        let (wildcard, rest) = match trimmed.strip_prefix("*.") {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let host = normalize_domain(rest);
        if host.is_empty() || !DOMAIN_RE.is_match(&host) {
            return Err(GuardError::invalid_input(format!(
                "invalid domain pattern: {}",
                pattern
            )));
        }

        Ok(if wildcard {
            DomainPattern::Wildcard(host)
        } else {
            DomainPattern::Exact(host)
        })
    }

    /// Whether a normalized host matches this pattern
    pub fn matches(&self, host: &str) -> bool {
        match self {
            DomainPattern::Exact(exact) => host == exact,
            DomainPattern::Wildcard(suffix) => host
                .strip_suffix(suffix.as_str())
                .map(|head| head.len() > 1 && head.ends_with('.'))
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainPattern::Exact(host) => write!(f, "{}", host),
            DomainPattern::Wildcard(suffix) => write!(f, "*.{}", suffix),
        }
    }
}

impl TryFrom<String> for DomainPattern {
    type Error = GuardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DomainPattern::parse(&value)
    }
}

impl From<DomainPattern> for String {
    fn from(pattern: DomainPattern) -> Self {
        pattern.to_string()
    }
}

/// Whether `domain` (host name or URL) is covered by any of `patterns`
pub fn is_domain_authorized(domain: &str, patterns: &[DomainPattern]) -> bool {
    let host = normalize_domain(domain);
    if host.is_empty() {
        return false;
    }
    patterns.iter().any(|p| p.matches(&host))
}

// ============================================================================
// Commands
// ============================================================================

/// Trim and collapse internal whitespace
pub fn normalize_command(command: &str) -> String {
    WHITESPACE_RE.replace_all(command.trim(), " ").into_owned()
}

/// Whether the command contains command or process substitution
fn has_substitution(command: &str) -> bool {
    command.contains("$(") || command.contains('`') || command.contains("<(") || command.contains(">(")
}

/// Split a command line into segments separated by `;`, `&&`, `||`, `|`, `&` or newlines
///
/// Operators inside single or double quotes are not treated as separators.
pub fn split_command_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                ';' | '\n' | '|' | '&' => {
                    if matches!(c, '|' | '&') && chars.peek() == Some(&c) {
                        chars.next();
                    }
                    segments.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .map(|s| normalize_command(&s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Whether a single segment starts with `prefix` on a token boundary
fn segment_matches(segment: &str, prefix: &str) -> bool {
    let prefix = normalize_command(prefix);
    if prefix.is_empty() {
        return false;
    }
    match segment.strip_prefix(prefix.as_str()) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

/// Whether every segment of `command` matches one of `prefixes`
pub fn is_command_authorized(command: &str, prefixes: &[String]) -> bool {
    if has_substitution(command) {
        return false;
    }
    let segments = split_command_segments(command);
    !segments.is_empty()
        && segments
            .iter()
            .all(|segment| prefixes.iter().any(|p| segment_matches(segment, p)))
}

/// Suggest a reusable prefix for "always allow" prompts
///
/// Returns the first token, plus the subcommand for well-known multi-command tools
/// (`git status`, `cargo test`).
pub fn suggest_command_prefix(command: &str) -> String {
    let first_segment = split_command_segments(command)
        .into_iter()
        .next()
        .unwrap_or_default();
    let mut tokens = first_segment.split(' ');

    let Some(program) = tokens.next() else {
        return String::new();
    };
    let base = program.rsplit('/').next().unwrap_or(program);

    match tokens.next() {
        Some(sub)
            if SUBCOMMAND_TOOLS.contains(&base)
                && !sub.starts_with('-')
                && sub.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            format!("{} {}", program, sub)
        }
        _ => program.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("API.Example.com"), "api.example.com");
        assert_eq!(normalize_domain("https://api.example.com/v1?q=1"), "api.example.com");
        assert_eq!(normalize_domain("user:pw@example.com:8443"), "example.com");
        assert_eq!(normalize_domain("example.com."), "example.com");
    }

    #[test]
    fn test_wildcard_domain() {
        let patterns = vec![DomainPattern::parse("*.foo.com").unwrap()];

        assert!(is_domain_authorized("api.foo.com", &patterns));
        assert!(is_domain_authorized("a.b.foo.com", &patterns));
        assert!(!is_domain_authorized("foo.com.evil.com", &patterns));
        assert!(!is_domain_authorized("evilfoo.com", &patterns));
        assert!(!is_domain_authorized("foo.com", &patterns));
    }

    #[test]
    fn test_exact_domain() {
        let patterns = vec![DomainPattern::parse("pkg.go.dev").unwrap()];

        assert!(is_domain_authorized("https://pkg.go.dev/std", &patterns));
        assert!(!is_domain_authorized("go.dev", &patterns));
        assert!(!is_domain_authorized("", &patterns));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(DomainPattern::parse("*").is_err());
        assert!(DomainPattern::parse("").is_err());
        assert!(DomainPattern::parse("bad domain.com").is_err());
    }

    #[test]
    fn test_domain_pattern_serde() {
        let pattern: DomainPattern = serde_json::from_str("\"*.Example.com\"").unwrap();
        assert_eq!(pattern, DomainPattern::Wildcard("example.com".into()));
        assert_eq!(serde_json::to_string(&pattern).unwrap(), "\"*.example.com\"");
    }

    #[test]
    fn test_command_prefix_token_boundary() {
        let prefixes = vec!["git status".to_string(), "ls".to_string()];

        assert!(is_command_authorized("git status", &prefixes));
        assert!(is_command_authorized("  git   status -s", &prefixes));
        assert!(is_command_authorized("ls -la", &prefixes));
        assert!(!is_command_authorized("git statusx", &prefixes));
        assert!(!is_command_authorized("lsof", &prefixes));
        assert!(!is_command_authorized("git push", &prefixes));
    }

    #[test]
    fn test_compound_commands_require_every_segment() {
        let prefixes = vec!["git status".to_string(), "ls".to_string()];

        assert!(is_command_authorized("git status && ls", &prefixes));
        assert!(!is_command_authorized("git status; rm -rf /", &prefixes));
        assert!(!is_command_authorized("ls | sh", &prefixes));
        assert!(!is_command_authorized("ls $(rm -rf /)", &prefixes));
        assert!(!is_command_authorized("ls `whoami`", &prefixes));
    }

    #[test]
    fn test_quoted_operators_do_not_split() {
        assert_eq!(
            split_command_segments("echo 'a; b' && ls"),
            vec!["echo 'a; b'".to_string(), "ls".to_string()]
        );
    }

    #[test]
    fn test_suggest_command_prefix() {
        assert_eq!(suggest_command_prefix("git status -s"), "git status");
        assert_eq!(suggest_command_prefix("cargo test --all"), "cargo test");
        assert_eq!(suggest_command_prefix("ls -la /tmp"), "ls");
        assert_eq!(suggest_command_prefix("git --no-pager log"), "git");
        assert_eq!(suggest_command_prefix("rm -rf build && make"), "rm");
        assert_eq!(suggest_command_prefix(""), "");
    }
}
