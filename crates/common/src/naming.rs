//! Name normalization helpers shared by discovery and artifact synthesis.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Characters outside the safe name alphabet (lowercase alphanumerics, `-`, `.`).
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9.-]+").unwrap());

/// Runs of two or more dashes left behind by sanitizing.
static DASH_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Unit-name suffixes recognized when deriving display names.
const UNIT_SUFFIXES: &[&str] = &[
    ".service",
    ".container",
    ".pod",
    ".kube",
    ".volume",
    ".network",
    ".socket",
    ".timer",
    ".target",
];

/// Sanitize an arbitrary string into a safe slug: lowercase alphanumerics,
/// `-` and `.` only, dash runs collapsed, edges trimmed.
pub fn sanitize_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let replaced = UNSAFE_CHARS.replace_all(&lowered, "-");
    let collapsed = DASH_RUNS.replace_all(&replaced, "-");
    collapsed.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Derive a human-facing name from a systemd unit name: the recognized unit
/// suffix and any `@instance` qualifier are stripped.
pub fn unit_display_name(unit_name: &str) -> String {
    let mut name = unit_name;
    for suffix in UNIT_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped;
            break;
        }
    }
    match name.split_once('@') {
        Some((base, _)) if !base.is_empty() => base.to_string(),
        _ => name.to_string(),
    }
}

/// Reserve a name in `taken`, suffixing `-2`, `-3`, ... until unique.
pub fn unique_name(candidate: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(candidate.to_string()) {
        return candidate.to_string();
    }
    let mut n = 2;
    loop {
        let attempt = format!("{}-{}", candidate, n);
        if taken.insert(attempt.clone()) {
            return attempt;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("My App_v2!"), "my-app-v2");
        assert_eq!(sanitize_name("  web--stack  "), "web-stack");
        assert_eq!(sanitize_name("web.pod"), "web.pod");
        assert_eq!(sanitize_name("--.--"), "");
    }

    #[test]
    fn test_unit_display_name() {
        assert_eq!(unit_display_name("web.container"), "web");
        assert_eq!(unit_display_name("redis@6379.service"), "redis");
        assert_eq!(unit_display_name("foo.bar.service"), "foo.bar");
        assert_eq!(unit_display_name("plain"), "plain");
    }

    #[test]
    fn test_unique_name_suffixes() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("web", &mut taken), "web");
        assert_eq!(unique_name("web", &mut taken), "web-2");
        assert_eq!(unique_name("web", &mut taken), "web-3");
        assert_eq!(unique_name("db", &mut taken), "db");
    }
}
