//! Redaction helpers shared by the plugin network proxy and the secrets store.

/// Replacement text used wherever a value is withheld from an untrusted caller.
pub const REDACTED: &str = "REDACTED";

/// Case-insensitively matches a header name against a configured redaction list.
#[must_use]
pub fn header_is_redacted(name: &str, redact_list: &[String]) -> bool {
    redact_list.iter().any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Matches a secret name against a glob permission pattern where `*` may
/// appear only as a trailing wildcard (e.g. `deploy.*` matches `deploy.prod`
/// and `deploy.` but not `other.deploy.prod`).
#[must_use]
pub fn glob_suffix_match(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_redaction_is_case_insensitive() {
        let list = vec!["Authorization".to_string()];
        assert!(header_is_redacted("authorization", &list));
        assert!(!header_is_redacted("content-type", &list));
    }

    #[test]
    fn glob_suffix_matches_prefix_only() {
        assert!(glob_suffix_match("deploy.*", "deploy.prod"));
        assert!(!glob_suffix_match("deploy.*", "other.deploy.prod"));
        assert!(glob_suffix_match("deploy.prod", "deploy.prod"));
        assert!(!glob_suffix_match("deploy.prod", "deploy.staging"));
    }
}
