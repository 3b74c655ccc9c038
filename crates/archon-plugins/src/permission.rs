use std::time::SystemTime;

use archon_core::sanitize::glob_suffix_match;

use crate::manifest::{Permission, PermissionGrant};

/// The live, expiry-checked permission state for a single loaded plugin.
/// Declared manifest permissions are the ceiling; grants are what the user
/// actually approved (at install time, or per-run).
#[derive(Debug, Default)]
pub struct PermissionSet {
    grants: Vec<PermissionGrant>,
}

impl PermissionSet {
    pub fn new(grants: Vec<PermissionGrant>) -> Self {
        Self { grants }
    }

    /// Checks a plain (non-secrets) permission against the live grants.
    pub fn allows(&self, permission: &Permission, now: SystemTime) -> bool {
        self.grants.iter().any(|grant| grant.is_live(now) && &grant.permission == permission)
    }

    /// Checks a `secrets:<pattern>` grant against a concrete secret name.
    /// A plugin may hold several `secrets:*` grants; any live one whose
    /// pattern matches `name` is sufficient.
    pub fn allows_secret(&self, name: &str, now: SystemTime) -> bool {
        self.grants.iter().any(|grant| {
            grant.is_live(now)
                && match &grant.permission {
                    Permission::Secrets(pattern) => glob_suffix_match(pattern, name),
                    _ => false,
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn expired_grants_are_not_allowed() {
        let now = SystemTime::now();
        let grants = vec![PermissionGrant::until(Permission::Net, now - Duration::from_secs(1))];
        let set = PermissionSet::new(grants);
        assert!(!set.allows(&Permission::Net, now));
    }

    #[test]
    fn live_grants_are_allowed() {
        let now = SystemTime::now();
        let grants = vec![PermissionGrant::until(Permission::Net, now + Duration::from_secs(60))];
        let set = PermissionSet::new(grants);
        assert!(set.allows(&Permission::Net, now));
    }

    #[test]
    fn secret_pattern_scopes_access() {
        let now = SystemTime::now();
        let grants = vec![PermissionGrant::permanent(Permission::Secrets("deploy.*".to_string()))];
        let set = PermissionSet::new(grants);
        assert!(set.allows_secret("deploy.prod", now));
        assert!(!set.allows_secret("other.prod", now));
    }

    #[test]
    fn ungranted_permission_is_denied() {
        let set = PermissionSet::new(Vec::new());
        assert!(!set.allows(&Permission::ReadRepo, SystemTime::now()));
    }
}
