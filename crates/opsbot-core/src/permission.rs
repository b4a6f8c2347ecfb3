//! Distinguished authorization identifiers.
//!
//! Every comparison against the admin group or admin role goes through these
//! constants; no other literal for either name exists in the workspace.

/// Name of the group that administers opsbot itself.
pub const ADMIN_GROUP: &str = "opsbot-admin";

/// Name of the role that is permanently granted to [`ADMIN_GROUP`].
pub const ADMIN_ROLE: &str = "opsbot-admin";

/// Whether `name` is the protected admin group.
pub fn is_admin_group(name: &str) -> bool {
    name == ADMIN_GROUP
}

/// Whether the `role` grant on `group` may never be revoked.
pub fn is_permanent_grant(group: &str, role: &str) -> bool {
    is_admin_group(group) && role == ADMIN_ROLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_grant_matrix() {
        assert!(is_permanent_grant(ADMIN_GROUP, ADMIN_ROLE));
        assert!(!is_permanent_grant(ADMIN_GROUP, "deploy"));
        assert!(!is_permanent_grant("ops", ADMIN_ROLE));
        assert!(!is_permanent_grant("ops", "deploy"));
    }

    #[test]
    fn test_admin_group_match_is_exact() {
        assert!(is_admin_group("opsbot-admin"));
        assert!(!is_admin_group("OPSBOT-ADMIN"));
        assert!(!is_admin_group("opsbot-admin "));
    }
}
