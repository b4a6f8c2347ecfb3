//! Grant/revoke protocol over join relations.

use crate::group::Group;
use crate::permission::is_permanent_grant;
use async_trait::async_trait;

/// One row in a many-to-many join relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Link {
    /// `role` is granted to the group.
    RoleGrant { group_id: String, role: String },
    /// `user` is a member of the group.
    Membership { group_id: String, user: String },
}

/// Errors raised by the persistence layer's join primitive.
#[derive(Debug, thiserror::Error)]
pub enum AssociationError {
    #[error("{entity} '{name}' does not exist")]
    NotFound { entity: &'static str, name: String },

    #[error("Association backend error: {0}")]
    Backend(String),
}

/// The associate/dissociate primitive provided by the persistence layer.
#[async_trait]
pub trait Associations: Send + Sync {
    /// Create the join row. Returns `false` when it already existed.
    async fn associate(&self, link: &Link) -> Result<bool, AssociationError>;

    /// Remove the join row. Returns `false` when there was nothing to remove.
    async fn dissociate(&self, link: &Link) -> Result<bool, AssociationError>;
}

/// Errors from [`Grantable`] operations.
#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("Role '{role}' is permanently granted to group '{group}' and cannot be revoked")]
    PermanentGrant { group: String, role: String },

    #[error("Group '{0}' has not been saved")]
    Unsaved(String),

    #[error(transparent)]
    Association(#[from] AssociationError),
}

/// An entity that roles can be granted to.
#[async_trait]
pub trait Grantable: Send {
    /// Grant `role`. Granting a role already held succeeds without change.
    async fn grant(&mut self, store: &dyn Associations, role: &str) -> Result<(), GrantError>;

    /// Revoke `role`.
    async fn revoke(&mut self, store: &dyn Associations, role: &str) -> Result<(), GrantError>;
}

impl Group {
    fn require_persisted(&self) -> Result<&str, GrantError> {
        if self.is_persisted() {
            Ok(&self.id)
        } else {
            Err(GrantError::Unsaved(self.name.clone()))
        }
    }

    pub async fn add_member(
        &mut self,
        store: &dyn Associations,
        user: &str,
    ) -> Result<(), GrantError> {
        let link = Link::Membership {
            group_id: self.require_persisted()?.to_string(),
            user: user.to_string(),
        };
        store.associate(&link).await?;
        self.users.insert(user.to_string());
        Ok(())
    }

    pub async fn remove_member(
        &mut self,
        store: &dyn Associations,
        user: &str,
    ) -> Result<(), GrantError> {
        let link = Link::Membership {
            group_id: self.require_persisted()?.to_string(),
            user: user.to_string(),
        };
        store.dissociate(&link).await?;
        self.users.remove(user);
        Ok(())
    }
}

#[async_trait]
impl Grantable for Group {
    async fn grant(&mut self, store: &dyn Associations, role: &str) -> Result<(), GrantError> {
        let link = Link::RoleGrant {
            group_id: self.require_persisted()?.to_string(),
            role: role.to_string(),
        };
        let created = store.associate(&link).await?;
        if !created {
            tracing::debug!(group = %self.name, role, "role already granted");
        }
        self.roles.insert(role.to_string());
        Ok(())
    }

    async fn revoke(&mut self, store: &dyn Associations, role: &str) -> Result<(), GrantError> {
        if is_permanent_grant(&self.name, role) {
            return Err(GrantError::PermanentGrant {
                group: self.name.clone(),
                role: role.to_string(),
            });
        }
        let link = Link::RoleGrant {
            group_id: self.require_persisted()?.to_string(),
            role: role.to_string(),
        };
        store.dissociate(&link).await?;
        self.roles.remove(role);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{ADMIN_GROUP, ADMIN_ROLE};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLinks {
        rows: Mutex<HashSet<Link>>,
    }

    #[async_trait]
    impl Associations for MemoryLinks {
        async fn associate(&self, link: &Link) -> Result<bool, AssociationError> {
            Ok(self.rows.lock().unwrap().insert(link.clone()))
        }

        async fn dissociate(&self, link: &Link) -> Result<bool, AssociationError> {
            Ok(self.rows.lock().unwrap().remove(link))
        }
    }

    fn group(name: &str) -> Group {
        Group {
            id: format!("id-{name}"),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_grant_then_revoke() {
        let links = MemoryLinks::default();
        let mut ops = group("ops");

        ops.grant(&links, "deploy").await.unwrap();
        assert!(ops.has_role("deploy"));
        assert_eq!(links.rows.lock().unwrap().len(), 1);

        ops.revoke(&links, "deploy").await.unwrap();
        assert!(!ops.has_role("deploy"));
        assert!(links.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_regrant_is_a_no_op() {
        let links = MemoryLinks::default();
        let mut ops = group("ops");

        ops.grant(&links, "deploy").await.unwrap();
        ops.grant(&links, "deploy").await.unwrap();
        assert_eq!(ops.roles.len(), 1);
        assert_eq!(links.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_role_cannot_be_revoked_from_admin_group() {
        let links = MemoryLinks::default();
        let mut admin = group(ADMIN_GROUP);

        // Fails with or without a prior grant.
        let err = admin.revoke(&links, ADMIN_ROLE).await.unwrap_err();
        assert!(matches!(err, GrantError::PermanentGrant { .. }));

        admin.grant(&links, ADMIN_ROLE).await.unwrap();
        let err = admin.revoke(&links, ADMIN_ROLE).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains(ADMIN_GROUP));
        assert!(message.contains(ADMIN_ROLE));
        assert!(admin.has_role(ADMIN_ROLE));
        assert_eq!(links.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_roles_can_be_revoked_from_admin_group() {
        let links = MemoryLinks::default();
        let mut admin = group(ADMIN_GROUP);
        admin.grant(&links, "deploy").await.unwrap();
        admin.revoke(&links, "deploy").await.unwrap();
        assert!(!admin.has_role("deploy"));
    }

    #[tokio::test]
    async fn test_unsaved_group_cannot_grant() {
        let links = MemoryLinks::default();
        let mut draft = Group::blank();
        let err = draft.grant(&links, "deploy").await.unwrap_err();
        assert!(matches!(err, GrantError::Unsaved(_)));
    }

    #[tokio::test]
    async fn test_membership_round_trip() {
        let links = MemoryLinks::default();
        let mut ops = group("ops");
        ops.add_member(&links, "alice").await.unwrap();
        assert!(ops.has_member("alice"));
        ops.remove_member(&links, "alice").await.unwrap();
        assert!(!ops.has_member("alice"));
    }
}
