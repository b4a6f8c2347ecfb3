//! Transactional JSON-file store.

use crate::error::StoreError;
use crate::format::{Database, GroupRecord, JoinRow, TokenRecord};
use async_trait::async_trait;
use opsbot_core::validation::{
    MEMBERS_PRESENT_MESSAGE, ROLES_GRANTED_MESSAGE, UNIQUE_NAME_MESSAGE,
};
use opsbot_core::{
    Action, AssociationError, Associations, Changeset, Constraint, Group, Link, ValidationErrors,
    ADMIN_GROUP, ADMIN_ROLE,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Persistent store for groups, their join relations and the migration table.
///
/// Every mutation runs as one transaction: the state is cloned, changed,
/// checked against commit-time constraints, written to disk and only then
/// made visible. A failed transaction leaves both memory and disk untouched.
pub struct GroupStore {
    path: Option<PathBuf>,
    state: Mutex<Database>,
}

impl GroupStore {
    /// Open (or create on first write) the store file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            serde_json::from_str(&content).map_err(|e| {
                StoreError::InvalidFormat(format!("{}: {e}", path.display()))
            })?
        } else {
            Database::default()
        };
        tracing::debug!(path = %path.display(), groups = state.groups.len(), "opened store");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// A store that never touches disk (for tests and the `test` adapter).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Database::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn transaction<T>(
        &self,
        apply: impl FnOnce(&mut Database) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = apply(&mut next)?;
        if next != *guard {
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(out)
    }

    async fn read<T>(&self, view: impl FnOnce(&Database) -> T) -> T {
        let guard = self.state.lock().await;
        view(&guard)
    }

    async fn persist(&self, db: &Database) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(db)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Write the current state to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let guard = self.state.lock().await;
        self.persist(&guard).await
    }

    /// Commit a changeset built by the group model.
    ///
    /// Returns the group as stored (for deletes, as it was before removal).
    pub async fn commit(&self, changeset: &Changeset) -> Result<Group, StoreError> {
        if !changeset.is_valid() {
            return Err(StoreError::Invalid(changeset.errors().clone()));
        }
        let result = self
            .transaction(|db| match changeset.action() {
                Action::Insert => insert_group(db, changeset),
                Action::Update => update_group(db, changeset),
                Action::Delete => delete_group(db, changeset),
            })
            .await;
        match &result {
            Ok(group) => {
                tracing::info!(action = ?changeset.action(), group = %group.name, id = %group.id, "group committed")
            }
            Err(err) => {
                tracing::debug!(action = ?changeset.action(), error = %err, "group commit rejected")
            }
        }
        result
    }

    pub async fn get_group(&self, id: &str) -> Result<Group, StoreError> {
        self.read(|db| {
            db.groups
                .get(id)
                .map(|record| db.load_group(record))
                .ok_or_else(|| StoreError::not_found("group", id))
        })
        .await
    }

    pub async fn get_group_by_name(&self, name: &str) -> Result<Group, StoreError> {
        self.read(|db| {
            db.find_group_by_name(name)
                .map(|record| db.load_group(record))
                .ok_or_else(|| StoreError::not_found("group", name))
        })
        .await
    }

    /// All groups ordered by name.
    pub async fn list_groups(&self) -> Vec<Group> {
        self.read(|db| {
            let mut groups: Vec<Group> = db.groups.values().map(|r| db.load_group(r)).collect();
            groups.sort_by(|a, b| a.name.cmp(&b.name));
            groups
        })
        .await
    }

    /// Register a role name. Returns `false` if it already existed.
    pub async fn create_role(&self, name: &str) -> Result<bool, StoreError> {
        self.transaction(|db| Ok(db.roles.insert(name.to_string())))
            .await
    }

    /// Register a user name. Returns `false` if it already existed.
    pub async fn create_user(&self, name: &str) -> Result<bool, StoreError> {
        self.transaction(|db| Ok(db.users.insert(name.to_string())))
            .await
    }

    pub async fn role_names(&self) -> Vec<String> {
        self.read(|db| db.roles.iter().cloned().collect()).await
    }

    /// Issue a token for `user` expiring `ttl_secs` after `now`.
    pub async fn issue_token(&self, user: &str, ttl_secs: u64, now: u64) -> Result<String, StoreError> {
        let token = ulid::Ulid::new().to_string();
        self.transaction(|db| {
            if !db.users.contains(user) {
                return Err(StoreError::not_found("user", user));
            }
            db.tokens.insert(
                token.clone(),
                TokenRecord {
                    user: user.to_string(),
                    expires_at: now.saturating_add(ttl_secs),
                },
            );
            Ok(())
        })
        .await?;
        Ok(token)
    }

    pub async fn token_count(&self) -> usize {
        self.read(|db| db.tokens.len()).await
    }

    /// Delete tokens whose expiry is at or before `now`. Returns how many.
    pub async fn reap_expired_tokens(&self, now: u64) -> Result<usize, StoreError> {
        self.transaction(|db| {
            let before = db.tokens.len();
            db.tokens.retain(|_, record| record.expires_at > now);
            Ok(before - db.tokens.len())
        })
        .await
    }

    /// Mark `version` applied in `namespace`. Returns `false` if it already was.
    pub async fn record_migration(&self, namespace: &str, version: u64) -> Result<bool, StoreError> {
        self.transaction(|db| {
            Ok(db
                .schema_migrations
                .entry(namespace.to_string())
                .or_default()
                .insert(version))
        })
        .await
    }

    /// Highest applied version in `namespace`, or 0 when none.
    pub async fn applied_version(&self, namespace: &str) -> u64 {
        self.read(|db| db.applied_version(namespace)).await
    }

    /// Make sure the admin role, the admin group and their grant exist.
    pub async fn ensure_admin(&self) -> Result<Group, StoreError> {
        let group = self
            .transaction(|db| {
                db.roles.insert(ADMIN_ROLE.to_string());
                let id = match db.find_group_by_name(ADMIN_GROUP) {
                    Some(record) => record.id.clone(),
                    None => {
                        let id = ulid::Ulid::new().to_string();
                        db.groups.insert(
                            id.clone(),
                            GroupRecord {
                                id: id.clone(),
                                name: ADMIN_GROUP.to_string(),
                            },
                        );
                        id
                    }
                };
                db.role_grants.insert(JoinRow::new(&id, ADMIN_ROLE));
                let record = db
                    .groups
                    .get(&id)
                    .ok_or_else(|| StoreError::not_found("group", ADMIN_GROUP))?;
                Ok(db.load_group(record))
            })
            .await?;
        tracing::debug!(id = %group.id, "admin group present");
        Ok(group)
    }
}

fn ensure_unique_name(db: &Database, name: &str, own_id: Option<&str>) -> Result<(), StoreError> {
    match db.find_group_by_name(name) {
        Some(existing) if Some(existing.id.as_str()) != own_id => Err(StoreError::Invalid(
            ValidationErrors::single("name", UNIQUE_NAME_MESSAGE),
        )),
        _ => Ok(()),
    }
}

fn insert_group(db: &mut Database, changeset: &Changeset) -> Result<Group, StoreError> {
    let mut group = changeset.apply();
    if changeset.has_constraint(Constraint::UniqueName) {
        ensure_unique_name(db, &group.name, None)?;
    }
    group.id = ulid::Ulid::new().to_string();
    db.groups.insert(
        group.id.clone(),
        GroupRecord {
            id: group.id.clone(),
            name: group.name.clone(),
        },
    );
    Ok(db.load_group(&db.groups[&group.id]))
}

fn update_group(db: &mut Database, changeset: &Changeset) -> Result<Group, StoreError> {
    let group = changeset.apply();
    if !db.groups.contains_key(&group.id) {
        return Err(StoreError::not_found("group", &group.id));
    }
    if changeset.has_constraint(Constraint::UniqueName) {
        ensure_unique_name(db, &group.name, Some(&group.id))?;
    }
    let record = db
        .groups
        .get_mut(&group.id)
        .ok_or_else(|| StoreError::not_found("group", &group.id))?;
    record.name = group.name;
    let record = record.clone();
    Ok(db.load_group(&record))
}

fn delete_group(db: &mut Database, changeset: &Changeset) -> Result<Group, StoreError> {
    let id = &changeset.data().id;
    let record = db
        .groups
        .get(id)
        .cloned()
        .ok_or_else(|| StoreError::not_found("group", id))?;

    let mut errors = ValidationErrors::new();
    if changeset.has_constraint(Constraint::NoRoleGrants) && db.role_grant_count(id) > 0 {
        errors.add("roles", ROLES_GRANTED_MESSAGE);
    }
    if changeset.has_constraint(Constraint::NoMemberships) && db.membership_count(id) > 0 {
        errors.add("users", MEMBERS_PRESENT_MESSAGE);
    }
    if !errors.is_empty() {
        return Err(StoreError::Invalid(errors));
    }

    let group = db.load_group(&record);
    db.groups.remove(id);
    Ok(group)
}

fn check_link_targets(db: &Database, link: &Link) -> Result<JoinRow, StoreError> {
    let (group_id, principal, entity, known) = match link {
        Link::RoleGrant { group_id, role } => (group_id, role, "role", &db.roles),
        Link::Membership { group_id, user } => (group_id, user, "user", &db.users),
    };
    if !db.groups.contains_key(group_id) {
        return Err(StoreError::not_found("group", group_id));
    }
    if !known.contains(principal) {
        return Err(StoreError::not_found(entity, principal));
    }
    Ok(JoinRow::new(group_id, principal))
}

fn relation<'a>(db: &'a mut Database, link: &Link) -> &'a mut std::collections::BTreeSet<JoinRow> {
    match link {
        Link::RoleGrant { .. } => &mut db.role_grants,
        Link::Membership { .. } => &mut db.memberships,
    }
}

#[async_trait]
impl Associations for GroupStore {
    async fn associate(&self, link: &Link) -> Result<bool, AssociationError> {
        let created = self
            .transaction(|db| {
                let row = check_link_targets(db, link)?;
                Ok(relation(db, link).insert(row))
            })
            .await?;
        tracing::debug!(?link, created, "associate");
        Ok(created)
    }

    async fn dissociate(&self, link: &Link) -> Result<bool, AssociationError> {
        let removed = self
            .transaction(|db| {
                let row = check_link_targets(db, link)?;
                Ok(relation(db, link).remove(&row))
            })
            .await?;
        tracing::debug!(?link, removed, "dissociate");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsbot_core::{Grantable, GroupParams, GrantError};
    use tempfile::TempDir;

    async fn create(store: &GroupStore, name: &str) -> Result<Group, StoreError> {
        let changeset = Group::blank().validate_for_create_or_update(Some(&GroupParams::named(name)));
        store.commit(&changeset).await
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let store = GroupStore::in_memory();
        let ops = create(&store, "ops").await.unwrap();
        assert!(ops.is_persisted());
        assert_eq!(store.get_group(&ops.id).await.unwrap().name, "ops");
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_at_commit() {
        let store = GroupStore::in_memory();
        create(&store, "ops").await.unwrap();

        let err = create(&store, "ops").await.unwrap_err();
        let errors = err.validation().unwrap();
        assert!(errors.contains("name", UNIQUE_NAME_MESSAGE));
        assert_eq!(store.list_groups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_changeset_never_reaches_the_store() {
        let store = GroupStore::in_memory();
        let changeset = Group::blank().validate_for_create_or_update(None);
        let err = store.commit(&changeset).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.list_groups().await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_to_own_name_is_not_a_conflict() {
        let store = GroupStore::in_memory();
        let ops = create(&store, "ops").await.unwrap();
        let changeset = ops.validate_for_create_or_update(Some(&GroupParams::named("ops")));
        assert_eq!(store.commit(&changeset).await.unwrap().name, "ops");
    }

    #[tokio::test]
    async fn test_delete_rechecks_live_join_rows() {
        let store = GroupStore::in_memory();
        store.create_user("alice").await.unwrap();
        let mut ops = create(&store, "ops").await.unwrap();

        // A stale candidate validates, but the member added since blocks commit.
        let stale = ops.validate_for_delete();
        assert!(stale.is_valid());
        ops.add_member(&store, "alice").await.unwrap();

        let err = store.commit(&stale).await.unwrap_err();
        assert!(err.validation().unwrap().contains("users", MEMBERS_PRESENT_MESSAGE));

        ops.remove_member(&store, "alice").await.unwrap();
        store.commit(&ops.validate_for_delete()).await.unwrap();
        assert!(store.get_group_by_name("ops").await.is_err());
    }

    #[tokio::test]
    async fn test_associate_requires_known_principal() {
        let store = GroupStore::in_memory();
        let mut ops = create(&store, "ops").await.unwrap();

        let err = ops.grant(&store, "deploy").await.unwrap_err();
        assert!(matches!(
            err,
            GrantError::Association(AssociationError::NotFound { entity: "role", .. })
        ));

        store.create_role("deploy").await.unwrap();
        ops.grant(&store, "deploy").await.unwrap();
        assert!(store.get_group(&ops.id).await.unwrap().has_role("deploy"));
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let store = GroupStore::in_memory();
        let first = store.ensure_admin().await.unwrap();
        let second = store.ensure_admin().await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.has_role(ADMIN_ROLE));
        assert_eq!(store.list_groups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_token_reaping() {
        let store = GroupStore::in_memory();
        store.create_user("alice").await.unwrap();
        store.issue_token("alice", 10, 100).await.unwrap();
        store.issue_token("alice", 100, 100).await.unwrap();

        assert_eq!(store.reap_expired_tokens(110).await.unwrap(), 1);
        assert_eq!(store.token_count().await, 1);
        assert!(store.issue_token("bob", 10, 100).await.is_err());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("store.json");

        let store = GroupStore::open(&path).await.unwrap();
        store.create_role("deploy").await.unwrap();
        let mut ops = create(&store, "ops").await.unwrap();
        ops.grant(&store, "deploy").await.unwrap();
        store.record_migration("opsbot", 20160101).await.unwrap();
        drop(store);

        let reopened = GroupStore::open(&path).await.unwrap();
        let ops = reopened.get_group_by_name("ops").await.unwrap();
        assert!(ops.has_role("deploy"));
        assert_eq!(reopened.applied_version("opsbot").await, 20160101);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = GroupStore::open(&path).await.err().unwrap();
        assert!(matches!(err, StoreError::InvalidFormat(_)));
    }

    #[test]
    fn test_record_migration_reports_duplicates() {
        let store = GroupStore::in_memory();
        tokio_test::block_on(async {
            assert!(store.record_migration("opsbot", 1).await.unwrap());
            assert!(!store.record_migration("opsbot", 1).await.unwrap());
            assert_eq!(store.applied_version("opsbot").await, 1);
        });
    }
}
