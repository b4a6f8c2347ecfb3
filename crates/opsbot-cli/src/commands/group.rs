//! `opsbot group|role|user`: permission group administration.

use crate::cli::{GroupAction, RoleAction};
use opsbot_core::{Grantable, Group, GroupParams};
use opsbot_store::{GroupStore, StoreError};

fn describe(err: StoreError) -> anyhow::Error {
    match err.validation() {
        Some(errors) => anyhow::anyhow!("{errors}"),
        None => err.into(),
    }
}

async fn find(store: &GroupStore, name: &str) -> anyhow::Result<Group> {
    store.get_group_by_name(name).await.map_err(describe)
}

/// Execute a group action. Returns the text to print.
pub async fn run(store: &GroupStore, action: GroupAction) -> anyhow::Result<String> {
    match action {
        GroupAction::Create { name } => {
            let changeset = Group::blank().validate_for_create_or_update(Some(&GroupParams::named(name)));
            let group = store.commit(&changeset).await.map_err(describe)?;
            Ok(format!("Created group '{}' ({})", group.name, group.id))
        }
        GroupAction::Rename { name, new_name } => {
            let group = find(store, &name).await?;
            let changeset = group.validate_for_create_or_update(Some(&GroupParams::named(new_name)));
            let renamed = store.commit(&changeset).await.map_err(describe)?;
            Ok(format!("Renamed group '{name}' to '{}'", renamed.name))
        }
        GroupAction::Delete { name } => {
            let group = find(store, &name).await?;
            let deleted = store
                .commit(&group.validate_for_delete())
                .await
                .map_err(describe)?;
            Ok(format!("Deleted group '{}'", deleted.name))
        }
        GroupAction::Grant { group, role } => {
            let mut target = find(store, &group).await?;
            target.grant(store, &role).await?;
            Ok(format!("Granted role '{role}' to group '{group}'"))
        }
        GroupAction::Revoke { group, role } => {
            let mut target = find(store, &group).await?;
            target.revoke(store, &role).await?;
            Ok(format!("Revoked role '{role}' from group '{group}'"))
        }
        GroupAction::AddMember { group, user } => {
            let mut target = find(store, &group).await?;
            target.add_member(store, &user).await?;
            Ok(format!("Added '{user}' to group '{group}'"))
        }
        GroupAction::RemoveMember { group, user } => {
            let mut target = find(store, &group).await?;
            target.remove_member(store, &user).await?;
            Ok(format!("Removed '{user}' from group '{group}'"))
        }
        GroupAction::Show { name } => {
            let group = find(store, &name).await?;
            Ok(serde_json::to_string_pretty(&group.external_view())?)
        }
        GroupAction::List => {
            let groups = store.list_groups().await;
            if groups.is_empty() {
                return Ok("No groups found.".to_string());
            }
            Ok(groups
                .iter()
                .map(|g| {
                    format!(
                        "{} | {} | {} roles | {} members",
                        g.id,
                        g.name,
                        g.roles.len(),
                        g.users.len()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}

pub async fn run_role(store: &GroupStore, action: RoleAction) -> anyhow::Result<String> {
    match action {
        RoleAction::Create { name } => {
            if store.create_role(&name).await? {
                Ok(format!("Created role '{name}'"))
            } else {
                Ok(format!("Role '{name}' already exists"))
            }
        }
        RoleAction::List => Ok(store.role_names().await.join("\n")),
    }
}

pub async fn create_user(store: &GroupStore, name: &str) -> anyhow::Result<String> {
    if store.create_user(name).await? {
        Ok(format!("Created user '{name}'"))
    } else {
        Ok(format!("User '{name}' already exists"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsbot_core::{ADMIN_GROUP, ADMIN_ROLE};

    async fn seeded() -> GroupStore {
        let store = GroupStore::in_memory();
        store.ensure_admin().await.unwrap();
        store.create_role("deploy").await.unwrap();
        store.create_user("alice").await.unwrap();
        store
    }

    fn create(name: &str) -> GroupAction {
        GroupAction::Create {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_grant_show() {
        let store = seeded().await;
        run(&store, create("ops")).await.unwrap();
        run(
            &store,
            GroupAction::Grant {
                group: "ops".to_string(),
                role: "deploy".to_string(),
            },
        )
        .await
        .unwrap();

        let shown = run(&store, GroupAction::Show { name: "ops".to_string() })
            .await
            .unwrap();
        let view: serde_json::Value = serde_json::from_str(&shown).unwrap();
        assert_eq!(view["name"], "ops");
        assert_eq!(view["roles"], serde_json::json!(["deploy"]));
        assert_eq!(view["members"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_duplicate_create_reports_uniqueness() {
        let store = seeded().await;
        run(&store, create("ops")).await.unwrap();
        let err = run(&store, create("ops")).await.unwrap_err();
        assert_eq!(err.to_string(), "name has already been taken");
    }

    #[tokio::test]
    async fn test_admin_group_is_protected() {
        let store = seeded().await;
        let err = run(
            &store,
            GroupAction::Rename {
                name: ADMIN_GROUP.to_string(),
                new_name: "root".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("admin group may not be modified"));

        let err = run(
            &store,
            GroupAction::Revoke {
                group: ADMIN_GROUP.to_string(),
                role: ADMIN_ROLE.to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("permanently granted"));
    }

    #[tokio::test]
    async fn test_delete_requires_empty_group() {
        let store = seeded().await;
        run(&store, create("ops")).await.unwrap();
        run(
            &store,
            GroupAction::AddMember {
                group: "ops".to_string(),
                user: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        let err = run(&store, GroupAction::Delete { name: "ops".to_string() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("group has members"));

        run(
            &store,
            GroupAction::RemoveMember {
                group: "ops".to_string(),
                user: "alice".to_string(),
            },
        )
        .await
        .unwrap();
        run(&store, GroupAction::Delete { name: "ops".to_string() })
            .await
            .unwrap();
        assert!(store.get_group_by_name("ops").await.is_err());
    }

    #[tokio::test]
    async fn test_roles_and_users() {
        let store = GroupStore::in_memory();
        let out = run_role(&store, RoleAction::Create { name: "deploy".to_string() })
            .await
            .unwrap();
        assert_eq!(out, "Created role 'deploy'");
        assert_eq!(run_role(&store, RoleAction::List).await.unwrap(), "deploy");
        assert_eq!(create_user(&store, "alice").await.unwrap(), "Created user 'alice'");
        assert_eq!(
            create_user(&store, "alice").await.unwrap(),
            "User 'alice' already exists"
        );
    }
}
