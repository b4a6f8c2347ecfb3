//! On-disk layout of the store file.

use opsbot_core::Group;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Persisted group columns. Join rows live in their own relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
}

/// One row of a group-owned join relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinRow {
    pub group_id: String,
    /// Role name for grants, user name for memberships.
    pub principal: String,
}

impl JoinRow {
    pub fn new(group_id: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            principal: principal.into(),
        }
    }
}

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user: String,
    /// Unix timestamp (seconds) after which the token is void.
    pub expires_at: u64,
}

/// The whole store, serialized as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub groups: BTreeMap<String, GroupRecord>,
    pub roles: BTreeSet<String>,
    pub users: BTreeSet<String>,
    pub role_grants: BTreeSet<JoinRow>,
    pub memberships: BTreeSet<JoinRow>,
    pub tokens: BTreeMap<String, TokenRecord>,
    /// Applied migration versions keyed by schema namespace.
    pub schema_migrations: BTreeMap<String, BTreeSet<u64>>,
}

impl Database {
    pub fn find_group_by_name(&self, name: &str) -> Option<&GroupRecord> {
        self.groups.values().find(|record| record.name == name)
    }

    pub fn role_grant_count(&self, group_id: &str) -> usize {
        self.role_grants
            .iter()
            .filter(|row| row.group_id == group_id)
            .count()
    }

    pub fn membership_count(&self, group_id: &str) -> usize {
        self.memberships
            .iter()
            .filter(|row| row.group_id == group_id)
            .count()
    }

    /// Materialize a group with its join rows.
    pub fn load_group(&self, record: &GroupRecord) -> Group {
        let principals = |rows: &BTreeSet<JoinRow>| -> BTreeSet<String> {
            rows.iter()
                .filter(|row| row.group_id == record.id)
                .map(|row| row.principal.clone())
                .collect()
        };
        Group {
            id: record.id.clone(),
            name: record.name.clone(),
            users: principals(&self.memberships),
            roles: principals(&self.role_grants),
        }
    }

    pub fn applied_version(&self, namespace: &str) -> u64 {
        self.schema_migrations
            .get(namespace)
            .and_then(|versions| versions.iter().next_back().copied())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_file_without_tokens_parses() {
        let json = r#"{
            "groups": {"g1": {"id": "g1", "name": "ops"}},
            "roles": ["deploy"],
            "role_grants": [{"group_id": "g1", "principal": "deploy"}]
        }"#;
        let db: Database = serde_json::from_str(json).unwrap();
        assert!(db.tokens.is_empty());
        assert_eq!(db.role_grant_count("g1"), 1);

        let group = db.load_group(&db.groups["g1"]);
        assert!(group.has_role("deploy"));
        assert!(group.users.is_empty());
    }

    #[test]
    fn test_applied_version_is_max_per_namespace() {
        let mut db = Database::default();
        assert_eq!(db.applied_version("opsbot"), 0);

        db.schema_migrations
            .entry("opsbot".to_string())
            .or_default()
            .extend([20160101, 20160315, 20160201]);
        db.schema_migrations
            .entry("other".to_string())
            .or_default()
            .insert(99999999);

        assert_eq!(db.applied_version("opsbot"), 20160315);
    }
}
