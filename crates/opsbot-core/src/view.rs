//! Command-rendering representation of a group.

use crate::group::Group;
use serde::{Deserialize, Serialize};

/// Group as rendered by chat commands.
///
/// Deliberately differs from [`Group`]'s own serde form: users are exposed
/// as `members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
    pub members: Vec<String>,
}

impl From<&Group> for GroupView {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id.clone(),
            name: group.name.clone(),
            roles: group.roles.iter().cloned().collect(),
            members: group.users.iter().cloned().collect(),
        }
    }
}

impl Group {
    pub fn external_view(&self) -> GroupView {
        GroupView::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_renames_users_to_members() {
        let mut group = Group {
            id: "g1".to_string(),
            name: "ops".to_string(),
            ..Default::default()
        };
        group.users.insert("alice".to_string());
        group.roles.insert("deploy".to_string());

        let json = serde_json::to_value(group.external_view()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "g1",
                "name": "ops",
                "roles": ["deploy"],
                "members": ["alice"],
            })
        );

        let primary = serde_json::to_value(&group).unwrap();
        assert!(primary.get("users").is_some());
        assert!(primary.get("members").is_none());
    }
}
