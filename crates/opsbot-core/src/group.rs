//! Permission groups.

use crate::permission::is_admin_group;
use crate::validation::{
    Action, Changeset, Constraint, ValidationErrors, Validator, ADMIN_PROTECTED_MESSAGE,
    MEMBERS_PRESENT_MESSAGE, NO_CHANGES_MESSAGE, REQUIRED_MESSAGE, ROLES_GRANTED_MESSAGE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A named set of users holding a set of roles.
///
/// This is also the primary API representation; see
/// [`GroupView`](crate::view::GroupView) for the command-rendering form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Empty until the store assigns one at insert.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub users: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

/// Fields accepted from create/update requests.
///
/// Deserializing from a request body drops every key other than `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParams {
    pub name: Option<String>,
}

impl GroupParams {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

const CREATE_OR_UPDATE: &[Validator] = &[validate_required_name, protect_admin_group];
const DELETE: &[Validator] = &[protect_admin_group, require_no_role_grants, require_no_members];

impl Group {
    /// A fresh, unsaved group to build a create changeset from.
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn is_admin(&self) -> bool {
        is_admin_group(&self.name)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_member(&self, user: &str) -> bool {
        self.users.contains(user)
    }

    /// Build a create (unsaved candidate) or update (persisted candidate)
    /// changeset.
    ///
    /// Absent or empty params produce an invalid changeset without running
    /// any validator.
    pub fn validate_for_create_or_update(&self, params: Option<&GroupParams>) -> Changeset {
        let action = if self.is_persisted() {
            Action::Update
        } else {
            Action::Insert
        };

        let Some(params) = params.filter(|p| !p.is_empty()) else {
            return Changeset::rejected(
                self.clone(),
                action,
                ValidationErrors::single("params", NO_CHANGES_MESSAGE),
            );
        };

        let name_change = params.name.as_ref().map(|name| name.trim().to_string());

        Changeset::new(self.clone(), name_change, action)
            .validate(CREATE_OR_UPDATE)
            .constrain(Constraint::NoRoleGrants)
            .constrain(Constraint::NoMemberships)
            .constrain(Constraint::UniqueName)
    }

    /// Build a delete changeset. Only a valid one may be committed.
    pub fn validate_for_delete(&self) -> Changeset {
        Changeset::new(self.clone(), None, Action::Delete)
            .validate(DELETE)
            .constrain(Constraint::NoRoleGrants)
            .constrain(Constraint::NoMemberships)
    }
}

fn validate_required_name(changeset: &Changeset, errors: ValidationErrors) -> ValidationErrors {
    if changeset.effective_name().trim().is_empty() {
        errors.with("name", REQUIRED_MESSAGE)
    } else {
        errors
    }
}

fn protect_admin_group(changeset: &Changeset, errors: ValidationErrors) -> ValidationErrors {
    if changeset.data().is_admin() {
        errors.with("name", ADMIN_PROTECTED_MESSAGE)
    } else {
        errors
    }
}

fn require_no_role_grants(changeset: &Changeset, errors: ValidationErrors) -> ValidationErrors {
    if changeset.data().roles.is_empty() {
        errors
    } else {
        errors.with("roles", ROLES_GRANTED_MESSAGE)
    }
}

fn require_no_members(changeset: &Changeset, errors: ValidationErrors) -> ValidationErrors {
    if changeset.data().users.is_empty() {
        errors
    } else {
        errors.with("users", MEMBERS_PRESENT_MESSAGE)
    }
}
