//! Changesets and the ordered validator pipeline.
//!
//! A [`Changeset`] pairs a candidate [`Group`] with the changes cast from
//! request parameters. Validators run in a fixed order; each one receives the
//! changeset and the errors accumulated so far and returns the updated
//! accumulator. Checks that need live data (name uniqueness, join rows at
//! delete time) are declared as [`Constraint`]s and enforced by the store at
//! commit.

use crate::group::Group;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an accumulator holding a single message.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self::new().with(field, message)
    }

    /// Append a message for `field`, returning the accumulator.
    pub fn with(mut self, field: &str, message: impl Into<String>) -> Self {
        self.add(field, message);
        self
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Messages recorded for `field`.
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str, message: &str) -> bool {
        self.get(field).iter().any(|m| m == message)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(field, messages)| messages.iter().map(move |m| (field.as_str(), m.as_str())))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .iter()
            .map(|(field, message)| format!("{field} {message}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&rendered)
    }
}

impl std::error::Error for ValidationErrors {}

/// What a committed changeset does to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

/// Checks deferred to commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// No other group may hold the resulting name.
    UniqueName,
    /// Deletion requires zero role-grant join rows.
    NoRoleGrants,
    /// Deletion requires zero membership join rows.
    NoMemberships,
}

pub const UNIQUE_NAME_MESSAGE: &str = "has already been taken";
pub const REQUIRED_MESSAGE: &str = "can't be blank";
pub const ADMIN_PROTECTED_MESSAGE: &str = "admin group may not be modified";
pub const ROLES_GRANTED_MESSAGE: &str = "group has roles granted; revoke them before deleting";
pub const MEMBERS_PRESENT_MESSAGE: &str = "group has members; remove them before deleting";
pub const NO_CHANGES_MESSAGE: &str = "no changes submitted";

/// A single pipeline stage.
pub type Validator = fn(&Changeset, ValidationErrors) -> ValidationErrors;

/// A candidate group plus the changes requested against it.
#[derive(Debug, Clone)]
pub struct Changeset {
    data: Group,
    name_change: Option<String>,
    action: Action,
    constraints: Vec<Constraint>,
    errors: ValidationErrors,
}

impl Changeset {
    pub(crate) fn new(data: Group, name_change: Option<String>, action: Action) -> Self {
        Self {
            data,
            name_change,
            action,
            constraints: Vec::new(),
            errors: ValidationErrors::new(),
        }
    }

    /// A changeset that is invalid regardless of its contents.
    pub(crate) fn rejected(data: Group, action: Action, errors: ValidationErrors) -> Self {
        Self {
            errors,
            ..Self::new(data, None, action)
        }
    }

    /// Run `validators` in order, threading the error accumulator through.
    pub(crate) fn validate(mut self, validators: &[Validator]) -> Self {
        let mut errors = std::mem::take(&mut self.errors);
        for validator in validators {
            errors = validator(&self, errors);
        }
        self.errors = errors;
        self
    }

    pub(crate) fn constrain(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// The group as it was before any change.
    pub fn data(&self) -> &Group {
        &self.data
    }

    /// Name the group will carry if the changeset commits.
    pub fn effective_name(&self) -> &str {
        self.name_change.as_deref().unwrap_or(&self.data.name)
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_constraint(&self, constraint: Constraint) -> bool {
        self.constraints.contains(&constraint)
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The group with all changes applied.
    pub fn apply(&self) -> Group {
        let mut group = self.data.clone();
        if let Some(name) = &self.name_change {
            group.name = name.clone();
        }
        group
    }
}
