//! opsbot-core: Permission groups, validation, and shared configuration.

pub mod config;
mod error;
pub mod grant;
pub mod group;
pub mod permission;
pub mod validation;
pub mod view;

pub use config::{Config, ConfigStore, Environment};
pub use error::CoreError;
pub use grant::{AssociationError, Associations, GrantError, Grantable, Link};
pub use group::{Group, GroupParams};
pub use permission::{ADMIN_GROUP, ADMIN_ROLE};
pub use validation::{Action, Changeset, Constraint, ValidationErrors};
pub use view::GroupView;
