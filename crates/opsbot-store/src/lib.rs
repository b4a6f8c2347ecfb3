//! opsbot-store: JSON-file persistence for groups, join rows and the
//! migration table.

mod error;
pub mod format;
pub mod migrations;
pub mod store;

pub use error::StoreError;
pub use format::{Database, GroupRecord, JoinRow, TokenRecord};
pub use migrations::MigrationFile;
pub use store::GroupStore;
