//! opsbot-runtime: capability probe, supervision tree assembly and the
//! bootstrap sequence that brings the process to a running state.

pub mod bootstrap;
pub mod capabilities;
pub mod children;
mod error;
pub mod workers;

pub use bootstrap::{abort, verify_schema_migration, BootState, Bootstrap};
pub use capabilities::{Check, RuntimeCapabilities};
pub use children::{build_child_list, child_plan, ChildContext, ChildKind};
pub use error::BootError;
pub use workers::{
    BusDriver, BusMessage, BusSender, PersistenceWorker, ServiceWorker, TemplateCache,
    TokenReaper,
};
