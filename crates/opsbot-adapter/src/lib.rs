//! opsbot-adapter: Chat backend selection and adapter supervisors.

pub mod adapters;
mod error;
pub mod registry;

pub use adapters::ChatAdapterSupervisor;
pub use error::ConfigurationError;
pub use registry::{AdapterKind, AdapterRegistry, ResolvedAdapter, SupervisorFactory};
