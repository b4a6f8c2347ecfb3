//! Closed registry of chat backends.

use crate::adapters;
use crate::error::ConfigurationError;
use opsbot_supervisor::Worker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Supported chat backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Slack,
    HipChat,
    Irc,
    Null,
    Test,
}

const ALL_ADAPTERS: &[AdapterKind] = &[
    AdapterKind::Slack,
    AdapterKind::HipChat,
    AdapterKind::Irc,
    AdapterKind::Null,
    AdapterKind::Test,
];

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Slack => "slack",
            AdapterKind::HipChat => "hipchat",
            AdapterKind::Irc => "irc",
            AdapterKind::Null => "null",
            AdapterKind::Test => "test",
        }
    }

    /// Case-insensitive lookup.
    pub fn parse(name: &str) -> Result<Self, ConfigurationError> {
        ALL_ADAPTERS
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigurationError::UnknownAdapter {
                name: name.to_string(),
                supported: Self::supported(),
            })
    }

    /// Child name of this backend's supervisor.
    pub fn supervisor_name(self) -> String {
        format!("{}_adapter_supervisor", self.as_str())
    }

    fn supported() -> String {
        ALL_ADAPTERS
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a backend's supervisor.
pub type SupervisorFactory = fn() -> Arc<dyn Worker>;

/// Maps each backend to its statically registered supervisor factory.
#[derive(Clone)]
pub struct AdapterRegistry {
    factories: HashMap<AdapterKind, SupervisorFactory>,
}

/// A backend whose supervisor is known to exist.
#[derive(Clone)]
pub struct ResolvedAdapter {
    pub kind: AdapterKind,
    factory: SupervisorFactory,
}

impl ResolvedAdapter {
    pub fn supervisor(&self) -> Arc<dyn Worker> {
        (self.factory)()
    }
}

impl fmt::Debug for ResolvedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedAdapter")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with a supervisor for every supported backend.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(AdapterKind::Slack, adapters::slack);
        registry.register(AdapterKind::HipChat, adapters::hipchat);
        registry.register(AdapterKind::Irc, adapters::irc);
        registry.register(AdapterKind::Null, adapters::null);
        registry.register(AdapterKind::Test, adapters::test);
        registry
    }

    /// Register a factory. Replaces any existing factory for the backend.
    pub fn register(&mut self, kind: AdapterKind, factory: SupervisorFactory) {
        self.factories.insert(kind, factory);
    }

    /// Resolve a configured adapter name to its supervisor factory.
    pub fn resolve(&self, name: &str) -> Result<ResolvedAdapter, ConfigurationError> {
        let kind = AdapterKind::parse(name)?;
        let factory = self
            .factories
            .get(&kind)
            .copied()
            .ok_or_else(|| ConfigurationError::MissingSupervisor {
                adapter: kind.to_string(),
                supervisor: kind.supervisor_name(),
            })?;
        tracing::debug!(adapter = %kind, supervisor = %kind.supervisor_name(), "resolved chat adapter");
        Ok(ResolvedAdapter { kind, factory })
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = AdapterRegistry::builtin();
        for name in ["slack", "Slack", "HIPCHAT", "irc", "NuLL", "Test"] {
            assert!(registry.resolve(name).is_ok(), "{name} should resolve");
        }
        assert_eq!(registry.resolve("HipChat").unwrap().kind, AdapterKind::HipChat);
    }

    #[test]
    fn test_unknown_adapter_names_bad_value() {
        let registry = AdapterRegistry::builtin();
        for name in ["discord", "", "slack2", "s1ack", " null ", "irc\n"] {
            let err = registry.resolve(name).unwrap_err();
            assert!(matches!(err, ConfigurationError::UnknownAdapter { .. }));
            let message = err.to_string();
            assert!(message.contains(&format!("'{name}'")));
            assert!(message.contains("slack, hipchat, irc, null, test"));
        }
    }

    #[test]
    fn test_missing_supervisor_is_a_configuration_error() {
        let mut registry = AdapterRegistry::new();
        registry.register(AdapterKind::Slack, adapters::slack);

        let err = registry.resolve("irc").unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingSupervisor { .. }));
        assert!(err.to_string().contains("irc_adapter_supervisor"));
        assert!(err.to_string().contains("must be defined"));
    }

    #[test]
    fn test_supervisor_carries_naming_convention() {
        let resolved = AdapterRegistry::builtin().resolve("slack").unwrap();
        assert_eq!(resolved.supervisor().name(), "slack_adapter_supervisor");
    }
}
