//! Assembly of the ordered child list.

use crate::workers::{
    BusDriver, BusSender, PersistenceWorker, ServiceWorker, TemplateCache, TokenReaper,
    COMMAND_SUPERVISOR, CREDENTIAL_MANAGER, ENDPOINT_SUPERVISOR, RELAY_SUPERVISOR,
};
use opsbot_core::{Config, Environment};
use opsbot_store::GroupStore;
use opsbot_supervisor::Worker;
use std::sync::Arc;
use std::time::Duration;

/// Children of the root supervisor, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Persistence,
    MessageBus,
    TokenReaper,
    TemplateCache,
    CredentialManager,
    RelaySupervisor,
    CommandSupervisor,
    ChatAdapter,
    Endpoint,
}

const FULL_TREE: &[ChildKind] = &[
    ChildKind::Persistence,
    ChildKind::MessageBus,
    ChildKind::TokenReaper,
    ChildKind::TemplateCache,
    ChildKind::CredentialManager,
    ChildKind::RelaySupervisor,
    ChildKind::CommandSupervisor,
    ChildKind::ChatAdapter,
    ChildKind::Endpoint,
];

const CHATLESS_TREE: &[ChildKind] = &[
    ChildKind::Persistence,
    ChildKind::TokenReaper,
    ChildKind::Endpoint,
];

/// Which children to run. Chat can only be switched off in development.
pub fn child_plan(environment: Environment, chat_disabled: bool) -> &'static [ChildKind] {
    if environment.is_development() && chat_disabled {
        CHATLESS_TREE
    } else {
        FULL_TREE
    }
}

/// Shared resources the children are built from.
pub struct ChildContext {
    pub store: Arc<GroupStore>,
    pub bus_shutdown_grace: Duration,
    pub token_reap_interval: Duration,
    pub template_ttl: Duration,
    bus: Option<BusSender>,
}

impl ChildContext {
    pub fn new(store: Arc<GroupStore>, config: &Config) -> Self {
        Self {
            store,
            bus_shutdown_grace: Duration::from_millis(config.bus_shutdown_grace_ms),
            token_reap_interval: Duration::from_secs(config.token_reap_interval_secs.max(1)),
            template_ttl: Duration::from_secs(config.template_ttl_secs.max(1)),
            bus: None,
        }
    }

    /// Publishing handle for the bus, once a child list containing it was built.
    pub fn bus(&self) -> Option<&BusSender> {
        self.bus.as_ref()
    }
}

/// Build the workers for `child_plan(environment, chat_disabled)`, placing
/// `adapter_supervisor` between the command supervisor and the endpoint.
pub fn build_child_list(
    environment: Environment,
    chat_disabled: bool,
    adapter_supervisor: Arc<dyn Worker>,
    context: &mut ChildContext,
) -> Vec<Arc<dyn Worker>> {
    let plan = child_plan(environment, chat_disabled);
    let mut children: Vec<Arc<dyn Worker>> = Vec::with_capacity(plan.len());

    for kind in plan {
        let child: Arc<dyn Worker> = match kind {
            ChildKind::Persistence => Arc::new(PersistenceWorker::new(context.store.clone())),
            ChildKind::MessageBus => {
                let (driver, sender) = BusDriver::new(context.bus_shutdown_grace);
                context.bus = Some(sender);
                Arc::new(driver)
            }
            ChildKind::TokenReaper => Arc::new(TokenReaper::new(
                context.store.clone(),
                context.token_reap_interval,
            )),
            ChildKind::TemplateCache => Arc::new(TemplateCache::new(context.template_ttl)),
            ChildKind::CredentialManager => Arc::new(ServiceWorker::new(CREDENTIAL_MANAGER)),
            ChildKind::RelaySupervisor => Arc::new(ServiceWorker::new(RELAY_SUPERVISOR)),
            ChildKind::CommandSupervisor => Arc::new(ServiceWorker::new(COMMAND_SUPERVISOR)),
            ChildKind::ChatAdapter => adapter_supervisor.clone(),
            ChildKind::Endpoint => Arc::new(ServiceWorker::new(ENDPOINT_SUPERVISOR)),
        };
        children.push(child);
    }

    tracing::debug!(
        environment = %environment,
        chat_disabled,
        children = children.len(),
        "child list built"
    );
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsbot_adapter::AdapterRegistry;

    fn names(children: &[Arc<dyn Worker>]) -> Vec<String> {
        children.iter().map(|c| c.name().to_string()).collect()
    }

    fn context() -> ChildContext {
        ChildContext::new(Arc::new(GroupStore::in_memory()), &Config::default())
    }

    fn slack() -> Arc<dyn Worker> {
        AdapterRegistry::builtin().resolve("slack").unwrap().supervisor()
    }

    #[test]
    fn test_full_tree_order() {
        let mut ctx = context();
        let children = build_child_list(Environment::Production, false, slack(), &mut ctx);
        assert_eq!(
            names(&children),
            vec![
                "persistence",
                "message_bus",
                "token_reaper",
                "template_cache",
                "credential_manager",
                "relay_supervisor",
                "command_supervisor",
                "slack_adapter_supervisor",
                "endpoint_supervisor",
            ]
        );
        assert!(ctx.bus().is_some());
    }

    #[test]
    fn test_chat_disabled_in_development_keeps_three_children() {
        let mut ctx = context();
        let children = build_child_list(Environment::Development, true, slack(), &mut ctx);
        assert_eq!(
            names(&children),
            vec!["persistence", "token_reaper", "endpoint_supervisor"]
        );
        assert!(ctx.bus().is_none());
    }

    #[test]
    fn test_chat_disabled_is_ignored_outside_development() {
        assert_eq!(child_plan(Environment::Production, true).len(), 9);
        assert_eq!(child_plan(Environment::Test, true).len(), 9);
    }

    #[test]
    fn test_bus_grace_comes_from_config() {
        let config = Config {
            bus_shutdown_grace_ms: 2_500,
            ..Config::default()
        };
        let mut ctx = ChildContext::new(Arc::new(GroupStore::in_memory()), &config);
        let children = build_child_list(Environment::Test, false, slack(), &mut ctx);
        assert_eq!(children[1].shutdown_grace(), Duration::from_millis(2_500));

        let defaults = context();
        assert_eq!(defaults.bus_shutdown_grace, Duration::from_millis(10_000));
    }
}
