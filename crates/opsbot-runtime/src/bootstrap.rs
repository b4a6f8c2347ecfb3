//! The bootstrap sequence.
//!
//! Capabilities are verified and the chat adapter resolved before anything is
//! spawned, so a bad runtime or adapter name never leaves half a tree behind.
//! The schema check runs last, against a tree that is already up: the
//! persistence worker has to be running before the migration table can be
//! trusted.

use crate::capabilities::{Check, RuntimeCapabilities};
use crate::children::{build_child_list, ChildContext};
use crate::error::BootError;
use crate::workers::BusSender;
use opsbot_adapter::AdapterRegistry;
use opsbot_core::{Config, Environment};
use opsbot_store::{migrations, GroupStore};
use opsbot_supervisor::{RestartIntensity, Supervisor, SupervisorHandle};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where the sequence is. `Aborted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    NotStarted,
    CapabilitiesVerified,
    AdapterResolved,
    TreeBuilt,
    Started,
    MigrationVerified,
    Running,
    Aborted,
}

/// Compare the newest migration file with the newest applied migration.
pub fn verify_schema_migration(
    file_version: u64,
    db_version: u64,
    environment: Environment,
) -> Check {
    if file_version == db_version {
        return Check::Ok;
    }
    let message = format!(
        "migration files are at version {file_version} but the store has applied {db_version}"
    );
    if environment.is_development() {
        Check::Warning(message)
    } else {
        Check::Error(message)
    }
}

/// Brings the process up exactly once.
pub struct Bootstrap {
    config: Config,
    store: Arc<GroupStore>,
    registry: AdapterRegistry,
    capabilities: Option<RuntimeCapabilities>,
    state: BootState,
    migration_check: Option<Check>,
    bus: Option<BusSender>,
}

impl Bootstrap {
    pub fn new(config: Config, store: Arc<GroupStore>) -> Self {
        Self {
            config,
            store,
            registry: AdapterRegistry::builtin(),
            capabilities: None,
            state: BootState::NotStarted,
            migration_check: None,
            bus: None,
        }
    }

    /// Resolve adapters against `registry` instead of the built-in one.
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use fixed capabilities instead of probing the current runtime.
    pub fn with_capabilities(mut self, capabilities: RuntimeCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Result of the schema check, once it has run.
    pub fn migration_check(&self) -> Option<&Check> {
        self.migration_check.as_ref()
    }

    pub fn store(&self) -> &Arc<GroupStore> {
        &self.store
    }

    /// Publishing handle for the message bus, when the tree runs one.
    pub fn bus(&self) -> Option<&BusSender> {
        self.bus.as_ref()
    }

    /// Run the whole sequence. May only be called once.
    pub async fn start(&mut self) -> Result<SupervisorHandle, BootError> {
        if self.state != BootState::NotStarted {
            return Err(BootError::AlreadyStarted);
        }
        info!(
            environment = %self.config.environment,
            adapter = %self.config.adapter,
            chat_disabled = self.config.chat_disabled,
            "starting opsbot"
        );

        match self.sequence().await {
            Ok(handle) => {
                self.state = BootState::Running;
                info!("opsbot running");
                Ok(handle)
            }
            Err(err) => {
                self.state = BootState::Aborted;
                Err(err)
            }
        }
    }

    async fn sequence(&mut self) -> Result<SupervisorHandle, BootError> {
        self.verify_runtime_capabilities()?;
        self.state = BootState::CapabilitiesVerified;

        let adapter = self.registry.resolve(&self.config.adapter)?;
        self.state = BootState::AdapterResolved;

        let mut context = ChildContext::new(self.store.clone(), &self.config);
        let children = build_child_list(
            self.config.environment,
            self.config.chat_disabled,
            adapter.supervisor(),
            &mut context,
        );
        self.bus = context.bus().cloned();
        self.state = BootState::TreeBuilt;

        let intensity = RestartIntensity {
            max_restarts: self.config.max_restarts,
            within: Duration::from_secs(self.config.restart_window_secs),
        };
        let handle = Supervisor::start(children, intensity).await?;
        self.state = BootState::Started;

        let (file_version, db_version, check) = match self.check_schema().await {
            Ok(outcome) => outcome,
            Err(err) => {
                handle.shutdown().await;
                return Err(err);
            }
        };
        let drifted = check.is_error();
        self.migration_check = Some(check);
        if drifted {
            handle.shutdown().await;
            return Err(BootError::MigrationDrift {
                file_version,
                db_version,
                environment: self.config.environment,
            });
        }
        self.state = BootState::MigrationVerified;
        Ok(handle)
    }

    fn verify_runtime_capabilities(&self) -> Result<(), BootError> {
        let capabilities = self.capabilities.unwrap_or_else(RuntimeCapabilities::detect);
        let failures: Vec<String> = capabilities
            .verify()
            .into_iter()
            .filter_map(|check| match check {
                Check::Error(message) => Some(message),
                Check::Warning(message) => {
                    warn!(%message, "runtime capability warning");
                    None
                }
                Check::Ok => None,
            })
            .collect();

        if failures.is_empty() {
            info!(schedulers = capabilities.schedulers, "runtime capabilities verified");
            Ok(())
        } else {
            for message in &failures {
                error!(%message, "runtime capability missing");
            }
            Err(BootError::Capability(failures.join("; ")))
        }
    }

    async fn check_schema(&self) -> Result<(u64, u64, Check), BootError> {
        let files = migrations::scan(&self.config.migrations_dir).await?;
        let file_version = migrations::file_version(&files);
        let db_version = self.store.applied_version(&self.config.schema_namespace).await;
        let check = verify_schema_migration(file_version, db_version, self.config.environment);
        match &check {
            Check::Ok => info!(version = db_version, "schema up to date"),
            Check::Warning(message) => warn!(%message, "schema out of date; continuing in development"),
            Check::Error(message) => error!(%message, "schema out of date"),
        }
        Ok((file_version, db_version, check))
    }
}

/// Log a fatal startup error and terminate the process with status 1.
pub fn abort(err: &dyn std::error::Error) -> ! {
    error!(error = %err, "opsbot failed to start");
    eprintln!("opsbot: {err}");
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    std::process::exit(1)
}
