//! Per-backend adapter supervisors.
//!
//! The chat protocols themselves live with each backend; from the bootstrap
//! sequence's point of view an adapter is a supervised child that connects in
//! `init` and stays up until shutdown.

use crate::registry::AdapterKind;
use async_trait::async_trait;
use opsbot_supervisor::{Shutdown, Worker, WorkerError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

/// Supervisor for one chat backend.
#[derive(Debug)]
pub struct ChatAdapterSupervisor {
    kind: AdapterKind,
    name: String,
    connections: AtomicU32,
}

impl ChatAdapterSupervisor {
    pub fn new(kind: AdapterKind) -> Self {
        Self {
            kind,
            name: kind.supervisor_name(),
            connections: AtomicU32::new(0),
        }
    }

    /// Number of times the backend connection has been (re)established.
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Whether the backend talks to a real chat service.
    pub fn is_networked(&self) -> bool {
        !matches!(self.kind, AdapterKind::Null | AdapterKind::Test)
    }
}

#[async_trait]
impl Worker for ChatAdapterSupervisor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), WorkerError> {
        let attempt = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        info!(adapter = %self.kind, networked = self.is_networked(), attempt, "chat adapter connected");
        Ok(())
    }

    async fn run(&self, mut shutdown: Shutdown) -> Result<(), WorkerError> {
        shutdown.requested().await;
        info!(adapter = %self.kind, "chat adapter disconnected");
        Ok(())
    }
}

pub fn slack() -> Arc<dyn Worker> {
    Arc::new(ChatAdapterSupervisor::new(AdapterKind::Slack))
}

pub fn hipchat() -> Arc<dyn Worker> {
    Arc::new(ChatAdapterSupervisor::new(AdapterKind::HipChat))
}

pub fn irc() -> Arc<dyn Worker> {
    Arc::new(ChatAdapterSupervisor::new(AdapterKind::Irc))
}

pub fn null() -> Arc<dyn Worker> {
    Arc::new(ChatAdapterSupervisor::new(AdapterKind::Null))
}

pub fn test() -> Arc<dyn Worker> {
    Arc::new(ChatAdapterSupervisor::new(AdapterKind::Test))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_adapter_connects_on_init_and_stops_on_shutdown() {
        let adapter = ChatAdapterSupervisor::new(AdapterKind::Irc);
        adapter.init().await.unwrap();
        assert_eq!(adapter.connections(), 1);

        let (trigger, shutdown) = Shutdown::pair();
        trigger.trigger();
        adapter.run(shutdown).await.unwrap();
    }

    #[test]
    fn test_null_and_test_adapters_are_local() {
        assert!(!ChatAdapterSupervisor::new(AdapterKind::Null).is_networked());
        assert!(!ChatAdapterSupervisor::new(AdapterKind::Test).is_networked());
        assert!(ChatAdapterSupervisor::new(AdapterKind::Slack).is_networked());
    }
}
