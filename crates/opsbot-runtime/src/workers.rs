//! Workers making up the supervision tree.
//!
//! Only their lifecycles are modelled here: persistence seeds and flushes the
//! store, the bus driver drains its queue on shutdown, the reaper expires
//! tokens, the template cache evicts stale entries. Relay, command, credential
//! and endpoint services are represented by [`ServiceWorker`].

use async_trait::async_trait;
use opsbot_store::GroupStore;
use opsbot_supervisor::{Shutdown, Worker, WorkerError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const PERSISTENCE: &str = "persistence";
pub const MESSAGE_BUS: &str = "message_bus";
pub const TOKEN_REAPER: &str = "token_reaper";
pub const TEMPLATE_CACHE: &str = "template_cache";
pub const CREDENTIAL_MANAGER: &str = "credential_manager";
pub const RELAY_SUPERVISOR: &str = "relay_supervisor";
pub const COMMAND_SUPERVISOR: &str = "command_supervisor";
pub const ENDPOINT_SUPERVISOR: &str = "endpoint_supervisor";

const BUS_CAPACITY: usize = 1024;

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn store_failure(err: opsbot_store::StoreError) -> WorkerError {
    WorkerError::failed(err.to_string())
}

/// Owns the store for the lifetime of the tree.
pub struct PersistenceWorker {
    store: Arc<GroupStore>,
}

impl PersistenceWorker {
    pub fn new(store: Arc<GroupStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker for PersistenceWorker {
    fn name(&self) -> &str {
        PERSISTENCE
    }

    async fn init(&self) -> Result<(), WorkerError> {
        let admin = self.store.ensure_admin().await.map_err(store_failure)?;
        info!(admin_group = %admin.name, path = ?self.store.path(), "persistence ready");
        Ok(())
    }

    async fn run(&self, mut shutdown: Shutdown) -> Result<(), WorkerError> {
        shutdown.requested().await;
        self.store.flush().await.map_err(store_failure)?;
        debug!("store flushed");
        Ok(())
    }
}

/// A message published on the internal bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub body: String,
}

/// Publishing side of the bus.
#[derive(Debug, Clone)]
pub struct BusSender {
    tx: mpsc::Sender<BusMessage>,
}

impl BusSender {
    pub async fn publish(&self, topic: impl Into<String>, body: impl Into<String>) -> bool {
        self.tx
            .send(BusMessage {
                topic: topic.into(),
                body: body.into(),
            })
            .await
            .is_ok()
    }
}

/// Delivers bus messages and drains whatever is queued when asked to stop.
///
/// The driver holds a sender of its own, so the channel stays open across
/// restarts even when no publisher is alive.
pub struct BusDriver {
    grace: Duration,
    sender: BusSender,
    rx: tokio::sync::Mutex<mpsc::Receiver<BusMessage>>,
    delivered: AtomicU64,
}

impl BusDriver {
    pub fn new(grace: Duration) -> (Self, BusSender) {
        let (tx, rx) = mpsc::channel(BUS_CAPACITY);
        let sender = BusSender { tx };
        let driver = Self {
            grace,
            sender: sender.clone(),
            rx: tokio::sync::Mutex::new(rx),
            delivered: AtomicU64::new(0),
        };
        (driver, sender)
    }

    /// Another publishing handle onto this driver's bus.
    pub fn sender(&self) -> BusSender {
        self.sender.clone()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    fn deliver(&self, message: &BusMessage) {
        debug!(topic = %message.topic, bytes = message.body.len(), "bus message delivered");
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Worker for BusDriver {
    fn name(&self) -> &str {
        MESSAGE_BUS
    }

    fn shutdown_grace(&self) -> Duration {
        self.grace
    }

    async fn run(&self, mut shutdown: Shutdown) -> Result<(), WorkerError> {
        let mut rx = self.rx.lock().await;
        loop {
            tokio::select! {
                _ = shutdown.requested() => break,
                Some(message) = rx.recv() => self.deliver(&message),
            }
        }

        let mut drained = 0usize;
        while let Ok(message) = rx.try_recv() {
            self.deliver(&message);
            drained += 1;
        }
        info!(drained, "message bus drained");
        Ok(())
    }
}

/// Periodically deletes expired tokens.
pub struct TokenReaper {
    store: Arc<GroupStore>,
    interval: Duration,
}

impl TokenReaper {
    pub fn new(store: Arc<GroupStore>, interval: Duration) -> Self {
        Self { store, interval }
    }
}

#[async_trait]
impl Worker for TokenReaper {
    fn name(&self) -> &str {
        TOKEN_REAPER
    }

    async fn run(&self, mut shutdown: Shutdown) -> Result<(), WorkerError> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.requested() => return Ok(()),
                _ = ticker.tick() => {
                    let reaped = self
                        .store
                        .reap_expired_tokens(unix_now())
                        .await
                        .map_err(store_failure)?;
                    if reaped > 0 {
                        info!(reaped, "expired tokens removed");
                    }
                }
            }
        }
    }
}

/// Rendered command templates, evicted after a TTL.
pub struct TemplateCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl TemplateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn insert(&self, key: impl Into<String>, template: impl Into<String>) {
        self.entries()
            .insert(key.into(), (template.into(), Instant::now()));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries();
        entries
            .get(key)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(template, _)| template.clone())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, (_, at)| at.elapsed() < self.ttl);
        before - entries.len()
    }
}

#[async_trait]
impl Worker for TemplateCache {
    fn name(&self) -> &str {
        TEMPLATE_CACHE
    }

    async fn run(&self, mut shutdown: Shutdown) -> Result<(), WorkerError> {
        let mut ticker = tokio::time::interval(self.ttl);
        loop {
            tokio::select! {
                _ = shutdown.requested() => {
                    self.entries().clear();
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let evicted = self.evict_expired();
                    if evicted > 0 {
                        debug!(evicted, "templates evicted");
                    }
                }
            }
        }
    }
}

/// A service whose internals live elsewhere; only its place in the tree
/// matters here.
pub struct ServiceWorker {
    name: &'static str,
}

impl ServiceWorker {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Worker for ServiceWorker {
    fn name(&self) -> &str {
        self.name
    }

    async fn init(&self) -> Result<(), WorkerError> {
        debug!(service = self.name, "service ready");
        Ok(())
    }

    async fn run(&self, mut shutdown: Shutdown) -> Result<(), WorkerError> {
        shutdown.requested().await;
        if self.name == ENDPOINT_SUPERVISOR {
            warn!("public endpoint closed");
        }
        Ok(())
    }
}
