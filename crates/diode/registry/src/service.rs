//! Registry actor
//!
//! Owns a [`DiodeRegistry`] on a tokio task and serializes every operation
//! through a channel, so callers on other tasks share one consistent state.

use alloy_primitives::{B256, U256};
use diode_staking::{Bucket, ParticipantKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{BlockProducer, DiodeRegistry, Operation, Receipt, RegistryError, RegistryEvent};

/// Default capacity of the request channel
pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 1024;

/// Service errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Operation failed inside the registry
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Service has shut down
    #[error("Registry service closed")]
    Closed,

    /// Service dropped the request without replying
    #[error("Registry service dropped the reply")]
    ReplyDropped,
}

/// Summary of the registry state after the last operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Current execution height
    pub height: u64,
    /// Hash of the last sealed block, the newest a ticket can reference
    pub parent_hash: Option<B256>,
    /// Remaining reward pool
    pub reward_pool: U256,
    /// Deployed fleets
    pub fleets: usize,
    /// Miners and fleets with a stake record
    pub participants: usize,
    /// Sum of every stake bucket
    pub total_stake: U256,
    /// Events emitted so far
    pub events: usize,
}

impl RegistrySnapshot {
    fn of<C: BlockProducer>(registry: &DiodeRegistry<C>) -> Self {
        Self {
            height: registry.height(),
            parent_hash: registry.height().checked_sub(1).and_then(|h| registry.chain().block_hash(h)),
            reward_pool: registry.reward_pool(),
            fleets: registry.fleets().len(),
            participants: registry.ledger().len(),
            total_stake: registry.ledger().total_value(),
            events: registry.events().len(),
        }
    }
}

/// Messages sent to the registry service
#[derive(Debug)]
enum ServiceMessage {
    /// Apply an operation and reply with its receipt
    Apply { op: Operation, reply: oneshot::Sender<Result<Receipt, RegistryError>> },
    /// Read one stake bucket at the current height
    Value { bucket: u8, who: ParticipantKind, reply: oneshot::Sender<Result<U256, RegistryError>> },
    /// Stop the service
    Shutdown,
}

/// Handle to a running registry service
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<ServiceMessage>,
    snapshot: watch::Receiver<RegistrySnapshot>,
    events: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Apply an operation and wait for its receipt
    pub async fn apply(&self, op: Operation) -> Result<Receipt, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ServiceMessage::Apply { op, reply }).await.map_err(|_| ServiceError::Closed)?;
        Ok(rx.await.map_err(|_| ServiceError::ReplyDropped)??)
    }

    /// Bucket value of a miner or fleet, settled at the current height
    pub async fn value(&self, bucket: u8, who: ParticipantKind) -> Result<U256, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ServiceMessage::Value { bucket, who, reply }).await.map_err(|_| ServiceError::Closed)?;
        Ok(rx.await.map_err(|_| ServiceError::ReplyDropped)??)
    }

    /// State after the last applied operation
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch state changes
    pub fn watch(&self) -> watch::Receiver<RegistrySnapshot> {
        self.snapshot.clone()
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Whether the service still accepts requests
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Stop the service after queued requests are handled
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.tx.send(ServiceMessage::Shutdown).await.map_err(|_| ServiceError::Closed)
    }
}

/// Registry actor
#[derive(Debug)]
pub struct RegistryService<C> {
    registry: DiodeRegistry<C>,
    rx: mpsc::Receiver<ServiceMessage>,
    snapshot: watch::Sender<RegistrySnapshot>,
    events: broadcast::Sender<RegistryEvent>,
}

impl<C: BlockProducer> RegistryService<C> {
    /// Create a service and its handle
    pub fn new(registry: DiodeRegistry<C>, capacity: usize) -> (Self, RegistryHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (snapshot, snapshot_rx) = watch::channel(RegistrySnapshot::of(&registry));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = RegistryHandle { tx, snapshot: snapshot_rx, events: events.clone() };
        (Self { registry, rx, snapshot, events }, handle)
    }

    /// Run until shut down or every handle is dropped, returning the registry
    pub async fn run(mut self) -> DiodeRegistry<C> {
        info!(target: "diode::service", height = self.registry.height(), "Registry service started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                ServiceMessage::Apply { op, reply } => {
                    let name = op.name();
                    let result = self.registry.apply(op);
                    match &result {
                        Ok(receipt) => {
                            debug!(
                                target: "diode::service",
                                op = name,
                                height = receipt.height,
                                events = receipt.events.len(),
                                "Operation applied"
                            );
                            for event in &receipt.events {
                                // No subscribers is fine
                                let _ = self.events.send(event.clone());
                            }
                            self.snapshot.send_replace(RegistrySnapshot::of(&self.registry));
                        }
                        Err(err) => {
                            warn!(target: "diode::service", op = name, %err, "Operation failed");
                        }
                    }
                    if reply.send(result).is_err() {
                        debug!(target: "diode::service", op = name, "Caller went away before the reply");
                    }
                }
                ServiceMessage::Value { bucket, who, reply } => {
                    let value = Bucket::try_from(bucket)
                        .map(|bucket| self.registry.ledger().value(bucket, who, self.registry.height()))
                        .map_err(RegistryError::from);
                    let _ = reply.send(value);
                }
                ServiceMessage::Shutdown => {
                    info!(target: "diode::service", "Registry service shutting down");
                    break;
                }
            }
        }

        info!(target: "diode::service", height = self.registry.height(), "Registry service stopped");
        self.registry
    }
}

/// Spawn a registry service on the current tokio runtime
pub fn spawn_registry_service<C>(registry: DiodeRegistry<C>) -> (RegistryHandle, JoinHandle<DiodeRegistry<C>>)
where
    C: BlockProducer + Send + 'static,
{
    let (service, handle) = RegistryService::new(registry, DEFAULT_REQUEST_CAPACITY);
    (handle, tokio::spawn(service.run()))
}
