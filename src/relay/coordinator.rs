//! Coordinator
//!
//! Owns the registry of live connections and makes every routing decision.
//! All access goes through a single command channel drained by one task, so
//! register, unregister and route are applied one at a time in arrival order
//! and the registry needs no locking.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::connection::{Connection, ConnectionInfo};
use crate::metrics::RelayMetrics;
use crate::protocol::Envelope;
use crate::Result;

use super::registry::Registry;

/// Control signals accepted by the Coordinator loop
#[derive(Debug)]
pub enum Command {
    Register(Connection),
    /// Register and report whether the identifier was free
    Admit(Connection, oneshot::Sender<bool>),
    Unregister(String),
    Route(Envelope),
    Snapshot(oneshot::Sender<Vec<ConnectionInfo>>),
}

/// The control loop state. Build one with [`Coordinator::new`] and drive it with [`Coordinator::run`].
pub struct Coordinator {
    registry: Registry,
    commands: mpsc::UnboundedReceiver<Command>,
    metrics: Arc<RelayMetrics>,
}

/// Cheap, cloneable entry point into a running Coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
    metrics: Arc<RelayMetrics>,
}

impl Coordinator {
    /// Create a Coordinator and the handle that feeds it
    pub fn new(metrics: Arc<RelayMetrics>) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            registry: Registry::new(),
            commands: rx,
            metrics: Arc::clone(&metrics),
        };
        let handle = CoordinatorHandle {
            commands: tx,
            metrics,
        };
        (coordinator, handle)
    }

    /// Create a Coordinator and run it on its own task
    pub fn spawn(metrics: Arc<RelayMetrics>) -> (CoordinatorHandle, JoinHandle<()>) {
        let (coordinator, handle) = Self::new(metrics);
        let task = tokio::spawn(coordinator.run());
        (handle, task)
    }

    /// Serve commands until every handle has been dropped
    pub async fn run(mut self) {
        info!("Coordinator started");

        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }

        info!(
            remaining = self.registry.len(),
            "All coordinator handles dropped, coordinator stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register(connection) => {
                self.register(connection);
            }
            Command::Admit(connection, reply) => {
                let admitted = self.register(connection);
                let _ = reply.send(admitted);
            }
            Command::Unregister(id) => self.unregister(&id),
            Command::Route(envelope) => self.route(&envelope),
            Command::Snapshot(reply) => {
                // The requester may have given up waiting
                let _ = reply.send(self.registry.infos());
            }
        }
    }

    fn register(&mut self, connection: Connection) -> bool {
        let id = connection.id().to_string();
        let addr = connection.addr().to_string();

        if let Err(rejected) = self.registry.insert(connection) {
            // Dropping the newcomer closes its queue, which closes its socket
            error!(conn_id = %rejected.id(), addr = %rejected.addr(), "Connection identifier already registered, rejecting");
            return false;
        }

        let active = self.registry.len();
        self.metrics.connection_registered(active);
        info!(conn_id = %id, addr = %addr, active, "Connection registered");

        self.route(&Envelope::join_notice(&id, &addr));
        true
    }

    fn unregister(&mut self, id: &str) {
        let Some(connection) = self.registry.remove(id) else {
            debug!(conn_id = %id, "Connection already unregistered");
            return;
        };

        let addr = connection.addr().to_string();
        // Closes the delivery queue; the outbound pump drains it and says goodbye
        drop(connection);

        let active = self.registry.len();
        self.metrics.connection_unregistered(active);
        info!(conn_id = %id, addr = %addr, active, "Connection unregistered");

        self.route(&Envelope::leave_notice(id, &addr));
    }

    fn route(&mut self, envelope: &Envelope) {
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(sender = %envelope.sender, "Dropping envelope: {:#}", e);
                return;
            }
        };

        let report = self.registry.route(envelope, &payload);
        self.metrics.message_routed(report.delivered, report.dropped);

        debug!(
            sender = %envelope.sender,
            recipient = %envelope.recipient,
            delivered = report.delivered,
            dropped = report.dropped,
            "Routed envelope"
        );
    }
}

impl CoordinatorHandle {
    /// Start tracking a connection and announce it to everyone, itself included
    pub fn register(&self, connection: Connection) -> Result<()> {
        self.send(Command::Register(connection))
    }

    /// Register a connection and wait for the verdict. `false` means the
    /// identifier was already taken and the connection has been dropped.
    pub async fn admit(&self, connection: Connection) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Admit(connection, tx))?;
        rx.await
            .map_err(|_| anyhow!("Coordinator stopped before admitting connection"))
    }

    /// Stop tracking a connection and announce its departure. Unknown or
    /// already removed identifiers are ignored.
    pub fn unregister(&self, id: &str) -> Result<()> {
        self.send(Command::Unregister(id.to_string()))
    }

    /// Deliver an envelope to its recipient, or to everyone when it has none
    pub fn route(&self, envelope: Envelope) -> Result<()> {
        self.send(Command::Route(envelope))
    }

    /// Currently registered connections, sorted by identifier. Answered in
    /// order with every command sent before it.
    pub async fn snapshot(&self) -> Result<Vec<ConnectionInfo>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await
            .map_err(|_| anyhow!("Coordinator stopped before answering snapshot"))
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Coordinator is no longer running"))
    }
}
