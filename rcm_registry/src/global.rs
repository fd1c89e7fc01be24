//! The connection broker and its background worker.
//!
//! All state lives in owned stores behind separate mutexes: the process
//! map, the connection map, and a connect gate that serializes
//! connection attempts and owns the next id. Disconnects are two-phase:
//! the caller queues the id on a bounded channel and one background
//! worker finishes the teardown, so component threads never tear down
//! connections inline. The same worker periodically force-disconnects
//! connections stuck in `Pending` past the confirmation timeout.

use crate::connection::{Connection, ConnectionId, ConnectionState, ConnectionStore};
use crate::entry::ProcessStore;
use crate::error::{RegistryError, RegistryResult};
use crate::local::{InterfaceDescription, LocalRegistry};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use rcm_common::address::{
    CommandDescriptor, ConnectionDescription, EventDescriptor, InterfaceAddress, InterfaceRole,
};
use rcm_common::config::RegistryConfig;
use rcm_common::time::TimeSource;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the proxy component representing `component` of `process`
/// inside a peer process.
pub fn proxy_component_name(process: &str, component: &str) -> String {
    format!("{process}.{component}Proxy")
}

/// Broker tuning, usually taken from [`RegistryConfig`].
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Seconds a connection may stay `Pending` before the worker
    /// force-disconnects it.
    pub confirm_timeout_s: f64,
    /// Interval of the worker's timeout scan.
    pub scan_interval: Duration,
    /// Depth of the bounded disconnect queue.
    pub disconnect_queue_depth: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

impl From<&RegistryConfig> for RegistrySettings {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            confirm_timeout_s: config.confirm_timeout_s,
            scan_interval: Duration::from_millis(config.scan_interval_ms),
            disconnect_queue_depth: config.disconnect_queue_depth,
        }
    }
}

enum WorkerMsg {
    Disconnect(ConnectionId),
    Shutdown,
}

/// Process-spanning connection registry.
pub struct GlobalRegistry {
    processes: Mutex<ProcessStore>,
    connections: Mutex<ConnectionStore>,
    /// Per-process interface catalogs, for the descriptor queries.
    catalogs: Mutex<BTreeMap<String, Arc<LocalRegistry>>>,
    /// Serializes connect attempts and owns the next connection id, so
    /// the existence check and the id reservation are one atomic step.
    /// Ids are never reused; an issued id below the gate with no record
    /// left in the connection map has been torn down.
    connect_gate: Mutex<u32>,
    /// Disconnects queued but not yet finished by the worker.
    waiting: Mutex<HashSet<ConnectionId>>,
    disconnect_tx: Sender<WorkerMsg>,
    worker: Mutex<Option<JoinHandle<()>>>,
    settings: RegistrySettings,
    clock: Arc<dyn TimeSource>,
}

impl GlobalRegistry {
    pub fn new(settings: RegistrySettings, clock: Arc<dyn TimeSource>) -> Arc<Self> {
        let (tx, rx) = bounded(settings.disconnect_queue_depth);
        let registry = Arc::new(Self {
            processes: Mutex::new(ProcessStore::default()),
            connections: Mutex::new(ConnectionStore::default()),
            catalogs: Mutex::new(BTreeMap::new()),
            connect_gate: Mutex::new(0),
            waiting: Mutex::new(HashSet::new()),
            disconnect_tx: tx,
            worker: Mutex::new(None),
            settings,
            clock,
        });

        let weak = Arc::downgrade(&registry);
        let scan_interval = registry.settings.scan_interval;
        let handle = std::thread::Builder::new()
            .name("rcm-registry".to_string())
            .spawn(move || worker_loop(weak, rx, scan_interval))
            .map_err(|e| warn!(error = %e, "failed to spawn registry worker"))
            .ok();
        *registry.worker.lock() = handle;

        registry
    }

    /// Stop the background worker and wait for it. Runs any still
    /// queued disconnects first.
    pub fn shutdown(&self) {
        let _ = self.disconnect_tx.send(WorkerMsg::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    // ─── Process / component / interface registration ───────────────

    pub fn add_process(&self, name: &str) -> RegistryResult<()> {
        self.processes.lock().add_process(name)?;
        info!(process = name, "process registered");
        Ok(())
    }

    /// Make `catalog`'s interface descriptions queryable through this
    /// registry. Its process must already be registered.
    pub fn attach_catalog(&self, catalog: Arc<LocalRegistry>) -> RegistryResult<()> {
        let process = catalog.process_name().to_string();
        if !self.processes.lock().has_process(&process) {
            return Err(RegistryError::ProcessNotFound { name: process });
        }
        self.catalogs.lock().insert(process, catalog);
        Ok(())
    }

    /// Remove a process and everything it owns. Connections touching
    /// the process are torn down synchronously, so when this returns no
    /// connection referencing it remains. `network_disconnect` marks
    /// the dead-peer path: the process vanished rather than left, and
    /// proxy components it contributed to other processes are purged.
    pub fn remove_process(&self, name: &str, network_disconnect: bool) -> RegistryResult<()> {
        let ids: Vec<ConnectionId> = {
            let connections = self.connections.lock();
            connections
                .iter()
                .filter(|c| {
                    c.description.client.process == name || c.description.server.process == name
                })
                .map(|c| c.id)
                .collect()
        };
        for id in ids {
            self.finish_disconnect(id);
        }
        if network_disconnect {
            let prefix = format!("{name}.");
            let mut processes = self.processes.lock();
            for process in processes.process_names() {
                for component in processes.component_names(&process) {
                    if component.starts_with(&prefix) && component.ends_with("Proxy") {
                        let _ = processes.remove_component(&process, &component);
                    }
                }
            }
        }
        self.catalogs.lock().remove(name);
        self.processes.lock().remove_process(name)?;
        if network_disconnect {
            warn!(process = name, "process lost, removed from registry");
        } else {
            info!(process = name, "process removed");
        }
        Ok(())
    }

    pub fn add_component(&self, process: &str, component: &str) -> RegistryResult<()> {
        self.processes.lock().add_component(process, component)?;
        debug!(process, component, "component registered");
        Ok(())
    }

    /// Remove a component, tearing down its interfaces' connections
    /// synchronously.
    pub fn remove_component(&self, process: &str, component: &str) -> RegistryResult<()> {
        let ids: Vec<ConnectionId> = {
            let connections = self.connections.lock();
            connections
                .iter()
                .filter(|c| {
                    let d = &c.description;
                    (d.client.process == process && d.client.component == component)
                        || (d.server.process == process && d.server.component == component)
                })
                .map(|c| c.id)
                .collect()
        };
        for id in ids {
            self.finish_disconnect(id);
        }
        self.processes.lock().remove_component(process, component)
    }

    pub fn add_interface(
        &self,
        address: &InterfaceAddress,
        role: InterfaceRole,
    ) -> RegistryResult<()> {
        self.processes.lock().add_interface(address, role)?;
        debug!(interface = %address, ?role, "interface registered");
        Ok(())
    }

    /// Remove an interface, tearing down its connections synchronously.
    pub fn remove_interface(
        &self,
        address: &InterfaceAddress,
        role: InterfaceRole,
    ) -> RegistryResult<()> {
        let ids = self.processes.lock().connections_of(address, role);
        for id in ids {
            self.finish_disconnect(id);
        }
        self.processes.lock().remove_interface(address, role)
    }

    // ─── Connection lifecycle ───────────────────────────────────────

    /// Connect a required interface to a provided one on behalf of
    /// `requester`. Reserves a fresh id and records the connection as
    /// `Pending`; for connections spanning processes, proxy components
    /// are recorded on both sides. The caller drives the rest of the
    /// handshake: [`initiate_connect`](Self::initiate_connect),
    /// [`connect_server_side_interface`](Self::connect_server_side_interface),
    /// then [`connect_confirm`](Self::connect_confirm).
    ///
    /// A failed attempt never consumes an id: all checks run before the
    /// reservation, under the connect gate.
    pub fn connect(
        &self,
        requester: &str,
        client: &InterfaceAddress,
        server: &InterfaceAddress,
    ) -> RegistryResult<ConnectionId> {
        let mut next_id = self.connect_gate.lock();

        {
            let processes = self.processes.lock();
            if !processes.has_interface(client, InterfaceRole::Required) {
                return Err(RegistryError::InterfaceNotFound { uid: client.uid() });
            }
            if !processes.has_interface(server, InterfaceRole::Provided) {
                return Err(RegistryError::InterfaceNotFound { uid: server.uid() });
            }
        }

        if self.is_connected(client, server) {
            return Err(RegistryError::AlreadyConnected {
                client: client.uid(),
                server: server.uid(),
            });
        }

        if *next_id == u32::MAX {
            return Err(RegistryError::IdSpaceExhausted);
        }
        let id = ConnectionId(*next_id);

        {
            let mut processes = self.processes.lock();
            processes.attach_connection(client, InterfaceRole::Required, id)?;
            if let Err(e) = processes.attach_connection(server, InterfaceRole::Provided, id) {
                processes.detach_connection(client, InterfaceRole::Required, id);
                return Err(e);
            }
        }

        let description = ConnectionDescription {
            client: client.clone(),
            server: server.clone(),
            requester: requester.to_string(),
        };
        let remote = description.client.process != description.server.process;
        self.connections.lock().insert(Connection {
            id,
            description,
            state: ConnectionState::Pending,
            client_ready: false,
            server_ready: false,
            created: self.clock.now(),
        });
        *next_id += 1;
        drop(next_id);

        if remote {
            self.register_proxy_components(client, server);
        }

        info!(connection = %id, requester, client = %client, server = %server, "connection pending");
        Ok(id)
    }

    /// Client side starts building its proxy for a pending connection.
    /// Returns the description so the caller knows what to wire up.
    pub fn initiate_connect(&self, id: ConnectionId) -> RegistryResult<ConnectionDescription> {
        let mut connections = self.connections.lock();
        let connection = connections
            .get_mut(id)
            .ok_or(RegistryError::ConnectionNotFound { id })?;
        match connection.state {
            ConnectionState::Pending => {
                connection.client_ready = true;
                debug!(connection = %id, "client side wiring under way");
                Ok(connection.description.clone())
            }
            _ => Err(RegistryError::NotPending { id }),
        }
    }

    /// Server side counterpart of [`initiate_connect`](Self::initiate_connect).
    pub fn connect_server_side_interface(
        &self,
        id: ConnectionId,
    ) -> RegistryResult<ConnectionDescription> {
        let mut connections = self.connections.lock();
        let connection = connections
            .get_mut(id)
            .ok_or(RegistryError::ConnectionNotFound { id })?;
        match connection.state {
            ConnectionState::Pending => {
                connection.server_ready = true;
                debug!(connection = %id, "server side wiring under way");
                Ok(connection.description.clone())
            }
            _ => Err(RegistryError::NotPending { id }),
        }
    }

    /// Report both sides wired; transitions `Pending` to `Confirmed`.
    /// Fails for unknown ids and for connections already disconnecting.
    pub fn connect_confirm(&self, id: ConnectionId) -> RegistryResult<()> {
        let mut connections = self.connections.lock();
        let connection = connections
            .get_mut(id)
            .ok_or(RegistryError::ConnectionNotFound { id })?;
        match connection.state {
            ConnectionState::Pending => {
                if !(connection.client_ready && connection.server_ready) {
                    debug!(connection = %id, "confirmed without both sides reporting in");
                }
                connection.state = ConnectionState::Confirmed;
                info!(connection = %id, "connection confirmed");
                Ok(())
            }
            _ => Err(RegistryError::NotPending { id }),
        }
    }

    /// Queue a disconnect and mark the connection `Disconnecting`.
    /// Idempotent: a connection already queued or already torn down is
    /// a no-op; an id never issued is an error.
    pub fn disconnect(&self, id: ConnectionId) -> RegistryResult<()> {
        let issued = id.0 < *self.connect_gate.lock();
        let previous = {
            let mut waiting = self.waiting.lock();
            if waiting.contains(&id) {
                debug!(connection = %id, "disconnect already in progress");
                return Ok(());
            }
            let mut connections = self.connections.lock();
            match connections.get_mut(id) {
                Some(connection) => {
                    let previous = connection.state;
                    connection.state = ConnectionState::Disconnecting;
                    waiting.insert(id);
                    previous
                }
                None if issued => {
                    debug!(connection = %id, "disconnect already done");
                    return Ok(());
                }
                None => return Err(RegistryError::ConnectionNotFound { id }),
            }
        };

        match self.disconnect_tx.try_send(WorkerMsg::Disconnect(id)) {
            Ok(()) => Ok(()),
            Err(send_error) => {
                self.waiting.lock().remove(&id);
                if let Some(connection) = self.connections.lock().get_mut(id) {
                    connection.state = previous;
                }
                match send_error {
                    TrySendError::Full(_) => {
                        warn!(connection = %id, "disconnect queue full");
                        Err(RegistryError::DisconnectQueueFull { id })
                    }
                    TrySendError::Disconnected(_) => Err(RegistryError::WorkerGone),
                }
            }
        }
    }

    /// Queue a disconnect by its endpoint pair instead of its id.
    pub fn disconnect_by_endpoints(
        &self,
        client: &InterfaceAddress,
        server: &InterfaceAddress,
    ) -> RegistryResult<()> {
        let id = self
            .connections
            .lock()
            .iter()
            .find(|c| c.description.client == *client && c.description.server == *server)
            .map(|c| c.id)
            .ok_or_else(|| RegistryError::NotConnected {
                client: client.uid(),
                server: server.uid(),
            })?;
        self.disconnect(id)
    }

    /// Block until no queued disconnect remains, up to `timeout`.
    /// Mainly for orderly shutdown and tests.
    pub fn flush_disconnects(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.waiting.lock().is_empty() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.waiting.lock().is_empty()
    }

    // ─── Queries ────────────────────────────────────────────────────

    pub fn process_names(&self) -> Vec<String> {
        self.processes.lock().process_names()
    }

    pub fn has_process(&self, name: &str) -> bool {
        self.processes.lock().has_process(name)
    }

    pub fn component_names(&self, process: &str) -> Vec<String> {
        self.processes.lock().component_names(process)
    }

    pub fn has_component(&self, process: &str, component: &str) -> bool {
        self.processes.lock().has_component(process, component)
    }

    pub fn interface_names(
        &self,
        process: &str,
        component: &str,
        role: InterfaceRole,
    ) -> Vec<String> {
        self.processes.lock().interface_names(process, component, role)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.lock().get(id).cloned()
    }

    /// State of an id, `Disconnected` for ids whose record is gone.
    /// `None` only for ids never issued.
    pub fn connection_state(&self, id: ConnectionId) -> Option<ConnectionState> {
        let issued = id.0 < *self.connect_gate.lock();
        match self.connections.lock().get(id) {
            Some(connection) => Some(connection.state),
            None if issued => Some(ConnectionState::Disconnected),
            None => None,
        }
    }

    /// Description of a provided interface, answered from the owning
    /// process's attached catalog.
    pub fn interface_description(&self, address: &InterfaceAddress) -> Option<InterfaceDescription> {
        self.catalogs
            .lock()
            .get(&address.process)
            .and_then(|catalog| catalog.description(&address.component, &address.interface))
    }

    pub fn command_descriptors(&self, address: &InterfaceAddress) -> Vec<CommandDescriptor> {
        self.interface_description(address)
            .map(|d| d.commands)
            .unwrap_or_default()
    }

    pub fn event_descriptors(&self, address: &InterfaceAddress) -> Vec<EventDescriptor> {
        self.interface_description(address)
            .map(|d| d.events)
            .unwrap_or_default()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.lock().iter().cloned().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connections_of_interface(
        &self,
        address: &InterfaceAddress,
        role: InterfaceRole,
    ) -> Vec<ConnectionId> {
        self.processes.lock().connections_of(address, role)
    }

    pub fn is_connected(&self, client: &InterfaceAddress, server: &InterfaceAddress) -> bool {
        self.connections
            .lock()
            .iter()
            .any(|c| c.description.client == *client && c.description.server == *server)
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn register_proxy_components(&self, client: &InterfaceAddress, server: &InterfaceAddress) {
        let mut processes = self.processes.lock();
        // The server's component appears as a proxy in the client's
        // process and vice versa. Several connections may share one
        // proxy, so an existing registration is fine.
        let server_proxy = proxy_component_name(&server.process, &server.component);
        match processes.add_component(&client.process, &server_proxy) {
            Ok(()) | Err(RegistryError::ComponentAlreadyRegistered { .. }) => {}
            Err(e) => warn!(error = %e, "failed to register proxy component"),
        }
        let client_proxy = proxy_component_name(&client.process, &client.component);
        match processes.add_component(&server.process, &client_proxy) {
            Ok(()) | Err(RegistryError::ComponentAlreadyRegistered { .. }) => {}
            Err(e) => warn!(error = %e, "failed to register proxy component"),
        }
    }

    /// Tear one connection down: detach it from both endpoints and drop
    /// shared proxy components that no other connection still needs.
    /// Harmless when the connection is already gone.
    fn finish_disconnect(&self, id: ConnectionId) {
        let removed = self.connections.lock().remove(id);

        if let Some(connection) = removed {
            let d = &connection.description;

            let (server_proxy_used, client_proxy_used) = if connection.is_remote() {
                let connections = self.connections.lock();
                let server_proxy_used = connections.iter().any(|c| {
                    c.description.client.process == d.client.process
                        && c.description.server.process == d.server.process
                        && c.description.server.component == d.server.component
                });
                let client_proxy_used = connections.iter().any(|c| {
                    c.description.server.process == d.server.process
                        && c.description.client.process == d.client.process
                        && c.description.client.component == d.client.component
                });
                (server_proxy_used, client_proxy_used)
            } else {
                (true, true)
            };

            let mut processes = self.processes.lock();
            processes.detach_connection(&d.client, InterfaceRole::Required, id);
            processes.detach_connection(&d.server, InterfaceRole::Provided, id);
            if !server_proxy_used {
                let name = proxy_component_name(&d.server.process, &d.server.component);
                let _ = processes.remove_component(&d.client.process, &name);
            }
            if !client_proxy_used {
                let name = proxy_component_name(&d.client.process, &d.client.component);
                let _ = processes.remove_component(&d.server.process, &name);
            }
            info!(connection = %id, description = %d, "connection removed");
        }

        self.waiting.lock().remove(&id);
    }

    /// Force-disconnect connections stuck in `Pending` past the
    /// confirmation timeout. Called by the worker on every scan tick.
    fn check_confirm_timeout(&self) {
        let now = self.clock.now();
        let expired: Vec<ConnectionId> = {
            let connections = self.connections.lock();
            connections
                .iter()
                .filter(|c| c.is_pending_expired(now, self.settings.confirm_timeout_s))
                .map(|c| c.id)
                .collect()
        };
        for id in expired {
            warn!(connection = %id, "connect confirmation timed out, force disconnecting");
            self.finish_disconnect(id);
        }
    }
}

fn worker_loop(registry: Weak<GlobalRegistry>, rx: Receiver<WorkerMsg>, scan_interval: Duration) {
    debug!("registry worker started");
    loop {
        match rx.recv_timeout(scan_interval) {
            Ok(WorkerMsg::Disconnect(id)) => {
                let Some(registry) = registry.upgrade() else { break };
                registry.finish_disconnect(id);
            }
            Ok(WorkerMsg::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {
                let Some(registry) = registry.upgrade() else { break };
                registry.check_confirm_timeout();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("registry worker stopped");
}
