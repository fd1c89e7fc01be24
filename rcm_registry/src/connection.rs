//! Connection records and states.

use rcm_common::address::ConnectionDescription;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one connection, unique for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a connection.
///
/// A connection is created `Pending` when the gate reserves its id and
/// becomes `Confirmed` once both sides report their wiring complete.
/// `disconnect` marks it `Disconnecting` until the worker finishes the
/// teardown; `Disconnected` is what remains of an id once its record is
/// gone (ids are never reused, so the registry can still answer for it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Confirmed,
    Disconnecting,
    Disconnected,
}

/// One connection between a required and a provided interface.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub description: ConnectionDescription,
    pub state: ConnectionState,
    /// Client side reported its proxy wiring under way.
    pub client_ready: bool,
    /// Server side reported its proxy wiring under way.
    pub server_ready: bool,
    /// Registry clock time the id was reserved.
    pub created: f64,
}

impl Connection {
    /// True for connections spanning two processes.
    pub fn is_remote(&self) -> bool {
        self.description.client.process != self.description.server.process
    }

    /// Pending longer than `timeout` seconds as of `now`.
    pub fn is_pending_expired(&self, now: f64, timeout: f64) -> bool {
        self.state == ConnectionState::Pending && now - self.created > timeout
    }
}

/// Owned map of all live connections, guarded by one registry mutex.
#[derive(Default)]
pub(crate) struct ConnectionStore {
    connections: BTreeMap<ConnectionId, Connection>,
}

impl ConnectionStore {
    pub(crate) fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.id, connection);
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }
}
