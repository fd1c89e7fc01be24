//! Error types for registry operations

use crate::connection::ConnectionId;
use thiserror::Error;

/// Errors that can occur during registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Process name already registered
    #[error("Process already registered: {name}")]
    ProcessAlreadyRegistered {
        /// Process name
        name: String,
    },

    /// Process not found
    #[error("Process not found: {name}")]
    ProcessNotFound {
        /// Process name
        name: String,
    },

    /// Component name already registered within its process
    #[error("Component already registered: {process}:{component}")]
    ComponentAlreadyRegistered {
        /// Owning process
        process: String,
        /// Component name
        component: String,
    },

    /// Component not found
    #[error("Component not found: {process}:{component}")]
    ComponentNotFound {
        /// Owning process
        process: String,
        /// Component name
        component: String,
    },

    /// Interface already registered on its component
    #[error("Interface already registered: {uid}")]
    InterfaceAlreadyRegistered {
        /// Interface uid (process:component:interface)
        uid: String,
    },

    /// Interface not found
    #[error("Interface not found: {uid}")]
    InterfaceNotFound {
        /// Interface uid (process:component:interface)
        uid: String,
    },

    /// The two endpoints are already connected
    #[error("Already connected: {client} -> {server}")]
    AlreadyConnected {
        /// Client (required) interface uid
        client: String,
        /// Server (provided) interface uid
        server: String,
    },

    /// No connection with this id exists
    #[error("Connection not found: {id}")]
    ConnectionNotFound {
        /// Connection id
        id: ConnectionId,
    },

    /// No connection exists between the two endpoints
    #[error("Not connected: {client} -> {server}")]
    NotConnected {
        /// Client (required) interface uid
        client: String,
        /// Server (provided) interface uid
        server: String,
    },

    /// Connection exists but is not pending confirmation
    #[error("Connection {id} is not pending confirmation")]
    NotPending {
        /// Connection id
        id: ConnectionId,
    },

    /// All connection ids have been handed out
    #[error("Connection id space exhausted")]
    IdSpaceExhausted,

    /// Bounded disconnect queue is full
    #[error("Disconnect queue full, request for {id} rejected")]
    DisconnectQueueFull {
        /// Connection id
        id: ConnectionId,
    },

    /// Background worker has terminated
    #[error("Registry worker is no longer running")]
    WorkerGone,
}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
