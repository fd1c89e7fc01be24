//! Interface addresses and command/event descriptors.
//!
//! An interface is addressed by the triple process / component /
//! interface name. The same triple names both provided and required
//! interfaces; which side it refers to is determined by the role it
//! plays in a connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully-qualified name of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub process: String,
    pub component: String,
    pub interface: String,
}

impl InterfaceAddress {
    pub fn new(
        process: impl Into<String>,
        component: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            process: process.into(),
            component: component.into(),
            interface: interface.into(),
        }
    }

    /// Colon-separated unique id, used as map key and in log lines.
    pub fn uid(&self) -> String {
        format!("{}:{}:{}", self.process, self.component, self.interface)
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.process, self.component, self.interface)
    }
}

/// Which side of a connection an interface plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceRole {
    /// Offers commands, emits events.
    Provided,
    /// Consumes commands, observes events.
    Required,
}

/// Endpoints of one connection: the required (client) side, the
/// provided (server) side, and the identity that asked for the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub client: InterfaceAddress,
    pub server: InterfaceAddress,
    /// Who requested the connection, usually the client's process.
    pub requester: String,
}

impl fmt::Display for ConnectionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (by {})", self.client, self.server, self.requester)
    }
}

/// Execution semantics of a command exposed by a provided interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// No argument, no result.
    Void,
    /// One argument, no result.
    Write,
    /// No argument, one result.
    Read,
    /// One argument, one result.
    QualifiedRead,
}

impl CommandKind {
    pub fn takes_argument(&self) -> bool {
        matches!(self, CommandKind::Write | CommandKind::QualifiedRead)
    }

    pub fn returns_result(&self) -> bool {
        matches!(self, CommandKind::Read | CommandKind::QualifiedRead)
    }
}

/// Payload shape of an event emitted by a provided interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// No payload.
    Void,
    /// One payload value.
    Write,
}

/// One command in an interface description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub kind: CommandKind,
}

/// One event in an interface description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub name: String,
    pub kind: EventKind,
}
