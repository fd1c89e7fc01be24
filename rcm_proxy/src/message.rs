//! Wire messages and frame codec.
//!
//! Frames are bincode-encoded [`Message`] values; the transport adds a
//! length prefix. Command and event payloads stay opaque byte blobs at
//! this level, produced by the interface's payload serializer, so the
//! envelope codec and the payload encoding can evolve independently.

use crate::error::ProxyError;
use crate::handle::Handle;
use rcm_common::address::{CommandKind, EventKind};
use serde::{Deserialize, Serialize};

/// Upper bound a receiver accepts for one frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One command the server offers, as announced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHandleEntry {
    pub name: String,
    pub kind: CommandKind,
    pub handle: Handle,
}

/// One event the server emits, as announced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandleEntry {
    pub name: String,
    pub kind: EventKind,
    pub handle: Handle,
}

/// Result of a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// Queued for execution (non-blocking void/write).
    Accepted,
    /// Executed; `payload` carries the serialized result for read
    /// commands.
    Done { payload: Option<Vec<u8>> },
    /// Rejected or failed on the server.
    Failed { reason: String },
}

/// Everything that crosses an interface proxy connection.
///
/// `seq` correlates a request with its reply; events carry none, they
/// are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Client asks for the command table.
    FetchCommandHandles { seq: u64 },
    CommandHandles {
        seq: u64,
        entries: Vec<CommandHandleEntry>,
    },
    /// Client asks for the event table; this also opts the connection
    /// in to event delivery.
    FetchEventHandles { seq: u64 },
    EventHandles {
        seq: u64,
        entries: Vec<EventHandleEntry>,
    },
    ExecuteCommand {
        seq: u64,
        handle: Handle,
        /// Wait for execution instead of queueing (void/write only).
        blocking: bool,
        payload: Option<Vec<u8>>,
    },
    CommandResult { seq: u64, outcome: CommandOutcome },
    Event {
        handle: Handle,
        payload: Option<Vec<u8>>,
    },
    Ping,
    Pong,
    /// Orderly goodbye; the receiver drops the connection.
    Bye,
}

/// Encode a message body (without the transport's length prefix).
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, ProxyError> {
    bincode::serialize(message).map_err(|e| ProxyError::Codec { reason: e.to_string() })
}

/// Decode a received message body.
pub fn decode_frame(body: &[u8]) -> Result<Message, ProxyError> {
    bincode::deserialize(body).map_err(|e| ProxyError::Codec { reason: e.to_string() })
}
