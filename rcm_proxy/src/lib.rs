//! RCM Interface Proxy Layer
//!
//! Makes a provided interface callable from another process: an
//! [`InterfaceServer`] holds the real command targets and event
//! sources, an [`InterfaceClient`] mirrors them behind a connected
//! transport. Commands and events are addressed by generation-checked
//! handles, never by raw identifiers a stale peer could replay, and
//! payloads cross the wire in a self-describing form.
//!
//! # Module Structure
//!
//! - [`server`] - Server end: dispatch, execution, event fan-out
//! - [`client`] - Client end: remote functions and event handlers
//! - [`message`] - Wire messages and frame codec
//! - [`transport`] - Transport trait, TCP and loopback implementations
//! - [`handle`] - Generation-checked handle table
//! - [`serializer`] - Pluggable payload serialization
//! - [`error`] - Error types

pub mod client;
pub mod error;
pub mod handle;
pub mod message;
pub mod serializer;
pub mod server;
pub mod transport;

pub use client::{ClientSettings, InterfaceClient, RemoteFunction};
pub use error::{ProxyError, ProxyResult, TransportError};
pub use handle::{Handle, HandleTable};
pub use message::{CommandHandleEntry, CommandOutcome, EventHandleEntry, Message};
pub use serializer::{JsonSerializer, PayloadSerializer};
pub use server::{CommandTarget, EventEmitter, InterfaceServer, ServerSettings};
pub use transport::{TransportPair, TransportRx, TransportTx};
