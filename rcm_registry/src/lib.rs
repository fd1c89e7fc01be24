//! RCM Connection Registry
//!
//! Bookkeeping for components, their interfaces, and the connections
//! between them. The [`GlobalRegistry`] spans processes and brokers
//! connection lifecycle (pending, confirmed, disconnected); the
//! [`LocalRegistry`] is each process's catalog of its own interface
//! descriptions; [`ProcessContext`] bundles both with a clock so no
//! part of the system reaches for global state.
//!
//! # Module Structure
//!
//! - [`global`] - The connection broker and its background worker
//! - [`local`] - Per-process interface catalog
//! - [`context`] - Per-process dependency bundle
//! - [`connection`] - Connection records and states
//! - [`entry`] - Process/component/interface store
//! - [`error`] - Error types

pub mod connection;
pub mod context;
pub mod entry;
pub mod error;
pub mod global;
pub mod local;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use context::ProcessContext;
pub use error::{RegistryError, RegistryResult};
pub use global::{GlobalRegistry, RegistrySettings, proxy_component_name};
pub use local::{InterfaceDescription, LocalRegistry};
