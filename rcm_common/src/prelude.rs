//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use rcm_common::prelude::*;` and get
//! the most important types without listing individual paths.

use std::time::Duration;

// ─── Payloads ───────────────────────────────────────────────────────
pub use crate::arg_value::ArgValue;

// ─── Addressing ─────────────────────────────────────────────────────
pub use crate::address::{
    CommandDescriptor, CommandKind, ConnectionDescription, EventDescriptor, EventKind,
    InterfaceAddress, InterfaceRole,
};

// ─── Time ───────────────────────────────────────────────────────────
pub use crate::time::{ManualClock, MonotonicClock, TimeSource};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, NodeConfig};

/// Default component cycle time in microseconds (1ms = 1000us).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Default component cycle time as Duration.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(DEFAULT_CYCLE_TIME_US as u64);
