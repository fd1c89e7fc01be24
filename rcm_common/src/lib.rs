//! RCM Common Library
//!
//! This crate provides the shared vocabulary types for all RCM workspace
//! crates: payload values that cross the process boundary, interface
//! addresses and descriptors, the time source abstraction, and
//! configuration loading utilities.
//!
//! # Module Structure
//!
//! - [`arg_value`] - Self-describing command/event payload values
//! - [`address`] - Interface addresses and command/event descriptors
//! - [`time`] - Time source abstraction (monotonic and manual clocks)
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use rcm_common::prelude::*;
//! ```

pub mod address;
pub mod arg_value;
pub mod config;
pub mod prelude;
pub mod time;
