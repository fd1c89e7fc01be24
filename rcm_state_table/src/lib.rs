//! RCM State Table
//!
//! A time-indexed circular history of typed signals with a single
//! writer and any number of lock-free readers. The owning component
//! brackets each cycle with [`TableWriter::start`] and
//! [`TableWriter::advance`]; readers hold [`Accessor`] handles and
//! validate every read against the tick stored for the slot, so an
//! overwritten row is reported instead of silently returned.
//!
//! # Module Structure
//!
//! - [`table`] - The table itself and the unique writer capability
//! - [`signal`] - Typed signal columns and validated accessors
//! - [`index`] - Time indices and index ranges
//! - [`collection`] - Data collection scheduling and batch events
//! - [`stats`] - Cycle interval statistics
//! - [`error`] - Error types

pub mod collection;
pub mod error;
pub mod index;
pub mod signal;
pub mod stats;
pub mod table;

pub use collection::CollectionObserver;
pub use error::{StateTableError, TableResult};
pub use index::{IndexRange, TimeIndex};
pub use signal::{Accessor, SignalId, StateValue};
pub use stats::IntervalStatistics;
pub use table::{PERIOD_ID, ROW_END_ID, ROW_START_ID, StateTable, TableWriter};
