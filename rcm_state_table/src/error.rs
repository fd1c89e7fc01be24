//! Error types for state table operations

use thiserror::Error;

/// Errors that can occur during state table operations
#[derive(Error, Debug)]
pub enum StateTableError {
    /// A signal with this name is already registered
    #[error("Signal already registered: {name}")]
    DuplicateSignal {
        /// Signal name
        name: String,
    },

    /// No signal with this name exists
    #[error("Unknown signal: {name}")]
    UnknownSignal {
        /// Signal name
        name: String,
    },

    /// Signal id out of range for this table
    #[error("Unknown signal id: {id}")]
    UnknownId {
        /// Raw signal index
        id: usize,
    },

    /// Signal exists but holds a different value type
    #[error("Signal type mismatch for {name}: requested {requested}")]
    TypeMismatch {
        /// Signal name
        name: String,
        /// Type the caller asked for
        requested: &'static str,
    },

    /// Signals can only be registered before the first cycle
    #[error("Table already started - signals must be registered before the first cycle")]
    AlreadyStarted,

    /// advance() called without a matching start()
    #[error("advance() called without a matching start()")]
    NotStarted,

    /// The row this index pointed at has been overwritten
    #[error("Stale time index: tick {ticks} has been overwritten")]
    StaleIndex {
        /// Tick the index carried
        ticks: u64,
    },

    /// Index was created against a different table
    #[error("Time index does not belong to this table")]
    ForeignIndex,
}

/// Result type alias for state table operations
pub type TableResult<T> = Result<T, StateTableError>;
