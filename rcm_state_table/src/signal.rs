//! Typed signal columns and validated accessors.
//!
//! Each signal owns a working copy (written by the table writer during
//! the cycle) and a fixed circular history (committed once per cycle by
//! the sweep in `advance()`). Readers copy a slot first and validate
//! the tick afterwards, the same conflict-detection order a seqlock
//! uses: a torn copy is discarded because the tick no longer matches.

use crate::error::{StateTableError, TableResult};
use crate::index::TimeIndex;
use crate::table::StateTable;
use std::any::Any;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

/// Value types a state table can hold.
///
/// `Copy` keeps the per-cycle sweep a plain memcpy; `Default` provides
/// the initial history contents.
pub trait StateValue: Copy + Default + Send + Sync + std::fmt::Debug + 'static {}
impl<T> StateValue for T where T: Copy + Default + Send + Sync + std::fmt::Debug + 'static {}

/// Identifier of one registered signal, stable for the table's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    /// Raw column index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One signal column: working copy plus circular history.
pub(crate) struct Column<T> {
    name: String,
    working: UnsafeCell<T>,
    history: Box<[UnsafeCell<T>]>,
}

// The working copy is touched only through the unique TableWriter, and
// history reads are validated against the tick array after the copy.
unsafe impl<T: StateValue> Sync for Column<T> {}

impl<T: StateValue> Column<T> {
    pub(crate) fn new(name: impl Into<String>, capacity: usize) -> Self {
        let history = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            name: name.into(),
            working: UnsafeCell::new(T::default()),
            history,
        }
    }

    /// # Safety
    ///
    /// Caller must be the unique table writer.
    pub(crate) unsafe fn set_working(&self, value: T) {
        unsafe { *self.working.get() = value };
    }

    /// # Safety
    ///
    /// Caller must be the unique table writer.
    pub(crate) unsafe fn working(&self) -> T {
        unsafe { *self.working.get() }
    }

    /// # Safety
    ///
    /// `slot` must be in range. The copy may race with the writer; the
    /// caller is responsible for validating the row tick afterwards and
    /// discarding the value on mismatch.
    pub(crate) unsafe fn read_slot(&self, slot: usize) -> T {
        unsafe { std::ptr::read(self.history[slot].get()) }
    }
}

/// Object-safe view of a column, used by the per-cycle sweep and for
/// accessor construction.
pub(crate) trait AnyColumn: Send + Sync {
    fn name(&self) -> &str;

    /// Copy the working value into `history[slot]`. Writer-only.
    fn commit(&self, slot: usize);

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: StateValue> AnyColumn for Column<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&self, slot: usize) {
        // Only reachable from TableWriter::advance, which is the unique
        // writer. Readers detect the overlap via the tick check.
        unsafe { std::ptr::write(self.history[slot].get(), *self.working.get()) };
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Read handle for one signal, shareable across threads.
pub struct Accessor<T: StateValue> {
    table: Arc<StateTable>,
    column: Arc<Column<T>>,
}

impl<T: StateValue> Accessor<T> {
    pub(crate) fn new(table: Arc<StateTable>, column: Arc<Column<T>>) -> Self {
        Self { table, column }
    }

    /// Read the row `index` refers to.
    ///
    /// # Errors
    ///
    /// - `ForeignIndex` if the index came from another table
    /// - `StaleIndex` if the row has been overwritten since the index
    ///   was taken
    pub fn get(&self, index: &TimeIndex) -> TableResult<T> {
        if index.capacity() != self.table.capacity() || index.slot() >= index.capacity() {
            return Err(StateTableError::ForeignIndex);
        }

        let value = unsafe { self.column.read_slot(index.slot()) };

        // Barrier between the data copy and the tick check, mirroring
        // a seqlock's read side.
        fence(Ordering::Acquire);

        if self.table.validate_index(index) {
            Ok(value)
        } else {
            Err(StateTableError::StaleIndex { ticks: index.ticks() })
        }
    }

    /// Read the most recently published row, retrying if the writer
    /// laps the snapshot mid-read.
    pub fn get_latest(&self) -> TableResult<(T, TimeIndex)> {
        const MAX_RETRIES: usize = 10;

        let mut last_err = StateTableError::StaleIndex { ticks: 0 };
        for _attempt in 0..MAX_RETRIES {
            let index = self.table.index_reader();
            match self.get(&index) {
                Ok(value) => return Ok((value, index)),
                Err(e @ StateTableError::StaleIndex { .. }) => {
                    last_err = e;
                    std::thread::yield_now();
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Read the delayed row (read index minus the configured delay).
    pub fn get_delayed(&self) -> TableResult<(T, TimeIndex)> {
        let index = self.table.index_delayed();
        let value = self.get(&index)?;
        Ok((value, index))
    }

    /// Table this accessor reads from.
    pub fn table(&self) -> &Arc<StateTable> {
        &self.table
    }
}

impl<T: StateValue> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            column: Arc::clone(&self.column),
        }
    }
}
