//! The state table and its unique writer capability.
//!
//! `StateTable::new` returns the shared table handle together with the
//! one and only [`TableWriter`]. The writer is not `Clone` and its
//! mutating methods take `&mut self`, so the single-writer invariant is
//! enforced by the type system rather than by convention.

use crate::collection::{CollectionObserver, DataCollection};
use crate::error::{StateTableError, TableResult};
use crate::index::TimeIndex;
use crate::signal::{Accessor, AnyColumn, Column, SignalId, StateValue};
use crate::stats::IntervalStatistics;
use parking_lot::{Mutex, RwLock};
use rcm_common::time::TimeSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, error, warn};

/// Timestamp taken after the sweep, committed last (id 0, excluded
/// from the sweep).
pub const ROW_END_ID: SignalId = SignalId(0);
/// Timestamp taken at cycle start (id 1, first column in the sweep).
pub const ROW_START_ID: SignalId = SignalId(1);
/// Measured period between consecutive cycle starts (id 2).
pub const PERIOD_ID: SignalId = SignalId(2);

const MIN_CAPACITY: usize = 3;

/// Time-indexed circular history of typed signals.
///
/// Shared, read-only handle; all mutation goes through the unique
/// [`TableWriter`].
pub struct StateTable {
    name: String,
    capacity: usize,
    /// Tick stored per slot; doubles as the per-row version the
    /// readers validate against.
    ticks: Box<[AtomicU64]>,
    index_writer: AtomicUsize,
    index_reader: AtomicUsize,
    index_delayed: AtomicUsize,
    delay: AtomicUsize,
    average_period_bits: AtomicU64,
    started: AtomicBool,
    columns: RwLock<Vec<Arc<dyn AnyColumn>>>,
    collection: Mutex<DataCollection>,
    stats: Mutex<IntervalStatistics>,
    clock: Arc<dyn TimeSource>,
}

impl StateTable {
    /// Create a table and its writer. `capacity` below 3 is clamped;
    /// one slot is always in flight, so at least two readable rows are
    /// needed for the history to be usable.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        clock: Arc<dyn TimeSource>,
    ) -> (Arc<StateTable>, TableWriter) {
        let name = name.into();
        let capacity = if capacity < MIN_CAPACITY {
            warn!(table = %name, requested = capacity, "history capacity clamped to minimum");
            MIN_CAPACITY
        } else {
            capacity
        };

        let row_end = Arc::new(Column::<f64>::new("row_end", capacity));
        let row_start = Arc::new(Column::<f64>::new("row_start", capacity));
        let period = Arc::new(Column::<f64>::new("period", capacity));

        let columns: Vec<Arc<dyn AnyColumn>> = vec![
            Arc::clone(&row_end) as Arc<dyn AnyColumn>,
            Arc::clone(&row_start) as Arc<dyn AnyColumn>,
            Arc::clone(&period) as Arc<dyn AnyColumn>,
        ];

        let ticks = (0..capacity)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let table = Arc::new(StateTable {
            name,
            capacity,
            ticks,
            index_writer: AtomicUsize::new(0),
            index_reader: AtomicUsize::new(0),
            index_delayed: AtomicUsize::new(0),
            delay: AtomicUsize::new(0),
            average_period_bits: AtomicU64::new(0f64.to_bits()),
            started: AtomicBool::new(false),
            columns: RwLock::new(columns.clone()),
            collection: Mutex::new(DataCollection::new(capacity)),
            stats: Mutex::new(IntervalStatistics::new()),
            clock,
        });

        let writer = TableWriter {
            table: Arc::clone(&table),
            columns,
            row_end,
            row_start,
            period,
            sum_of_periods: 0.0,
            stats: IntervalStatistics::new(),
            in_cycle: false,
        };

        (table, writer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the most recently published row.
    pub fn index_reader(&self) -> TimeIndex {
        let slot = self.index_reader.load(Ordering::Acquire);
        let ticks = self.ticks[slot].load(Ordering::Acquire);
        TimeIndex::new(ticks, slot, self.capacity)
    }

    /// Snapshot of the row currently being written.
    pub fn index_writer(&self) -> TimeIndex {
        let slot = self.index_writer.load(Ordering::Acquire);
        let ticks = self.ticks[slot].load(Ordering::Acquire);
        TimeIndex::new(ticks, slot, self.capacity)
    }

    /// Snapshot of the delayed row (read index minus the configured
    /// delay, saturating at zero).
    pub fn index_delayed(&self) -> TimeIndex {
        let slot = self.index_delayed.load(Ordering::Acquire);
        let ticks = self.ticks[slot].load(Ordering::Acquire);
        TimeIndex::new(ticks, slot, self.capacity)
    }

    /// True while the row `index` refers to is still intact.
    pub fn validate_index(&self, index: &TimeIndex) -> bool {
        index.capacity() == self.capacity
            && index.slot() < self.capacity
            && self.ticks[index.slot()].load(Ordering::Acquire) == index.ticks()
    }

    /// Set the read delay in cycles. Returns the previous delay.
    pub fn set_delay(&self, cycles: usize) -> usize {
        self.delay.swap(cycles, Ordering::AcqRel)
    }

    /// Moving average of the cycle period over the last
    /// `capacity - 1` rows (fewer while the window is filling).
    pub fn average_period(&self) -> f64 {
        f64::from_bits(self.average_period_bits.load(Ordering::Acquire))
    }

    /// Look up a signal id by name.
    pub fn signal_id(&self, name: &str) -> TableResult<SignalId> {
        let columns = self.columns.read();
        columns
            .iter()
            .position(|c| c.name() == name)
            .map(SignalId)
            .ok_or_else(|| StateTableError::UnknownSignal { name: name.to_string() })
    }

    /// Create a typed read handle for a signal.
    pub fn accessor<T: StateValue>(self: &Arc<Self>, id: SignalId) -> TableResult<Accessor<T>> {
        let column = {
            let columns = self.columns.read();
            columns
                .get(id.0)
                .cloned()
                .ok_or(StateTableError::UnknownId { id: id.0 })?
        };
        let name = column.name().to_string();
        column
            .as_any_arc()
            .downcast::<Column<T>>()
            .map(|column| Accessor::new(Arc::clone(self), column))
            .map_err(|_| StateTableError::TypeMismatch {
                name,
                requested: std::any::type_name::<T>(),
            })
    }

    /// Create a typed read handle by signal name.
    pub fn accessor_by_name<T: StateValue>(self: &Arc<Self>, name: &str) -> TableResult<Accessor<T>> {
        let id = self.signal_id(name)?;
        self.accessor(id)
    }

    /// Schedule data collection to start `delay_s` seconds from now.
    /// The earliest pending start wins.
    pub fn collection_start(&self, delay_s: f64) {
        let at = self.clock.now() + delay_s;
        let mut dc = self.collection.lock();
        if dc.schedule_start(at) {
            debug!(table = %self.name, at, "data collection start scheduled");
        } else {
            warn!(table = %self.name, at, "data collection start request ignored");
        }
    }

    /// Schedule data collection to stop `delay_s` seconds from now.
    /// The latest pending stop wins.
    pub fn collection_stop(&self, delay_s: f64) {
        let at = self.clock.now() + delay_s;
        let mut dc = self.collection.lock();
        if dc.schedule_stop(at) {
            debug!(table = %self.name, at, "data collection stop scheduled");
        } else {
            warn!(table = %self.name, at, "data collection stop request ignored");
        }
    }

    /// Install the observer receiving collection callbacks.
    pub fn set_collection_observer(&self, observer: Box<dyn CollectionObserver>) {
        self.collection.lock().set_observer(observer);
    }

    /// Rows per batch. Defaults to a third of the capacity.
    pub fn set_collection_batch_size(&self, size: usize) {
        self.collection.lock().set_batch_size(size);
    }

    /// Seconds between progress callbacks. Defaults to 1.0.
    pub fn set_collection_progress_interval(&self, interval: f64) {
        self.collection.lock().set_progress_interval(interval);
    }

    pub fn is_collecting(&self) -> bool {
        self.collection.lock().is_collecting()
    }

    /// Snapshot of the cycle interval statistics.
    pub fn period_stats(&self) -> IntervalStatistics {
        self.stats.lock().clone()
    }

    /// Teardown check. A table must not be destroyed while data
    /// collection is active; the collector would lose the tail of its
    /// batch without ever hearing `stopped`.
    fn cleanup(&mut self) {
        if self.collection.get_mut().is_collecting() {
            error!(table = %self.name, "table torn down while data collection is active");
        }
    }

    fn register_column(&self, column: Arc<dyn AnyColumn>) -> TableResult<SignalId> {
        if self.started.load(Ordering::Acquire) {
            return Err(StateTableError::AlreadyStarted);
        }
        let mut columns = self.columns.write();
        if columns.iter().any(|c| c.name() == column.name()) {
            return Err(StateTableError::DuplicateSignal {
                name: column.name().to_string(),
            });
        }
        columns.push(column);
        Ok(SignalId(columns.len() - 1))
    }
}

impl Drop for StateTable {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// The unique writing capability for one [`StateTable`].
///
/// Not `Clone`; owning it is owning the table's write side.
pub struct TableWriter {
    table: Arc<StateTable>,
    columns: Vec<Arc<dyn AnyColumn>>,
    row_end: Arc<Column<f64>>,
    row_start: Arc<Column<f64>>,
    period: Arc<Column<f64>>,
    sum_of_periods: f64,
    stats: IntervalStatistics,
    in_cycle: bool,
}

impl TableWriter {
    /// Shared handle to the table this writer feeds.
    pub fn table(&self) -> &Arc<StateTable> {
        &self.table
    }

    /// Register a new signal. Only allowed before the first `start()`.
    pub fn new_signal<T: StateValue>(&mut self, name: &str) -> TableResult<SignalId> {
        let column = Arc::new(Column::<T>::new(name, self.table.capacity));
        let id = self
            .table
            .register_column(Arc::clone(&column) as Arc<dyn AnyColumn>)?;
        self.columns.push(column);
        debug!(table = %self.table.name, signal = name, id = id.0, "signal registered");
        Ok(id)
    }

    /// Update a signal's working copy. Takes effect in the history at
    /// the next `advance()`.
    pub fn set<T: StateValue>(&mut self, id: SignalId, value: T) -> TableResult<()> {
        let column = self
            .columns
            .get(id.0)
            .ok_or(StateTableError::UnknownId { id: id.0 })?;
        let name = column.name().to_string();
        let column = column
            .clone()
            .as_any_arc()
            .downcast::<Column<T>>()
            .map_err(|_| StateTableError::TypeMismatch {
                name,
                requested: std::any::type_name::<T>(),
            })?;
        unsafe { column.set_working(value) };
        Ok(())
    }

    /// Read back a signal's working copy.
    pub fn working<T: StateValue>(&self, id: SignalId) -> TableResult<T> {
        let column = self
            .columns
            .get(id.0)
            .ok_or(StateTableError::UnknownId { id: id.0 })?;
        let name = column.name().to_string();
        let column = column
            .clone()
            .as_any_arc()
            .downcast::<Column<T>>()
            .map_err(|_| StateTableError::TypeMismatch {
                name,
                requested: std::any::type_name::<T>(),
            })?;
        Ok(unsafe { column.working() })
    }

    /// Begin a cycle: stamp the row start time and measure the period
    /// since the previous cycle's start.
    pub fn start(&mut self) {
        let tic = self.table.clock.now();
        let reader_slot = self.table.index_reader.load(Ordering::Relaxed);
        let previous_tic = unsafe { self.row_start.read_slot(reader_slot) };
        unsafe {
            self.row_start.set_working(tic);
            self.period.set_working(tic - previous_tic);
        }
        self.table.started.store(true, Ordering::Release);
        self.in_cycle = true;
    }

    /// Commit the cycle: sweep working copies into the current write
    /// row, run data collection, stamp the row end, then publish the
    /// row by bumping the next slot's tick and moving the indices.
    pub fn advance(&mut self) -> TableResult<()> {
        if !self.in_cycle {
            return Err(StateTableError::NotStarted);
        }
        self.in_cycle = false;

        let table = &self.table;
        let capacity = table.capacity;
        let write_slot = table.index_writer.load(Ordering::Relaxed);
        let new_slot = (write_slot + 1) % capacity;

        // Moving average of the period over a full window of
        // capacity - 1 rows; before the window fills, over the rows
        // committed so far.
        let period = unsafe { self.period.working() };
        self.sum_of_periods += period;
        let tick_writer = table.ticks[write_slot].load(Ordering::Relaxed);
        let tick_next = table.ticks[new_slot].load(Ordering::Relaxed);
        let average = if tick_writer == tick_next + capacity as u64 - 1 {
            let oldest = unsafe { self.period.read_slot(new_slot) };
            self.sum_of_periods -= oldest;
            self.sum_of_periods / (capacity - 1) as f64
        } else if tick_writer > 0 {
            self.sum_of_periods / tick_writer as f64
        } else {
            0.0
        };
        table
            .average_period_bits
            .store(average.to_bits(), Ordering::Relaxed);

        // Sweep all columns except row_end into the write row.
        for column in &self.columns[1..] {
            column.commit(write_slot);
        }

        // Data collection, skipped this cycle if a scheduler holds the
        // lock right now.
        let tic = unsafe { self.row_start.working() };
        if let Some(mut dc) = table.collection.try_lock() {
            let reader = table.index_reader();
            let writer = TimeIndex::new(tick_writer, write_slot, capacity);
            dc.step(tic, reader, writer);
        }

        // Row end timestamp goes in last so it covers the sweep and
        // the collection step.
        let toc = table.clock.now();
        self.stats.record(period, toc - tic);
        if let Some(mut stats) = table.stats.try_lock() {
            *stats = self.stats.clone();
        }
        unsafe { self.row_end.set_working(toc) };
        self.row_end.commit(write_slot);

        // Publish: the next slot's tick changes first, invalidating any
        // index still pointing at the row about to be overwritten.
        table.ticks[new_slot].store(tick_writer + 1, Ordering::Release);
        table.index_writer.store(new_slot, Ordering::Release);
        table.index_reader.store(write_slot, Ordering::Release);

        let delay = table.delay.load(Ordering::Relaxed);
        table
            .index_delayed
            .store(write_slot.saturating_sub(delay), Ordering::Release);

        Ok(())
    }
}
