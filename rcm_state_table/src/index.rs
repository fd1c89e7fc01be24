//! Time indices into the circular history.

/// A snapshot reference to one row of a state table.
///
/// Carries the absolute tick together with the slot the row occupied
/// when the snapshot was taken. A `TimeIndex` stays cheap to copy and
/// never dangles: reads through it are validated against the tick
/// currently stored for the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeIndex {
    ticks: u64,
    slot: usize,
    capacity: usize,
}

impl TimeIndex {
    pub(crate) fn new(ticks: u64, slot: usize, capacity: usize) -> Self {
        Self { ticks, slot, capacity }
    }

    /// Absolute cycle count this index refers to.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Slot in the circular history.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Capacity of the table this index was taken from.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Inclusive range of rows, as reported to data collection observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub first: TimeIndex,
    pub last: TimeIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_index_accessors() {
        let idx = TimeIndex::new(42, 2, 10);
        assert_eq!(idx.ticks(), 42);
        assert_eq!(idx.slot(), 2);
        assert_eq!(idx.capacity(), 10);
    }
}
