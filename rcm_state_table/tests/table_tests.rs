//! Behavioral tests for the state table, driven by a manual clock.

use proptest::prelude::*;
use rcm_common::time::ManualClock;
use rcm_state_table::{
    CollectionObserver, IndexRange, PERIOD_ID, StateTable, StateTableError, TableWriter,
};
use std::sync::{Arc, Mutex};

fn new_table(capacity: usize) -> (Arc<StateTable>, TableWriter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0.0));
    let (table, writer) = StateTable::new("test", capacity, clock.clone() as Arc<_>);
    (table, writer, clock)
}

/// One full cycle at the given clock time.
fn cycle(writer: &mut TableWriter, clock: &ManualClock, t: f64) {
    clock.set(t);
    writer.start();
    writer.advance().unwrap();
}

#[test]
fn test_ticks_count_cycles() {
    let (table, mut writer, clock) = new_table(8);
    for i in 1..=5u64 {
        cycle(&mut writer, &clock, i as f64 * 0.001);
    }
    assert_eq!(table.index_writer().ticks(), 5);
    assert_eq!(table.index_reader().ticks(), 4);
}

#[test]
fn test_read_latest_value() {
    let (table, mut writer, clock) = new_table(8);
    let id = writer.new_signal::<f64>("position").unwrap();
    let accessor = table.accessor::<f64>(id).unwrap();

    for i in 1..=10 {
        clock.set(i as f64 * 0.001);
        writer.start();
        writer.set(id, i as f64 * 0.1).unwrap();
        writer.advance().unwrap();
    }

    let (value, index) = accessor.get_latest().unwrap();
    assert!((value - 1.0).abs() < 1e-12);
    assert_eq!(index.ticks(), 9);
}

#[test]
fn test_index_valid_until_wrap() {
    let (table, mut writer, clock) = new_table(4);
    let id = writer.new_signal::<i64>("counter").unwrap();
    let accessor = table.accessor::<i64>(id).unwrap();

    clock.set(0.001);
    writer.start();
    writer.set(id, 1i64).unwrap();
    writer.advance().unwrap();

    let index = table.index_reader();
    assert_eq!(index.ticks(), 0);
    assert_eq!(accessor.get(&index).unwrap(), 1);

    // Two more cycles: the snapshot's slot is untouched.
    for i in 2..=3 {
        cycle(&mut writer, &clock, i as f64 * 0.001);
        assert_eq!(accessor.get(&index).unwrap(), 1);
    }

    // Fourth cycle reuses the snapshot's slot; the read must now fail.
    cycle(&mut writer, &clock, 0.004);
    assert!(matches!(
        accessor.get(&index),
        Err(StateTableError::StaleIndex { ticks: 0 })
    ));
}

#[test]
fn test_delayed_index_lags_reader() {
    let (table, mut writer, clock) = new_table(16);
    let id = writer.new_signal::<f64>("value").unwrap();
    let accessor = table.accessor::<f64>(id).unwrap();
    table.set_delay(3);

    for i in 1..=8 {
        clock.set(i as f64 * 0.001);
        writer.start();
        writer.set(id, i as f64).unwrap();
        writer.advance().unwrap();
    }

    let reader = table.index_reader();
    let delayed = table.index_delayed();
    assert_eq!(reader.ticks(), 7);
    assert_eq!(delayed.ticks(), 4);

    let (value, _) = accessor.get_delayed().unwrap();
    assert!((value - 5.0).abs() < 1e-12);
}

#[test]
fn test_zero_delay_keeps_indices_equal() {
    let (table, mut writer, clock) = new_table(8);
    for i in 1..=4 {
        cycle(&mut writer, &clock, i as f64 * 0.001);
    }
    assert_eq!(table.index_reader(), table.index_delayed());
}

#[test]
fn test_average_period_covers_last_window() {
    let capacity = 4;
    let (table, mut writer, clock) = new_table(capacity);

    // First cycle at t=1.0, then a steady 0.1 s period.
    let mut t = 1.0;
    for _ in 0..capacity {
        cycle(&mut writer, &clock, t);
        t += 0.1;
    }
    assert!((table.average_period() - 0.1).abs() < 1e-9);

    // Slow down to 0.2 s; the window is capacity - 1 = 3 rows.
    t += 0.1; // one 0.2 s gap from the last cycle
    let mut periods = vec![0.1, 0.1, 0.2];
    cycle(&mut writer, &clock, t);
    let expected: f64 = periods.iter().sum::<f64>() / 3.0;
    assert!((table.average_period() - expected).abs() < 1e-9);

    for _ in 0..2 {
        t += 0.2;
        cycle(&mut writer, &clock, t);
        periods.remove(0);
        periods.push(0.2);
        let expected: f64 = periods.iter().sum::<f64>() / 3.0;
        assert!((table.average_period() - expected).abs() < 1e-9);
    }
    assert!((table.average_period() - 0.2).abs() < 1e-9);
}

#[test]
fn test_registration_after_start_rejected() {
    let (_table, mut writer, clock) = new_table(8);
    cycle(&mut writer, &clock, 0.001);
    assert!(matches!(
        writer.new_signal::<f64>("late"),
        Err(StateTableError::AlreadyStarted)
    ));
}

#[test]
fn test_duplicate_signal_rejected() {
    let (_table, mut writer, _clock) = new_table(8);
    writer.new_signal::<f64>("position").unwrap();
    assert!(matches!(
        writer.new_signal::<f64>("position"),
        Err(StateTableError::DuplicateSignal { .. })
    ));
}

#[test]
fn test_type_mismatch_detected() {
    let (table, mut writer, _clock) = new_table(8);
    let id = writer.new_signal::<f64>("position").unwrap();
    assert!(matches!(
        table.accessor::<i64>(id),
        Err(StateTableError::TypeMismatch { .. })
    ));
    assert!(matches!(
        writer.set(id, 3i64),
        Err(StateTableError::TypeMismatch { .. })
    ));
}

#[test]
fn test_advance_requires_start() {
    let (_table, mut writer, _clock) = new_table(8);
    assert!(matches!(
        writer.advance(),
        Err(StateTableError::NotStarted)
    ));
}

#[test]
fn test_capacity_clamped_to_minimum() {
    let (table, _writer, _clock) = new_table(1);
    assert_eq!(table.capacity(), 3);
}

#[test]
fn test_reserved_period_row_readable() {
    let (table, mut writer, clock) = new_table(8);
    let accessor = table.accessor::<f64>(PERIOD_ID).unwrap();
    let by_name = table.accessor_by_name::<f64>("period").unwrap();

    cycle(&mut writer, &clock, 1.0);
    cycle(&mut writer, &clock, 1.25);

    let (period, _) = accessor.get_latest().unwrap();
    assert!((period - 0.25).abs() < 1e-9);
    let (period, _) = by_name.get_latest().unwrap();
    assert!((period - 0.25).abs() < 1e-9);
}

#[test]
fn test_period_stats_snapshot() {
    let (table, mut writer, clock) = new_table(8);
    for i in 1..=6 {
        cycle(&mut writer, &clock, i as f64 * 0.002);
    }
    let stats = table.period_stats();
    assert_eq!(stats.samples(), 6);
    assert!(stats.period_max() >= stats.period_min());
    assert!((stats.period_min() - 0.002).abs() < 1e-9);
}

#[derive(Debug, PartialEq)]
enum CollectionEvent {
    Started,
    Batch(u64, u64),
    Stopped(usize),
    Progress(usize),
}

struct RecordingObserver(Arc<Mutex<Vec<CollectionEvent>>>);

impl CollectionObserver for RecordingObserver {
    fn collection_started(&mut self) {
        self.0.lock().unwrap().push(CollectionEvent::Started);
    }
    fn batch_ready(&mut self, range: IndexRange) {
        self.0
            .lock()
            .unwrap()
            .push(CollectionEvent::Batch(range.first.ticks(), range.last.ticks()));
    }
    fn collection_stopped(&mut self, samples: usize) {
        self.0.lock().unwrap().push(CollectionEvent::Stopped(samples));
    }
    fn progress(&mut self, samples: usize) {
        self.0.lock().unwrap().push(CollectionEvent::Progress(samples));
    }
}

#[test]
fn test_collection_start_batch_stop() {
    let (table, mut writer, clock) = new_table(16);
    let events = Arc::new(Mutex::new(Vec::new()));
    table.set_collection_observer(Box::new(RecordingObserver(events.clone())));
    table.set_collection_batch_size(3);
    table.set_collection_progress_interval(1000.0);

    clock.set(10.0);
    table.collection_start(0.05);

    let mut t = 10.0;
    for _ in 0..7 {
        t += 0.1;
        cycle(&mut writer, &clock, t);
    }
    assert!(table.is_collecting());

    table.collection_stop(0.05);
    t += 0.1;
    cycle(&mut writer, &clock, t);
    assert!(!table.is_collecting());

    let events = events.lock().unwrap();
    assert_eq!(events[0], CollectionEvent::Started);
    let batches = events
        .iter()
        .filter(|e| matches!(e, CollectionEvent::Batch(_, _)))
        .count();
    // two full batches of 3 plus the final flush on stop
    assert_eq!(batches, 3);
    assert!(matches!(events.last(), Some(CollectionEvent::Stopped(_))));
}

#[test]
fn test_collection_progress_reports() {
    let (table, mut writer, clock) = new_table(16);
    let events = Arc::new(Mutex::new(Vec::new()));
    table.set_collection_observer(Box::new(RecordingObserver(events.clone())));
    table.set_collection_batch_size(1000);
    table.set_collection_progress_interval(0.5);

    clock.set(0.0);
    table.collection_start(0.0);

    let mut t = 0.0;
    for _ in 0..12 {
        t += 0.1;
        cycle(&mut writer, &clock, t);
    }

    let events = events.lock().unwrap();
    let reports = events
        .iter()
        .filter(|e| matches!(e, CollectionEvent::Progress(_)))
        .count();
    assert!(reports >= 2, "expected progress reports, got {events:?}");
}

#[test]
fn test_drop_while_collecting_runs_teardown_check() {
    let (table, mut writer, clock) = new_table(8);
    let events = Arc::new(Mutex::new(Vec::new()));
    table.set_collection_observer(Box::new(RecordingObserver(events.clone())));

    clock.set(1.0);
    table.collection_start(0.0);
    cycle(&mut writer, &clock, 1.1);
    assert!(table.is_collecting());

    // dropping every handle while the machine is mid-collection must
    // not panic; the teardown check reports it instead
    drop(writer);
    drop(table);
}

#[test]
fn test_concurrent_reader_smoke() {
    let (table, mut writer, clock) = new_table(32);
    let id = writer.new_signal::<u64>("counter").unwrap();
    let accessor = table.accessor::<u64>(id).unwrap();

    let reader = std::thread::spawn(move || {
        let mut seen = 0u64;
        for _ in 0..2000 {
            if let Ok((value, _)) = accessor.get_latest() {
                assert!(value >= seen, "values must be monotonic");
                seen = value;
            }
        }
    });

    for i in 1..=2000u64 {
        clock.set(i as f64 * 1e-4);
        writer.start();
        writer.set(id, i).unwrap();
        writer.advance().unwrap();
    }
    reader.join().unwrap();
}

proptest! {
    #[test]
    fn prop_indices_consistent(
        capacity in 3usize..32,
        cycles in 1usize..200,
        delay in 0usize..10,
    ) {
        let (table, mut writer, clock) = new_table(capacity);
        table.set_delay(delay);
        for i in 1..=cycles {
            cycle(&mut writer, &clock, i as f64 * 0.001);
        }

        let reader = table.index_reader();
        prop_assert_eq!(reader.ticks(), cycles as u64 - 1);
        prop_assert_eq!(table.index_writer().ticks(), cycles as u64);
        prop_assert!(table.validate_index(&reader));

        let delayed = table.index_delayed();
        prop_assert_eq!(delayed.slot(), reader.slot().saturating_sub(delay));
        prop_assert!(delayed.ticks() <= table.index_writer().ticks());
    }
}
