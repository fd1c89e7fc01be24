//! Cycle cost benchmarks: start/set/advance on tables of varying width.

use criterion::{Criterion, criterion_group, criterion_main};
use rcm_common::time::MonotonicClock;
use rcm_state_table::StateTable;
use std::sync::Arc;

fn bench_cycle_one_signal(c: &mut Criterion) {
    let clock = Arc::new(MonotonicClock::new());
    let (_table, mut writer) = StateTable::new("bench", 512, clock);
    let id = writer.new_signal::<f64>("position").unwrap();

    let mut x = 0.0f64;
    c.bench_function("cycle_one_signal", |b| {
        b.iter(|| {
            writer.start();
            x += 0.001;
            writer.set(id, x).unwrap();
            writer.advance().unwrap();
        })
    });
}

fn bench_cycle_thirty_two_signals(c: &mut Criterion) {
    let clock = Arc::new(MonotonicClock::new());
    let (_table, mut writer) = StateTable::new("bench-wide", 512, clock);
    let ids: Vec<_> = (0..32)
        .map(|i| writer.new_signal::<f64>(&format!("signal_{i}")).unwrap())
        .collect();

    let mut x = 0.0f64;
    c.bench_function("cycle_thirty_two_signals", |b| {
        b.iter(|| {
            writer.start();
            x += 0.001;
            for id in &ids {
                writer.set(*id, x).unwrap();
            }
            writer.advance().unwrap();
        })
    });
}

fn bench_reader_get_latest(c: &mut Criterion) {
    let clock = Arc::new(MonotonicClock::new());
    let (table, mut writer) = StateTable::new("bench-read", 512, clock);
    let id = writer.new_signal::<f64>("position").unwrap();
    let accessor = table.accessor::<f64>(id).unwrap();

    for _ in 0..16 {
        writer.start();
        writer.set(id, 1.0).unwrap();
        writer.advance().unwrap();
    }

    c.bench_function("reader_get_latest", |b| {
        b.iter(|| accessor.get_latest().unwrap())
    });
}

criterion_group!(
    benches,
    bench_cycle_one_signal,
    bench_cycle_thirty_two_signals,
    bench_reader_get_latest
);
criterion_main!(benches);
