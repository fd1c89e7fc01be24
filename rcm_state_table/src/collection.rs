//! Data collection scheduling and batch events.
//!
//! A collector component schedules collection windows on a table; the
//! writer's `advance()` drives the state machine and reports batches of
//! rows (as index ranges) through a [`CollectionObserver`]. Start
//! requests keep the earliest scheduled time, stop requests the latest,
//! so overlapping requests from several collectors widen the window
//! instead of truncating it.

use crate::index::{IndexRange, TimeIndex};
use tracing::debug;

/// Callbacks the collector receives from the table writer's cycle.
///
/// Invoked from `advance()` while the collection lock is held; keep
/// implementations short and non-blocking, typically a channel send.
pub trait CollectionObserver: Send {
    /// Collection became active.
    fn collection_started(&mut self) {}

    /// A batch of rows is ready to be fetched.
    fn batch_ready(&mut self, _range: IndexRange) {}

    /// Collection stopped; `samples` counts rows since the last
    /// progress report.
    fn collection_stopped(&mut self, _samples: usize) {}

    /// Periodic progress report with rows since the previous one.
    fn progress(&mut self, _samples: usize) {}
}

/// Collection state machine, guarded by the table's collection mutex.
pub(crate) struct DataCollection {
    collecting: bool,
    start_time: Option<f64>,
    stop_time: Option<f64>,
    batch_size: usize,
    batch_counter: usize,
    event_counter: usize,
    progress_interval: f64,
    last_progress: f64,
    batch_first: Option<TimeIndex>,
    observer: Option<Box<dyn CollectionObserver>>,
}

impl DataCollection {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            collecting: false,
            start_time: None,
            stop_time: None,
            batch_size: (capacity / 3).max(1),
            batch_counter: 0,
            event_counter: 0,
            progress_interval: 1.0,
            last_progress: 0.0,
            batch_first: None,
            observer: None,
        }
    }

    pub(crate) fn set_observer(&mut self, observer: Box<dyn CollectionObserver>) {
        self.observer = Some(observer);
    }

    pub(crate) fn set_batch_size(&mut self, size: usize) {
        self.batch_size = size.max(1);
    }

    pub(crate) fn set_progress_interval(&mut self, interval: f64) {
        self.progress_interval = interval;
    }

    pub(crate) fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Schedule collection to start at `at`. Keeps the earliest pending
    /// start; while already collecting, only a start scheduled after a
    /// pending stop is accepted (restart).
    pub(crate) fn schedule_start(&mut self, at: f64) -> bool {
        if !self.collecting {
            match self.start_time {
                None => {
                    self.start_time = Some(at);
                    true
                }
                Some(s) if at < s => {
                    self.start_time = Some(at);
                    true
                }
                Some(_) => false,
            }
        } else {
            match self.stop_time {
                Some(p) if at > p => {
                    self.start_time = Some(at);
                    true
                }
                _ => false,
            }
        }
    }

    /// Schedule collection to stop at `at`. Keeps the latest stop.
    pub(crate) fn schedule_stop(&mut self, at: f64) -> bool {
        match self.stop_time {
            None => {
                self.stop_time = Some(at);
                true
            }
            Some(p) if at > p => {
                self.stop_time = Some(at);
                true
            }
            Some(_) => false,
        }
    }

    /// One step of the machine, driven by `advance()`.
    ///
    /// `tic` is the current row's start timestamp; `reader` the row
    /// published by the previous cycle, `writer` the row being
    /// committed now.
    pub(crate) fn step(&mut self, tic: f64, reader: TimeIndex, writer: TimeIndex) {
        if !self.collecting && self.start_time.is_some_and(|s| tic >= s) {
            self.start_time = None;
            self.collecting = true;
            self.batch_first = Some(reader);
            self.batch_counter = 0;
            self.event_counter = 0;
            self.last_progress = tic;
            debug!(tic, "data collection started");
            if let Some(obs) = self.observer.as_mut() {
                obs.collection_started();
            }
        }

        if !self.collecting {
            return;
        }

        if self.stop_time.is_some_and(|p| tic >= p) {
            self.stop_time = None;
            self.collecting = false;
            let samples = self.event_counter;
            self.event_counter = 0;
            debug!(tic, samples, "data collection stopped");
            if let Some(obs) = self.observer.as_mut() {
                if let Some(first) = self.batch_first {
                    obs.batch_ready(IndexRange { first, last: reader });
                }
                obs.collection_stopped(samples);
            }
            return;
        }

        self.batch_counter += 1;
        self.event_counter += 1;

        if self.batch_counter >= self.batch_size {
            if let (Some(obs), Some(first)) = (self.observer.as_mut(), self.batch_first) {
                obs.batch_ready(IndexRange { first, last: reader });
            }
            self.batch_counter = 0;
            self.batch_first = Some(writer);
        }

        if tic - self.last_progress >= self.progress_interval {
            let samples = self.event_counter;
            self.event_counter = 0;
            self.last_progress = tic;
            if let Some(obs) = self.observer.as_mut() {
                obs.progress(samples);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(ticks: u64, slot: usize) -> TimeIndex {
        TimeIndex::new(ticks, slot, 16)
    }

    #[test]
    fn test_start_keeps_earliest() {
        let mut dc = DataCollection::new(16);
        assert!(dc.schedule_start(5.0));
        assert!(!dc.schedule_start(7.0));
        assert_eq!(dc.start_time, Some(5.0));

        let mut dc = DataCollection::new(16);
        assert!(dc.schedule_start(7.0));
        assert!(dc.schedule_start(5.0));
        assert_eq!(dc.start_time, Some(5.0));
    }

    #[test]
    fn test_stop_keeps_latest() {
        let mut dc = DataCollection::new(16);
        assert!(dc.schedule_stop(3.0));
        assert!(dc.schedule_stop(6.0));
        assert_eq!(dc.stop_time, Some(6.0));

        let mut dc = DataCollection::new(16);
        assert!(dc.schedule_stop(6.0));
        assert!(!dc.schedule_stop(3.0));
        assert_eq!(dc.stop_time, Some(6.0));
    }

    #[test]
    fn test_restart_only_after_pending_stop() {
        let mut dc = DataCollection::new(16);
        dc.schedule_start(0.0);
        dc.step(1.0, idx(0, 0), idx(1, 1));
        assert!(dc.is_collecting());

        // no stop scheduled: restart is meaningless
        assert!(!dc.schedule_start(2.0));

        dc.schedule_stop(5.0);
        assert!(!dc.schedule_start(4.0));
        assert!(dc.schedule_start(6.0));
    }

    #[test]
    fn test_step_transitions() {
        let mut dc = DataCollection::new(16);
        dc.schedule_start(2.0);
        dc.step(1.0, idx(0, 0), idx(1, 1));
        assert!(!dc.is_collecting());
        dc.step(2.0, idx(1, 1), idx(2, 2));
        assert!(dc.is_collecting());

        dc.schedule_stop(3.0);
        dc.step(3.5, idx(2, 2), idx(3, 3));
        assert!(!dc.is_collecting());
        assert_eq!(dc.stop_time, None);
    }
}
