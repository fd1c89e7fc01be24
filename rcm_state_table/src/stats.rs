//! Cycle interval statistics.
//!
//! Accumulated by the writer on every `advance()` and published as a
//! snapshot for monitoring: actual period between cycle starts and the
//! compute time spent inside each cycle.

/// Running statistics over cycle periods and compute times, in seconds.
#[derive(Debug, Clone)]
pub struct IntervalStatistics {
    samples: u64,
    period_sum: f64,
    period_sum_sq: f64,
    period_min: f64,
    period_max: f64,
    compute_sum: f64,
    compute_min: f64,
    compute_max: f64,
}

impl IntervalStatistics {
    pub fn new() -> Self {
        Self {
            samples: 0,
            period_sum: 0.0,
            period_sum_sq: 0.0,
            period_min: f64::INFINITY,
            period_max: f64::NEG_INFINITY,
            compute_sum: 0.0,
            compute_min: f64::INFINITY,
            compute_max: f64::NEG_INFINITY,
        }
    }

    pub(crate) fn record(&mut self, period: f64, compute: f64) {
        self.samples += 1;
        self.period_sum += period;
        self.period_sum_sq += period * period;
        self.period_min = self.period_min.min(period);
        self.period_max = self.period_max.max(period);
        self.compute_sum += compute;
        self.compute_min = self.compute_min.min(compute);
        self.compute_max = self.compute_max.max(compute);
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn period_avg(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.period_sum / self.samples as f64
    }

    pub fn period_std_dev(&self) -> f64 {
        if self.samples < 2 {
            return 0.0;
        }
        let n = self.samples as f64;
        let variance = (self.period_sum_sq - self.period_sum * self.period_sum / n) / (n - 1.0);
        variance.max(0.0).sqrt()
    }

    pub fn period_min(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.period_min }
    }

    pub fn period_max(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.period_max }
    }

    pub fn compute_avg(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.compute_sum / self.samples as f64
    }

    pub fn compute_min(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.compute_min }
    }

    pub fn compute_max(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.compute_max }
    }
}

impl Default for IntervalStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats_report_zeroes() {
        let stats = IntervalStatistics::new();
        assert_eq!(stats.samples(), 0);
        assert_eq!(stats.period_avg(), 0.0);
        assert_eq!(stats.period_min(), 0.0);
        assert_eq!(stats.period_max(), 0.0);
        assert_eq!(stats.period_std_dev(), 0.0);
    }

    #[test]
    fn test_record_updates_extremes_and_average() {
        let mut stats = IntervalStatistics::new();
        stats.record(0.001, 0.0004);
        stats.record(0.003, 0.0006);
        stats.record(0.002, 0.0005);

        assert_eq!(stats.samples(), 3);
        assert!((stats.period_avg() - 0.002).abs() < 1e-12);
        assert_eq!(stats.period_min(), 0.001);
        assert_eq!(stats.period_max(), 0.003);
        assert!((stats.compute_avg() - 0.0005).abs() < 1e-12);
        assert!(stats.period_std_dev() > 0.0);
    }

    #[test]
    fn test_std_dev_zero_for_constant_period() {
        let mut stats = IntervalStatistics::new();
        for _ in 0..10 {
            stats.record(0.001, 0.0002);
        }
        assert!(stats.period_std_dev().abs() < 1e-12);
    }
}
