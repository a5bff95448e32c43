//! Rolling engine-load history for the trend display.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Default retention window for the load trace.
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// One engine-load observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    pub at: DateTime<Utc>,
    pub load: f64,
}

/// Bounded, time-windowed series of engine-load samples.
///
/// Samples arrive in delivery order and are assumed timestamp-monotonic;
/// the broker's ordering is not corrected here. After every insert,
/// entries strictly older than `newest - window` are evicted, so the
/// buffer never outgrows the retention window.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadHistory {
    window: Duration,
    samples: VecDeque<LoadSample>,
}

impl Default for LoadHistory {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_WINDOW_SECS))
    }
}

impl LoadHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Appends a sample, then evicts everything older than the window.
    pub fn push(&mut self, at: DateTime<Utc>, load: f64) {
        self.samples.push_back(LoadSample { at, load });
        let horizon = at - self.window;
        while self
            .samples
            .front()
            .is_some_and(|sample| sample.at < horizon)
        {
            self.samples.pop_front();
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&LoadSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadSample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn keeps_samples_inside_the_window() {
        let mut history = LoadHistory::new(Duration::seconds(60));
        history.push(at(0), 20.0);
        history.push(at(30), 35.0);
        history.push(at(59), 50.0);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn evicts_samples_older_than_the_window() {
        let mut history = LoadHistory::new(Duration::seconds(60));
        history.push(at(0), 20.0);
        history.push(at(70), 42.0);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().load, 42.0);
    }

    #[test]
    fn sample_exactly_at_the_horizon_survives() {
        let mut history = LoadHistory::new(Duration::seconds(60));
        history.push(at(0), 20.0);
        history.push(at(60), 42.0);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn length_never_exceeds_in_window_count() {
        let mut history = LoadHistory::new(Duration::seconds(10));
        for i in 0..100 {
            history.push(at(i), i as f64);
            let horizon = at(i) - Duration::seconds(10);
            let in_window = history.iter().filter(|s| s.at >= horizon).count();
            assert_eq!(history.len(), in_window);
        }
        assert_eq!(history.len(), 11);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut history = LoadHistory::new(Duration::seconds(60));
        history.push(at(1), 1.0);
        history.push(at(2), 2.0);
        history.push(at(3), 3.0);
        let loads: Vec<f64> = history.iter().map(|s| s.load).collect();
        assert_eq!(loads, vec![1.0, 2.0, 3.0]);
    }
}
