//! Append-only sample store shared by concurrently executing cells.

use crate::model::Sample;
use std::sync::{Mutex, MutexGuard};

/// Running count of recorded trials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureTally {
    /// Trials recorded so far
    pub completed: usize,
    /// Of those, trials that failed
    pub failed: usize,
}

impl FailureTally {
    /// Failed / completed, 0 when nothing completed
    pub fn failure_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.failed as f64 / self.completed as f64
        }
    }
}

#[derive(Default)]
struct State {
    samples: Vec<Sample>,
    tally: FailureTally,
}

/// Serializes inserts so samples from different cells never interleave partially
#[derive(Default)]
pub struct SampleCollector {
    state: Mutex<State>,
}

impl SampleCollector {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a sample and return the updated tally
    pub fn record(&self, sample: Sample) -> FailureTally {
        let mut state = self.lock();
        state.tally.completed += 1;
        if !sample.success {
            state.tally.failed += 1;
        }
        state.samples.push(sample);
        state.tally
    }

    /// Current tally
    pub fn tally(&self) -> FailureTally {
        self.lock().tally
    }

    /// Number of samples recorded
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    /// Whether nothing was recorded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the collector, yielding samples in recording order
    pub fn into_samples(self) -> Vec<Sample> {
        self.state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, FailureReason, Scale};
    use std::sync::Arc;

    fn cell() -> Cell {
        Cell::new("sort", "rust", Scale::Small)
    }

    #[test]
    fn test_tally_tracks_failures() {
        let collector = SampleCollector::new();
        collector.record(Sample::succeeded(cell(), 0, 1, 1.0, 10, Some(1)));
        let tally = collector.record(Sample::failed(cell(), 1, 3, FailureReason::Timeout));
        assert_eq!(tally, FailureTally { completed: 2, failed: 1 });
        assert!((tally.failure_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(FailureTally::default().failure_rate(), 0.0);
    }

    #[test]
    fn test_concurrent_inserts_are_all_kept() {
        let collector = Arc::new(SampleCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        collector.record(Sample::succeeded(cell(), t * 100 + i, 1, 1.0, 1, None));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let collector = Arc::try_unwrap(collector).ok().unwrap();
        assert_eq!(collector.tally().completed, 800);
        let mut trials: Vec<u32> = collector.into_samples().iter().map(|s| s.trial).collect();
        trials.sort_unstable();
        assert_eq!(trials, (0..800).collect::<Vec<_>>());
    }
}
