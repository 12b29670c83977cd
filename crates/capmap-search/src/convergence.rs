//! Convergence detection over per-iteration aggregates

use serde::{Deserialize, Serialize};

/// Counts consecutive iterations whose aggregate barely moved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceMonitor {
    threshold: f64,
    required: u32,
    previous: Option<f64>,
    counter: u32,
}

impl ConvergenceMonitor {
    /// Monitor needing `required` consecutive deltas below `threshold`
    #[must_use]
    pub fn new(threshold: f64, required: u32) -> Self {
        Self {
            threshold,
            required,
            previous: None,
            counter: 0,
        }
    }

    /// Feed one aggregate; `true` once `required` consecutive deltas fell below the threshold
    ///
    /// The first observation only seeds the comparison.
    pub fn observe(&mut self, aggregate: f64) -> bool {
        if let Some(previous) = self.previous {
            if (aggregate - previous).abs() < self.threshold {
                self.counter += 1;
            } else {
                self.counter = 0;
            }
        }
        self.previous = Some(aggregate);
        self.is_converged()
    }

    /// An iteration without any scored evaluation breaks the streak
    pub fn interrupt(&mut self) {
        self.counter = 0;
    }

    /// Consecutive small deltas so far
    #[inline]
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Last observed aggregate
    #[inline]
    #[must_use]
    pub fn previous(&self) -> Option<f64> {
        self.previous
    }

    /// Whether the counter reached the required run
    #[inline]
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.counter >= self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_on_fifth_consecutive_small_delta() {
        let mut monitor = ConvergenceMonitor::new(0.3, 5);
        let aggregates = [0.0, 1.0, 1.1, 1.2, 1.3, 1.4, 1.5, 1.6];
        let converged_at: Vec<bool> = aggregates.iter().map(|a| monitor.observe(*a)).collect();
        assert_eq!(
            converged_at,
            vec![false, false, false, false, false, false, true, true]
        );
    }

    #[test]
    fn large_delta_resets_the_streak() {
        let mut monitor = ConvergenceMonitor::new(0.3, 3);
        for a in [0.0, 0.1, 0.2] {
            assert!(!monitor.observe(a));
        }
        assert_eq!(monitor.counter(), 2);
        assert!(!monitor.observe(2.0));
        assert_eq!(monitor.counter(), 0);
        assert!(!monitor.observe(2.1));
        assert!(!monitor.observe(2.2));
        assert!(monitor.observe(2.3));
    }

    #[test]
    fn first_observation_never_counts() {
        let mut monitor = ConvergenceMonitor::new(10.0, 1);
        assert!(!monitor.observe(0.0));
        assert!(monitor.observe(0.0));
    }

    #[test]
    fn zero_threshold_never_converges() {
        let mut monitor = ConvergenceMonitor::new(0.0, 1);
        for _ in 0..10 {
            assert!(!monitor.observe(0.5));
        }
    }
}
