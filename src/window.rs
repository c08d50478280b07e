//! Fixed-capacity rolling sample windows
//!
//! Each channel in a workflow owns one [`RollingWindow`] for its accepted
//! baseline values and one for its raw history. Capacity is fixed at
//! construction from the configured history window size; the buffer grows
//! monotonically during warm-up and afterwards always holds exactly
//! `capacity` most-recent values.
//!
//! Statistics ignore NaN entries defensively, but the engine never stores
//! NaN: missing/invalid samples are filled by repeating the last accepted
//! value so mean and standard deviation stay defined.

use std::collections::VecDeque;
use thiserror::Error;

/// Errors from direct window access. Out-of-range reads indicate a caller
/// bug, not a data condition, and are kept distinct from the recoverable
/// numerical fallbacks inside the predictors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window position {position} outside retained history (len {len})")]
    OutOfRange { position: usize, len: usize },
}

/// Fixed-capacity ring buffer of recent accepted samples.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Create an empty window. Capacity must be validated by the caller
    /// (construction-time config checks reject zero sizes before any window
    /// is built).
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest once at capacity. O(1) amortized.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Append a raw observation, substituting the most recent retained value
    /// when the observation is not finite. Falls back to the raw value when
    /// the window is still empty (nothing to repeat yet).
    pub fn accept(&mut self, raw: f64) {
        let value = if raw.is_finite() {
            raw
        } else {
            self.last().unwrap_or(raw)
        };
        self.push(value);
    }

    /// Number of retained values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether warm-up is complete for this window.
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent value.
    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Value `age` steps back from the newest (age 0 = newest). Rejected with
    /// a distinguishable error when the position is outside retained history.
    pub fn value_at(&self, age: usize) -> Result<f64, WindowError> {
        let len = self.values.len();
        if age >= len {
            return Err(WindowError::OutOfRange { position: age, len });
        }
        Ok(self.values[len - 1 - age])
    }

    /// Oldest-to-newest copy for the predictors.
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    /// Replace the entire contents from an oldest-to-newest slice, truncating
    /// to the newest `capacity` entries. Used by the event-timeout rebuild.
    pub fn refill(&mut self, values: &[f64]) {
        self.values.clear();
        let skip = values.len().saturating_sub(self.capacity);
        for &v in &values[skip..] {
            self.values.push_back(v);
        }
    }

    /// Mean of the finite entries; NaN when no finite entry exists.
    pub fn mean_ignoring_nan(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for &v in &self.values {
            if v.is_finite() {
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Bessel-corrected sample standard deviation of the finite entries
    /// around `mean`; 0 when fewer than 2 finite points.
    ///
    /// Never use the result directly as a divisor; callers apply the
    /// precision floor first.
    pub fn stddev_ignoring_nan(&self, mean: f64) -> f64 {
        if !mean.is_finite() {
            return 0.0;
        }
        let mut sum_sq = 0.0;
        let mut count = 0usize;
        for &v in &self.values {
            if v.is_finite() {
                let d = v - mean;
                sum_sq += d * d;
                count += 1;
            }
        }
        if count < 2 {
            0.0
        } else {
            (sum_sq / (count - 1) as f64).sqrt()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest_at_capacity() {
        let mut w = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.snapshot(), vec![2.0, 3.0, 4.0]);
        assert!(w.is_full());
    }

    #[test]
    fn grows_monotonically_before_warm_up() {
        let mut w = RollingWindow::new(4);
        assert!(w.is_empty());
        w.push(5.0);
        assert_eq!(w.len(), 1);
        assert!(!w.is_full());
        w.push(6.0);
        w.push(7.0);
        w.push(8.0);
        assert!(w.is_full());
    }

    #[test]
    fn accept_repeats_last_value_for_invalid_samples() {
        let mut w = RollingWindow::new(4);
        w.accept(10.0);
        w.accept(f64::NAN);
        w.accept(11.0);
        w.accept(f64::INFINITY);
        assert_eq!(w.snapshot(), vec![10.0, 10.0, 11.0, 11.0]);
    }

    #[test]
    fn mean_and_stddev_known_values() {
        let mut w = RollingWindow::new(8);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            w.push(v);
        }
        let mean = w.mean_ignoring_nan();
        assert!((mean - 5.0).abs() < 1e-9);
        // Sum of squared deviations = 32, sample variance = 32/7
        let std = w.stddev_ignoring_nan(mean);
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn stddev_is_zero_below_two_valid_points() {
        let mut w = RollingWindow::new(4);
        w.push(3.0);
        let mean = w.mean_ignoring_nan();
        assert_eq!(w.stddev_ignoring_nan(mean), 0.0);
    }

    #[test]
    fn statistics_skip_nan_entries() {
        let mut w = RollingWindow::new(5);
        w.push(1.0);
        w.push(f64::NAN);
        w.push(3.0);
        let mean = w.mean_ignoring_nan();
        assert!((mean - 2.0).abs() < 1e-9);
        let std = w.stddev_ignoring_nan(mean);
        assert!((std - 2.0f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn value_at_rejects_out_of_range_access() {
        let mut w = RollingWindow::new(3);
        w.push(1.0);
        w.push(2.0);
        assert_eq!(w.value_at(0), Ok(2.0));
        assert_eq!(w.value_at(1), Ok(1.0));
        assert_eq!(
            w.value_at(2),
            Err(WindowError::OutOfRange { position: 2, len: 2 })
        );
    }

    #[test]
    fn refill_truncates_to_newest_capacity_entries() {
        let mut w = RollingWindow::new(3);
        w.refill(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(w.snapshot(), vec![3.0, 4.0, 5.0]);
        assert!(w.is_full());
    }
}
