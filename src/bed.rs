//! Binomial Event Discriminator (BED)
//!
//! Converts the per-step stream of binary outlier flags into an event
//! probability. The discriminator keeps a fixed-length sliding window of
//! flags and asks: under the null hypothesis that outliers occur randomly
//! with prior probability `p0`, how probable is it to see *at most* this many
//! flags? A value near 1.0 means the observed outlier rate is improbably
//! high under normal conditions, evidence of a sustained event rather than
//! transient noise.
//!
//! The probability is a pure function of the buffer contents, recomputed from
//! scratch each step via the statrs binomial CDF; the ring buffer is the only
//! state.

use statrs::distribution::{Binomial, DiscreteCDF};
use std::collections::VecDeque;

/// Default prior outlier probability under the null hypothesis.
pub const DEFAULT_OUTLIER_PROBABILITY: f64 = 0.5;

/// Sliding-window binomial discriminator over binary outlier flags.
#[derive(Debug, Clone)]
pub struct BinomialEventDiscriminator {
    /// Ring of 0/1 flags, oldest first, always exactly `window_size` long
    flags: VecDeque<u8>,
    window_size: usize,
    outlier_probability: f64,
}

impl BinomialEventDiscriminator {
    /// Create a discriminator with an all-zero flag window.
    ///
    /// `window_size` and `outlier_probability` are validated at workflow
    /// construction (positive size, probability strictly inside (0,1)).
    pub fn new(window_size: usize, outlier_probability: f64) -> Self {
        let mut flags = VecDeque::with_capacity(window_size);
        flags.extend(std::iter::repeat(0u8).take(window_size));
        Self {
            flags,
            window_size,
            outlier_probability,
        }
    }

    /// Push one outlier flag, evicting the oldest.
    pub fn push(&mut self, outlier: bool) {
        self.flags.pop_front();
        self.flags.push_back(u8::from(outlier));
    }

    /// Count of set flags currently in the window.
    pub fn outlier_count(&self) -> u64 {
        self.flags.iter().map(|&f| u64::from(f)).sum()
    }

    /// Event probability: `P(X <= n)` for `X ~ Binomial(window_size, p0)`
    /// where `n` is the current count of set flags.
    ///
    /// Pure function of the buffer; calling this repeatedly without pushing
    /// a new flag yields identical results.
    pub fn probability(&self) -> f64 {
        let n = self.outlier_count();
        match Binomial::new(self.outlier_probability, self.window_size as u64) {
            Ok(dist) => dist.cdf(n),
            // Parameters are validated at construction; treat a failed
            // distribution as no evidence rather than aborting the step.
            Err(_) => f64::NAN,
        }
    }

    /// Reset every flag to zero. Used by the event-timeout recovery so the
    /// discriminator restarts from the no-evidence state.
    pub fn clear(&mut self) {
        for f in self.flags.iter_mut() {
            *f = 0;
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

// ============================================================================
// Tests
// ============================================================================
