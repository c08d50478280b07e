//! Multivariate nearest-neighbor predictor (MVNN)
//!
//! Scores the current observation by its distance to the closest historical
//! observation, both expressed in per-channel normalized units. A small
//! distance means the station has recently been in a similar state; a large
//! one means no recent precedent exists for the current combination of
//! readings.

use super::{ChannelScale, Prediction, PredictorInput};
use crate::types::DistanceKind;

/// Nearest-neighbor predictor with a configurable row distance metric.
#[derive(Debug, Clone)]
pub struct NearestNeighborPredictor {
    distance: DistanceKind,
}

impl NearestNeighborPredictor {
    pub fn new(distance: DistanceKind) -> Self {
        Self { distance }
    }

    pub fn distance_kind(&self) -> DistanceKind {
        self.distance
    }

    /// Score one step: normalize the current sample and every historical row
    /// per channel, find the row minimizing the configured distance over the
    /// usable channels, and report that distance plus per-channel residuals
    /// against the winning row.
    pub fn predict(&self, input: &PredictorInput<'_>) -> Prediction {
        let n_channels = input.channels.len();

        let scales: Vec<ChannelScale> = input
            .windows
            .iter()
            .zip(input.channels.iter())
            .map(|(w, ch)| ChannelScale::compute(w, ch.precision, input.outlier_threshold))
            .collect();

        // Channels eligible for distance comparison: numerically valid and
        // not auto-ignored for a quality violation this step
        let usable: Vec<bool> = input.samples.iter().map(|s| s.is_usable()).collect();

        let normalized_current: Vec<f64> = input
            .samples
            .iter()
            .zip(scales.iter())
            .map(|(s, scale)| scale.normalize(s.value))
            .collect();

        let snapshots: Vec<Vec<f64>> = input.windows.iter().map(|w| w.snapshot()).collect();
        let window_len = snapshots.first().map_or(0, Vec::len);

        // Scan rows oldest-first; strict < keeps the earliest row on ties
        let mut best_row: Option<usize> = None;
        let mut best_distance = f64::INFINITY;
        for row in 0..window_len {
            let mut dims = 0usize;
            let mut acc = 0.0f64;
            for i in 0..n_channels {
                if !usable[i] {
                    continue;
                }
                let historical = scales[i].normalize(snapshots[i][row]);
                let dv = normalized_current[i] - historical;
                if !dv.is_finite() {
                    continue;
                }
                dims += 1;
                match self.distance {
                    DistanceKind::L1 => acc += dv.abs(),
                    DistanceKind::L2 => acc += dv * dv,
                    DistanceKind::Linf => acc = acc.max(dv.abs()),
                }
            }
            if dims == 0 {
                // No comparable dimension: this row is infinitely far
                continue;
            }
            let row_distance = match self.distance {
                DistanceKind::L2 => acc.sqrt(),
                DistanceKind::L1 | DistanceKind::Linf => acc,
            };
            if row_distance < best_distance {
                best_distance = row_distance;
                best_row = Some(row);
            }
        }

        let Some(winner) = best_row else {
            // Window entirely unusable: NaN distance, which upstream treats
            // as not-an-outlier (legacy comparison semantics)
            return Prediction::undefined(n_channels);
        };

        let residuals: Vec<f64> = (0..n_channels)
            .map(|i| {
                if usable[i] {
                    normalized_current[i] - scales[i].normalize(snapshots[i][winner])
                } else {
                    f64::NAN
                }
            })
            .collect();

        Prediction {
            residuals,
            distance: best_distance,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
