//! Prediction strategies for the detection workflow
//!
//! Two interchangeable predictors score each new multivariate sample against
//! the rolling baseline:
//!
//! - [`NearestNeighborPredictor`] (MVNN): distance from the normalized
//!   current observation to the closest normalized historical observation.
//! - [`LpcForecastPredictor`] (LPCF): per-channel one-step-ahead forecast
//!   from linear predictive coefficients fit to the windowed history.
//!
//! Selection is a tagged enum dispatched by the engine; there are exactly
//! two strategies and every match over them is exhaustive.

pub mod lpcf;
pub mod nearest_neighbor;

pub use lpcf::LpcForecastPredictor;
pub use nearest_neighbor::NearestNeighborPredictor;

use crate::types::{Channel, ChannelSample, PredictorKind};
use crate::window::RollingWindow;
use std::sync::Arc;

// ============================================================================
// Shared Input / Output
// ============================================================================

/// Everything a predictor sees for one step. Windows, samples, and channels
/// are index-aligned in workflow channel order.
pub struct PredictorInput<'a> {
    pub samples: &'a [ChannelSample],
    pub windows: &'a [RollingWindow],
    pub channels: &'a [Arc<Channel>],
    /// Outlier threshold, needed here because the adaptive noise floor is
    /// `precision / outlier_threshold`
    pub outlier_threshold: f64,
}

/// Predictor output for one step.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Per-channel normalized residual, workflow channel order; NaN for
    /// channels that could not be evaluated
    pub residuals: Vec<f64>,

    /// Aggregate outlier-decision statistic: winning row distance for MVNN,
    /// maximum absolute residual for LPCF. NaN when nothing was comparable.
    pub distance: f64,
}

impl Prediction {
    /// The all-NaN outcome for a step with nothing to evaluate.
    pub fn undefined(n_channels: usize) -> Self {
        Self {
            residuals: vec![f64::NAN; n_channels],
            distance: f64::NAN,
        }
    }
}

// ============================================================================
// Per-Channel Normalization Scale
// ============================================================================

/// Normalization scale for one channel over the current window: mean,
/// floored standard deviation, and the precision floor expressed in
/// normalized units (for the LPCF cheap path).
#[derive(Debug, Clone, Copy)]
pub struct ChannelScale {
    pub mean: f64,
    pub sigma: f64,
    pub norm_floor: f64,
}

impl ChannelScale {
    /// Compute the scale for a channel. The effective standard deviation is
    /// floored at `precision / outlier_threshold` so a nearly constant
    /// channel cannot blow up the normalization.
    pub fn compute(window: &RollingWindow, precision: f64, outlier_threshold: f64) -> Self {
        let mean = window.mean_ignoring_nan();
        let std = window.stddev_ignoring_nan(mean);
        let floor = precision / outlier_threshold;
        let sigma = std.max(floor);
        Self {
            mean,
            sigma,
            norm_floor: precision / sigma,
        }
    }

    /// Value in normalized units.
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.mean) / self.sigma
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// The workflow's configured prediction strategy.
#[derive(Debug, Clone)]
pub enum Predictor {
    NearestNeighbor(NearestNeighborPredictor),
    LinearPredictiveForecast(LpcForecastPredictor),
}

impl Predictor {
    /// Build the predictor named by the configuration.
    pub fn from_kind(kind: PredictorKind) -> Self {
        match kind {
            PredictorKind::NearestNeighbor { distance } => {
                Predictor::NearestNeighbor(NearestNeighborPredictor::new(distance))
            }
            PredictorKind::LinearPredictiveForecast => {
                Predictor::LinearPredictiveForecast(LpcForecastPredictor::new())
            }
        }
    }

    /// Score one step.
    pub fn predict(&self, input: &PredictorInput<'_>) -> Prediction {
        match self {
            Predictor::NearestNeighbor(p) => p.predict(input),
            Predictor::LinearPredictiveForecast(p) => p.predict(input),
        }
    }

    /// Whether this is the nearest-neighbor strategy (its attribution rule
    /// has an extra share-of-mass clause).
    pub fn is_nearest_neighbor(&self) -> bool {
        matches!(self, Predictor::NearestNeighbor(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
