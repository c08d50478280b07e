//! Linear-predictive-coding forecast predictor (LPCF)
//!
//! Each channel is forecast independently one step ahead from an
//! autoregressive model fit to the normalized window-plus-current series;
//! the residual is how far the observed value landed from its forecast. The
//! aggregate outlier-decision statistic is the maximum absolute residual
//! across channels; a single badly-predicted channel is enough.
//!
//! Two shortcuts keep the step cheap and robust:
//! - a flat-signal check skips the LPC fit entirely when the last few
//!   normalized jumps sit inside the channel's precision floor;
//! - a singular Cholesky solve (perfectly periodic or near-constant windows)
//!   falls back to a repeat-last residual, logged as a recoverable condition.

use super::{ChannelScale, Prediction, PredictorInput};
use crate::signal::{lpc_coefficients, lpc_forecast};
use tracing::debug;

/// Per-channel one-step-ahead LPC forecast predictor.
#[derive(Debug, Clone, Default)]
pub struct LpcForecastPredictor;

impl LpcForecastPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Score one step: forecast each usable channel from its own history and
    /// take the worst absolute residual as the aggregate distance.
    pub fn predict(&self, input: &PredictorInput<'_>) -> Prediction {
        let n_channels = input.channels.len();
        let mut residuals = vec![f64::NAN; n_channels];
        let mut distance = f64::NAN;

        for i in 0..n_channels {
            let sample = &input.samples[i];
            if !sample.is_usable() {
                continue;
            }

            let window = &input.windows[i];
            let scale =
                ChannelScale::compute(window, input.channels[i].precision, input.outlier_threshold);

            let residual = Self::channel_residual(
                &input.channels[i].tag,
                window.snapshot().as_slice(),
                sample.value,
                scale,
            );
            residuals[i] = residual;

            let magnitude = residual.abs();
            if distance.is_nan() || magnitude > distance {
                distance = magnitude;
            }
        }

        Prediction {
            residuals,
            distance,
        }
    }

    /// Normalized one-step-ahead residual for a single channel.
    fn channel_residual(tag: &str, window: &[f64], current: f64, scale: ChannelScale) -> f64 {
        let mut series: Vec<f64> = window.iter().map(|&v| scale.normalize(v)).collect();
        series.push(scale.normalize(current));
        let n = series.len() - 1;

        // Flat-signal shortcut: when the new value and the last two window
        // values all sit within the precision floor of each other, the
        // "forecast" is just the last value, with no LPC fit needed.
        if n >= 2 {
            let jump_new_last = (series[n] - series[n - 1]).abs();
            let jump_new_prev = (series[n] - series[n - 2]).abs();
            let jump_last_prev = (series[n - 1] - series[n - 2]).abs();
            if jump_new_last <= scale.norm_floor
                && jump_new_prev <= scale.norm_floor
                && jump_last_prev <= scale.norm_floor
            {
                return series[n] - series[n - 1];
            }
        }

        match lpc_coefficients(&series) {
            Some(b) => series[n] - lpc_forecast(&series, &b),
            None => {
                // Degenerate autocorrelation system: recover with the
                // repeat-last residual, never abort the step
                debug!(channel = tag, "LPC solve degenerate, using repeat-last residual");
                series[n] - series[n - 1]
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, ChannelSample};
    use crate::window::RollingWindow;
    use std::sync::Arc;

    const THRESHOLD: f64 = 0.8;

    fn channel(tag: &str) -> Arc<Channel> {
        Arc::new(Channel::with_precision(tag, tag, 0.0001))
    }

    fn window_of(values: &[f64]) -> RollingWindow {
        let mut w = RollingWindow::new(values.len());
        for &v in values {
            w.push(v);
        }
        w
    }

    fn predict(
        samples: &[ChannelSample],
        windows: &[RollingWindow],
        channels: &[Arc<Channel>],
    ) -> Prediction {
        LpcForecastPredictor::new().predict(&PredictorInput {
            samples,
            windows,
            channels,
            outlier_threshold: THRESHOLD,
        })
    }

    #[test]
    fn flat_signal_takes_cheap_path_with_zero_residual() {
        let channels = vec![channel("a")];
        let windows = vec![window_of(&[10.0; 20])];
        let samples = vec![ChannelSample::normal(10.0)];

        let p = predict(&samples, &windows, &channels);
        assert!(p.residuals[0].abs() < 1e-12);
        assert!(p.distance.abs() < 1e-12);
    }

    #[test]
    fn step_change_produces_large_residual() {
        let channels = vec![channel("a")];
        let windows = vec![window_of(&[10.0; 20])];
        let samples = vec![ChannelSample::normal(50.0)];

        let p = predict(&samples, &windows, &channels);
        // Flat window: sigma is floored at precision / threshold, so the
        // jump is enormous in normalized units
        assert!(p.distance > THRESHOLD);
        assert!(p.residuals[0] > 0.0);
    }

    #[test]
    fn on_trend_continuation_scores_below_off_trend_jump() {
        let channels = vec![channel("a")];
        let values: Vec<f64> = (0..20).map(|i| 5.0 + 0.5 * i as f64).collect();
        let windows = vec![window_of(&values)];

        let on_trend = predict(
            &[ChannelSample::normal(5.0 + 0.5 * 20.0)],
            &windows,
            &channels,
        );
        let off_trend = predict(&[ChannelSample::normal(40.0)], &windows, &channels);

        assert!(
            on_trend.distance < off_trend.distance,
            "continuing the ramp ({}) must score below breaking it ({})",
            on_trend.distance,
            off_trend.distance
        );
    }

    #[test]
    fn aggregate_is_max_abs_residual_across_channels() {
        let channels = vec![channel("a"), channel("b")];
        let windows = vec![window_of(&[10.0; 12]), window_of(&[20.0; 12])];
        // Channel a stays flat, channel b drops
        let samples = vec![ChannelSample::normal(10.0), ChannelSample::normal(19.0)];

        let p = predict(&samples, &windows, &channels);
        assert!((p.distance - p.residuals[1].abs()).abs() < 1e-9);
        assert!(p.residuals[1] < 0.0, "drop must give a negative residual");
    }

    #[test]
    fn unusable_channels_are_skipped() {
        let channels = vec![channel("a"), channel("b")];
        let windows = vec![window_of(&[10.0; 12]), window_of(&[20.0; 12])];
        let samples = vec![ChannelSample::missing(), ChannelSample::normal(20.0)];

        let p = predict(&samples, &windows, &channels);
        assert!(p.residuals[0].is_nan());
        assert!(p.residuals[1].abs() < 1e-9);
        assert!(p.distance.abs() < 1e-9);
    }

    #[test]
    fn no_usable_channel_yields_nan_distance() {
        let channels = vec![channel("a")];
        let windows = vec![window_of(&[10.0; 12])];
        let samples = vec![ChannelSample::missing()];

        let p = predict(&samples, &windows, &channels);
        assert!(p.distance.is_nan());
    }
}
