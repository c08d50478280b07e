//! Per-workflow detection engine
//!
//! One [`Workflow`] monitors one station: it owns the per-channel baseline
//! windows, the raw-history windows, the binomial event discriminator, and
//! the event-status state machine, and evaluates exactly one time index per
//! [`Workflow::step`] call.
//!
//! Evaluation is synchronous and single-threaded per instance; `step` takes
//! `&mut self` and fully updates internal state before returning, so the
//! borrow checker enforces call serialization. Independent workflows share
//! no mutable state and may run in parallel under an external scheduler.
//!
//! Per-step data conditions (missing data, numerical degeneracy) are encoded
//! in the returned [`StepResult`]; the only step-time errors are caller bugs
//! (sample/channel count mismatch).

use crate::bed::BinomialEventDiscriminator;
use crate::config::{ConfigError, DetectorConfig, StationConfig};
use crate::predictors::{Prediction, Predictor, PredictorInput};
use crate::types::{
    Channel, ChannelSample, Contribution, EventStatus, StepResult, ViolationCode,
};
use crate::window::RollingWindow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// Errors
// ============================================================================

/// Step-time caller bugs. Data conditions never surface here; they are
/// reported inside the [`StepResult`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("step supplied {got} samples for {expected} channels")]
    ChannelCountMismatch { expected: usize, got: usize },

    #[error("unknown channel tag '{0}'")]
    UnknownChannel(String),

    #[error("channels cannot be removed once evaluation has started")]
    EvaluationStarted,
}

// ============================================================================
// Workflow State
// ============================================================================

/// Mutable per-step state of a workflow. Overwritten once per evaluated
/// index; rebuilt wholesale when the event timeout fires.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub status: EventStatus,
    pub probability: f64,
    pub residuals: Vec<f64>,
    pub contributing: Vec<Contribution>,
    pub violations: Vec<ViolationCode>,
    pub event_timeout_counter: u32,
}

impl WorkflowState {
    fn new(n_channels: usize) -> Self {
        Self {
            status: EventStatus::Uninitialized,
            probability: f64::NAN,
            residuals: vec![f64::NAN; n_channels],
            contributing: vec![Contribution::None; n_channels],
            violations: vec![ViolationCode::None; n_channels],
            event_timeout_counter: 0,
        }
    }
}

// ============================================================================
// Workflow
// ============================================================================

/// Detection workflow for one station.
pub struct Workflow {
    config: DetectorConfig,
    channels: Vec<Arc<Channel>>,

    /// Baseline window per channel: only non-outlier samples are accepted
    windows: Vec<RollingWindow>,

    /// Raw history per channel: advanced every step, outliers included.
    /// Source material for the event-timeout window rebuild.
    raw_history: Vec<RollingWindow>,

    bed: BinomialEventDiscriminator,
    predictor: Predictor,
    state: WorkflowState,

    /// Next time index to evaluate
    next_index: u64,
    evaluation_started: bool,
}

impl Workflow {
    /// Build a workflow over shared channel metadata. The configuration and
    /// every channel precision are validated here; failure is fatal and no
    /// evaluation state is constructed.
    pub fn new(config: DetectorConfig, channels: Vec<Arc<Channel>>) -> Result<Self, ConfigError> {
        config.validate()?;
        if channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        let mut seen = std::collections::HashSet::new();
        for ch in &channels {
            if !(ch.precision > 0.0) || !ch.precision.is_finite() {
                return Err(ConfigError::NonPositivePrecision(ch.tag.clone()));
            }
            if !seen.insert(ch.tag.as_str()) {
                return Err(ConfigError::DuplicateChannel(ch.tag.clone()));
            }
        }

        let n = channels.len();
        let window_size = config.history_window_size as usize;
        let windows = (0..n).map(|_| RollingWindow::new(window_size)).collect();
        let raw_history = (0..n).map(|_| RollingWindow::new(window_size)).collect();
        let bed = BinomialEventDiscriminator::new(
            config.bed_window_size as usize,
            config.bed_outlier_probability,
        );
        let predictor = Predictor::from_kind(config.predictor);

        debug!(
            channels = n,
            window = window_size,
            predictor = %config.predictor,
            "Workflow constructed"
        );

        Ok(Self {
            config,
            channels,
            windows,
            raw_history,
            bed,
            predictor,
            state: WorkflowState::new(n),
            next_index: 0,
            evaluation_started: false,
        })
    }

    /// Build a workflow directly from a loaded station file.
    pub fn from_station_config(config: &StationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let channels = config
            .channels
            .iter()
            .map(|entry| {
                Arc::new(Channel::with_precision(
                    entry.tag.clone(),
                    entry.parameter.clone(),
                    entry.precision,
                ))
            })
            .collect();
        Self::new(config.detector.clone(), channels)
    }

    /// Channel metadata, workflow channel order.
    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    /// Most recent per-step state.
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Whether every channel window has completed warm-up.
    pub fn warmed_up(&self) -> bool {
        self.windows.iter().all(RollingWindow::is_full)
    }

    /// Remove a channel. The API exists for symmetry with construction but
    /// the lifecycle forbids use once evaluation has begun.
    pub fn remove_channel(&mut self, tag: &str) -> Result<Arc<Channel>, WorkflowError> {
        if self.evaluation_started {
            return Err(WorkflowError::EvaluationStarted);
        }
        let idx = self
            .channels
            .iter()
            .position(|c| c.tag == tag)
            .ok_or_else(|| WorkflowError::UnknownChannel(tag.to_string()))?;
        self.windows.remove(idx);
        self.raw_history.remove(idx);
        self.state = WorkflowState::new(self.channels.len() - 1);
        Ok(self.channels.remove(idx))
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate one time index. Samples must be index-aligned with
    /// [`Workflow::channels`]. Always yields a defined result record for the
    /// evaluated index; the only error is a sample/channel count mismatch.
    pub fn step(&mut self, samples: &[ChannelSample]) -> Result<StepResult, WorkflowError> {
        let n = self.channels.len();
        if samples.len() != n {
            return Err(WorkflowError::ChannelCountMismatch {
                expected: n,
                got: samples.len(),
            });
        }

        let index = self.next_index;
        self.next_index += 1;
        self.evaluation_started = true;

        // Raw history advances unconditionally: it must capture the outlier
        // episode so a timeout rebuild re-admits it
        for (history, sample) in self.raw_history.iter_mut().zip(samples) {
            history.accept(sample.value);
        }

        let violations: Vec<ViolationCode> = samples
            .iter()
            .map(|s| ViolationCode::from_status(s.status))
            .collect();

        // --- 1. Warm-up -----------------------------------------------------
        if !self.warmed_up() {
            for (window, sample) in self.windows.iter_mut().zip(samples) {
                window.accept(sample.value);
            }
            let status = if self.warmed_up() {
                debug!(index, "Warm-up complete, evaluation begins next step");
                EventStatus::Normal
            } else {
                EventStatus::Uninitialized
            };
            return Ok(self.finish_step(index, status, f64::NAN, None, violations));
        }

        // --- 2. No usable channels ------------------------------------------
        if !samples.iter().any(ChannelSample::is_usable) {
            return Ok(self.finish_step(
                index,
                EventStatus::DataMissing,
                f64::NAN,
                None,
                violations,
            ));
        }

        // --- 3. Prediction & outlier gate -----------------------------------
        let prediction = self.predictor.predict(&PredictorInput {
            samples,
            windows: &self.windows,
            channels: &self.channels,
            outlier_threshold: self.config.outlier_threshold,
        });

        // NaN distance fails this comparison and therefore counts as
        // not-an-outlier, preserving legacy semantics for steps where no
        // historical row was comparable
        let is_outlier = prediction.distance >= self.config.outlier_threshold;
        let any_alarming = samples.iter().any(|s| s.status.is_violation());

        let mut status = if is_outlier {
            // Outliers must not contaminate the baseline: windows untouched
            self.bed.push(true);
            EventStatus::OutlierDetected
        } else {
            for (window, sample) in self.windows.iter_mut().zip(samples) {
                window.accept(sample.value);
            }
            self.bed.push(false);
            if any_alarming {
                EventStatus::ChannelsAlarming
            } else {
                EventStatus::Normal
            }
        };

        // --- 4. Binomial event discriminator --------------------------------
        let probability = self.bed.probability();
        if probability >= self.config.event_threshold {
            status = EventStatus::PossibleEvent;
            self.state.event_timeout_counter += 1;
        }
        if probability <= 0.5 {
            self.state.event_timeout_counter = 0;
        }

        // --- 5. Event timeout -----------------------------------------------
        if self.state.event_timeout_counter >= self.config.event_timeout_steps {
            status = EventStatus::EventTimeout;
            self.reseed_baseline(index);
        }

        Ok(self.finish_step(
            index,
            status,
            probability,
            Some(prediction),
            violations,
        ))
    }

    /// Re-seed every baseline window from raw history and restart the
    /// discriminator. Deliberately re-admits the outlier episode so the
    /// baseline adapts to the new operating point.
    fn reseed_baseline(&mut self, index: u64) {
        for (window, history) in self.windows.iter_mut().zip(&self.raw_history) {
            window.refill(&history.snapshot());
        }
        self.bed.clear();
        self.state.event_timeout_counter = 0;
        info!(
            index,
            window = self.config.history_window_size,
            "Event timeout: baseline re-seeded from raw history"
        );
    }

    /// Attribution plus state/result bookkeeping shared by every exit path.
    fn finish_step(
        &mut self,
        index: u64,
        status: EventStatus,
        probability: f64,
        prediction: Option<Prediction>,
        violations: Vec<ViolationCode>,
    ) -> StepResult {
        let n = self.channels.len();
        let (residuals, distance) = prediction
            .map_or_else(|| (vec![f64::NAN; n], f64::NAN), |p| (p.residuals, p.distance));
        let contributing = self.attribute(&residuals, &violations, distance);

        if status != self.state.status {
            debug!(index, from = %self.state.status, to = %status, "Status transition");
        }

        self.state.status = status;
        self.state.probability = probability;
        self.state.residuals = residuals.clone();
        self.state.contributing = contributing.clone();
        self.state.violations = violations.clone();

        StepResult {
            index,
            status,
            probability,
            residuals,
            contributing,
            violations,
        }
    }

    /// Mark contributing channels: hard quality violations always contribute
    /// with the distinct quality code; otherwise a channel contributes when
    /// its own residual magnitude exceeds the outlier threshold, or (for the
    /// nearest-neighbor predictor on an outlier step) when its residual
    /// exceeds its equal share of the total residual mass.
    fn attribute(
        &self,
        residuals: &[f64],
        violations: &[ViolationCode],
        distance: f64,
    ) -> Vec<Contribution> {
        let threshold = self.config.outlier_threshold;

        let finite: Vec<f64> = residuals
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .collect();
        let total_mass: f64 = finite.iter().map(|r| r.abs()).sum();
        let share = if finite.is_empty() {
            f64::INFINITY
        } else {
            total_mass / finite.len() as f64
        };

        let nn_outlier_step = self.predictor.is_nearest_neighbor() && distance >= threshold;

        residuals
            .iter()
            .zip(violations)
            .map(|(&r, &v)| {
                if v != ViolationCode::None {
                    Contribution::Quality
                } else if r.is_finite()
                    && (r.abs() > threshold || (nn_outlier_step && r.abs() > share))
                {
                    Contribution::from_residual(r)
                } else {
                    Contribution::None
                }
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DistanceKind, PredictorKind, SampleStatus};

    fn config() -> DetectorConfig {
        DetectorConfig {
            history_window_size: 4,
            outlier_threshold: 0.8,
            event_threshold: 0.85,
            event_timeout_steps: 3,
            bed_window_size: 4,
            bed_outlier_probability: 0.5,
            predictor: PredictorKind::NearestNeighbor {
                distance: DistanceKind::L2,
            },
        }
    }

    fn workflow(config: DetectorConfig, n_channels: usize) -> Workflow {
        let channels = (0..n_channels)
            .map(|i| Arc::new(Channel::with_precision(format!("CH{i}"), "test", 0.0001)))
            .collect();
        Workflow::new(config, channels).expect("valid test workflow")
    }

    fn normal(values: &[f64]) -> Vec<ChannelSample> {
        values.iter().map(|&v| ChannelSample::normal(v)).collect()
    }

    #[test]
    fn construction_rejects_bad_config_eagerly() {
        let mut bad = config();
        bad.history_window_size = 0;
        let channels = vec![Arc::new(Channel::new("A", "test"))];
        assert!(Workflow::new(bad, channels).is_err());

        assert!(matches!(
            Workflow::new(config(), vec![]),
            Err(ConfigError::NoChannels)
        ));

        let zero_precision = vec![Arc::new(Channel::with_precision("A", "test", 0.0))];
        assert!(matches!(
            Workflow::new(config(), zero_precision),
            Err(ConfigError::NonPositivePrecision(_))
        ));
    }

    #[test]
    fn warm_up_reports_uninitialized_then_normal() {
        let mut wf = workflow(config(), 1);
        for i in 0..3 {
            let r = wf.step(&normal(&[10.0])).expect("step");
            assert_eq!(r.status, EventStatus::Uninitialized, "step {i}");
            assert!(r.probability.is_nan());
        }
        let r = wf.step(&normal(&[10.0])).expect("step");
        assert_eq!(r.status, EventStatus::Normal);
        assert!(r.probability.is_nan());
        assert!(wf.warmed_up());
    }

    #[test]
    fn warm_up_substitutes_previous_value_for_missing() {
        let mut wf = workflow(config(), 1);
        wf.step(&normal(&[10.0])).expect("step");
        wf.step(&[ChannelSample::missing()]).expect("step");
        wf.step(&normal(&[11.0])).expect("step");
        wf.step(&normal(&[11.0])).expect("step");
        assert_eq!(wf.windows[0].snapshot(), vec![10.0, 10.0, 11.0, 11.0]);
    }

    #[test]
    fn all_invalid_step_reports_data_missing_without_touching_state() {
        let mut wf = workflow(config(), 2);
        for _ in 0..4 {
            wf.step(&normal(&[10.0, 20.0])).expect("step");
        }
        let windows_before: Vec<Vec<f64>> = wf.windows.iter().map(RollingWindow::snapshot).collect();
        let bed_count_before = wf.bed.outlier_count();

        let r = wf
            .step(&[ChannelSample::missing(), ChannelSample::missing()])
            .expect("step");
        assert_eq!(r.status, EventStatus::DataMissing);
        assert!(r.probability.is_nan());
        assert!(r.residuals.iter().all(|v| v.is_nan()));

        let windows_after: Vec<Vec<f64>> = wf.windows.iter().map(RollingWindow::snapshot).collect();
        assert_eq!(windows_before, windows_after, "windows must not advance");
        assert_eq!(wf.bed.outlier_count(), bed_count_before);
    }

    #[test]
    fn outlier_gating_controls_window_updates() {
        let mut wf = workflow(config(), 1);
        for v in [10.0, 10.1, 10.0, 10.1] {
            wf.step(&normal(&[v])).expect("step");
        }

        // Sample matching a historical row: window advances
        let before = wf.windows[0].snapshot();
        let r = wf.step(&normal(&[10.1])).expect("step");
        assert_eq!(r.status, EventStatus::Normal);
        let mut expected = before[1..].to_vec();
        expected.push(10.1);
        assert_eq!(wf.windows[0].snapshot(), expected);

        // Wild sample: window frozen
        let before = wf.windows[0].snapshot();
        let r = wf.step(&normal(&[55.0])).expect("step");
        assert_eq!(r.status, EventStatus::OutlierDetected);
        assert_eq!(wf.windows[0].snapshot(), before, "outlier must not be admitted");
    }

    #[test]
    fn alarming_channel_reports_channels_alarming_but_still_accepts() {
        let mut wf = workflow(config(), 2);
        for _ in 0..4 {
            wf.step(&normal(&[10.0, 20.0])).expect("step");
        }
        // Channel 1 alarms with a plausible value; channel 0 stays normal.
        // The alarming channel is auto-ignored in the distance, so the step
        // is not an outlier and acceptance proceeds.
        let r = wf
            .step(&[
                ChannelSample::normal(10.0),
                ChannelSample {
                    value: 20.0,
                    status: SampleStatus::OutOfControlLimit,
                },
            ])
            .expect("step");
        assert_eq!(r.status, EventStatus::ChannelsAlarming);
        assert_eq!(r.contributing[1], Contribution::Quality);
        assert_eq!(r.violations[1], ViolationCode::ControlLimit);
        assert_eq!(wf.windows[1].last(), Some(20.0), "window still advances");
    }

    #[test]
    fn sustained_outliers_escalate_to_event_and_timeout_reseeds() {
        let mut wf = workflow(config(), 1);
        for v in [10.0, 10.1, 10.0, 10.1] {
            wf.step(&normal(&[v])).expect("step");
        }

        let mut saw_possible_event = false;
        let mut timeout_result = None;
        for _ in 0..20 {
            let r = wf.step(&normal(&[55.0])).expect("step");
            match r.status {
                EventStatus::PossibleEvent => saw_possible_event = true,
                EventStatus::EventTimeout => {
                    timeout_result = Some(r);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_possible_event, "BED must escalate before timing out");
        let timeout = timeout_result.expect("timeout must fire");
        assert!(timeout.probability >= 0.85);

        // Baseline re-seeded from raw history: window now reflects 55.0 and
        // the next identical sample is normal again
        assert!(wf.windows[0].snapshot().contains(&55.0));
        assert_eq!(wf.bed.outlier_count(), 0);
        assert_eq!(wf.state().event_timeout_counter, 0);
        let r = wf.step(&normal(&[55.0])).expect("step");
        assert_eq!(r.status, EventStatus::Normal);
    }

    #[test]
    fn window_invariant_holds_through_timeout_reset() {
        let mut wf = workflow(config(), 2);
        let window = wf.config().history_window_size as usize;

        for i in 0..40u32 {
            let v = if i >= 10 { 99.0 } else { 10.0 };
            let samples = if i % 7 == 3 {
                vec![ChannelSample::missing(), ChannelSample::normal(v)]
            } else {
                normal(&[v, v])
            };
            wf.step(&samples).expect("step");

            if i as usize >= window {
                for w in &wf.windows {
                    assert_eq!(w.len(), window, "window invariant broken at step {i}");
                    assert!(
                        w.snapshot().iter().all(|v| v.is_finite()),
                        "NaN admitted at step {i}"
                    );
                }
            }
        }
    }

    #[test]
    fn channel_removal_forbidden_after_evaluation_starts() {
        let mut wf = workflow(config(), 2);
        assert!(wf.remove_channel("CH1").is_ok());
        assert_eq!(wf.channels().len(), 1);
        assert!(matches!(
            wf.remove_channel("nope"),
            Err(WorkflowError::UnknownChannel(_))
        ));

        wf.step(&normal(&[10.0])).expect("step");
        assert!(matches!(
            wf.remove_channel("CH0"),
            Err(WorkflowError::EvaluationStarted)
        ));
    }

    #[test]
    fn sample_count_mismatch_is_a_caller_error() {
        let mut wf = workflow(config(), 2);
        assert!(matches!(
            wf.step(&normal(&[1.0])),
            Err(WorkflowError::ChannelCountMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn lpcf_workflow_runs_the_same_state_machine() {
        let mut cfg = config();
        cfg.predictor = PredictorKind::LinearPredictiveForecast;
        let mut wf = workflow(cfg, 1);
        for _ in 0..4 {
            wf.step(&normal(&[10.0])).expect("step");
        }
        let r = wf.step(&normal(&[10.0])).expect("step");
        assert_eq!(r.status, EventStatus::Normal);
        let r = wf.step(&normal(&[99.0])).expect("step");
        assert_eq!(r.status, EventStatus::OutlierDetected);
        assert_eq!(r.contributing[0], Contribution::High);
    }
}
